pub mod aggregator;

pub use aggregator::{refresh, success_rate, AnalyticsAggregator, GLOBAL_ENTITY_ID};
