pub mod schema;

pub use schema::{ClassifierConfig, Config, LoggingConfig, StorageConfig, SyncConfig};
