//! Gesture recognition with an on-device fallback and continuous learning
//! from caregiver corrections.
//!
//! - `classifier`: remote/offline routing, nearest-centroid model, artifacts
//! - `learning`: health-score tracker and retraining job
//! - `store`: SQLite interaction and training logs
//! - `sync`: exchange with the central store
//! - `analytics`: rolling success-rate snapshots
//! - `engine`: the service object wiring it all together

pub mod analytics;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod gesture;
pub mod learning;
pub mod store;
pub mod sync;

pub use config::Config;
pub use engine::{GestureEngine, LogNotifier, Outcome, OutcomeReport, PracticeNotifier};
pub use error::GestureError;
