//! Continuous learning: health scoring and offline-model retraining.

pub mod health;
pub mod retrain;

pub use health::{apply_outcome, HealthScoreTracker, REMEDIAL_PRACTICE_BELOW};
pub use retrain::{default_version, retrain, RetrainJob, RetrainSummary};
