//! Gesture data model: landmark vectors, definitions, samples, logs,
//! classification results and analytics snapshots.

pub mod landmarks;
pub mod types;

pub use landmarks::{LandmarkProvider, LandmarkVector};
pub use types::{
    ClassificationResult, GestureDefinition, GestureStatus, InteractionLog,
    LearningAnalyticsSnapshot, ProcessedBy, SampleSource, SyncStatus, TrainingSample,
    DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_HEALTH_SCORE, MAX_HEALTH_SCORE,
};
