//! Gesture classification.
//!
//! - `artifact`: versioned offline model artifacts, atomic on-disk replacement
//! - `offline`: nearest-centroid classifier with hot-swappable model
//! - `remote`: cloud classification endpoint
//! - `router`: bounded-latency remote attempt with offline fallback

pub mod artifact;
pub mod offline;
pub mod remote;
pub mod router;

pub use artifact::OfflineModel;
pub use offline::{OfflineClassifier, Prediction, NO_MODEL_CONFIDENCE, UNKNOWN_LABEL};
pub use remote::{HttpRemoteClassifier, RemoteClassification, RemoteClassifier};
pub use router::{ClassificationRouter, RouterStats, ThresholdLookup};
