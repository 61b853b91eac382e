//! Contract-violation errors.
//!
//! Connectivity and data-sparsity conditions are never errors in this
//! crate: the router falls back, sync retries, retraining omits empty
//! gestures. What remains here are malformed inputs that a caller must fix.

use thiserror::Error;

/// A malformed input handed to the recognition core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GestureError {
    /// A landmark vector with no coordinates.
    #[error("landmark vector is empty")]
    EmptyVector,

    /// A coordinate that is NaN or infinite.
    #[error("landmark coordinate {index} is not finite ({value})")]
    NonFiniteCoordinate { index: usize, value: f64 },

    /// Point rows of differing arity passed to `LandmarkVector::from_points`.
    #[error("landmark point {row} has {found} coordinates, expected {expected}")]
    RaggedPoints {
        row: usize,
        expected: usize,
        found: usize,
    },

    /// A model artifact that cannot be decoded or holds invalid centroids.
    #[error("malformed model artifact: {0}")]
    MalformedArtifact(String),
}
