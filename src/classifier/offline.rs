//! Nearest-centroid classifier over the currently installed offline model.

use super::artifact::OfflineModel;
use crate::gesture::LandmarkVector;
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;

/// Label returned when no model is installed.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Confidence returned when no model is installed. A routine low-confidence
/// answer, not a failure.
pub const NO_MODEL_CONFIDENCE: f64 = 0.5;

/// Label and confidence from a single classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub confidence: f64,
}

/// Map a distance to a confidence in `(0, 1]`, strictly decreasing.
pub fn distance_to_confidence(distance: f64) -> f64 {
    1.0 / (1.0 + distance)
}

/// Closest centroid to `vector` and its distance.
///
/// Ties keep the first id in the model's (lexicographic) order.
pub fn nearest_centroid<'m>(model: &'m OfflineModel, vector: &LandmarkVector) -> Option<(&'m str, f64)> {
    let mut best: Option<(&str, f64)> = None;
    for (id, centroid) in &model.centroids {
        let distance = vector.distance_to(centroid);
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((id.as_str(), distance)),
        }
    }
    best
}

/// Holds the served offline model and classifies against it.
///
/// The model sits behind an `RwLock<Option<Arc<_>>>`: classification clones
/// the `Arc` and releases the lock, and `install` swaps the pointer in one
/// step, so a reader never observes a partially replaced model.
#[derive(Default)]
pub struct OfflineClassifier {
    model: RwLock<Option<Arc<OfflineModel>>>,
}

impl OfflineClassifier {
    /// A classifier with no model installed.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(model: OfflineModel) -> Self {
        Self {
            model: RwLock::new(Some(Arc::new(model))),
        }
    }

    /// Load the artifact at `path` if it exists; otherwise start empty.
    pub fn load_or_empty(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "No offline model artifact yet");
            return Ok(Self::new());
        }
        let model = OfflineModel::load(path)?;
        tracing::info!(
            path = %path.display(),
            version = model.version.as_deref().unwrap_or("unversioned"),
            gestures = model.len(),
            "Loaded offline model"
        );
        Ok(Self::with_model(model))
    }

    /// Atomically replace the served model. Returns the previous version.
    pub fn install(&self, model: OfflineModel) -> Option<String> {
        let version = model.version.clone();
        let gestures = model.len();
        let previous = self.model.write().replace(Arc::new(model));
        let previous_version = previous.and_then(|m| m.version.clone());
        tracing::info!(
            version = version.as_deref().unwrap_or("unversioned"),
            previous = previous_version.as_deref().unwrap_or("none"),
            gestures,
            "Installed offline model"
        );
        previous_version
    }

    /// The currently served model, if any.
    pub fn snapshot(&self) -> Option<Arc<OfflineModel>> {
        self.model.read().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.model.read().is_some()
    }

    pub fn version(&self) -> Option<String> {
        self.model.read().as_ref().and_then(|m| m.version.clone())
    }

    /// Classify against the served model.
    ///
    /// With no model (or an empty one) the answer is
    /// `{UNKNOWN_LABEL, NO_MODEL_CONFIDENCE}`.
    pub fn classify(&self, vector: &LandmarkVector) -> Prediction {
        let Some(model) = self.snapshot() else {
            return Self::unknown();
        };
        match nearest_centroid(&model, vector) {
            Some((label, distance)) => Prediction {
                label: label.to_string(),
                confidence: distance_to_confidence(distance),
            },
            None => Self::unknown(),
        }
    }

    fn unknown() -> Prediction {
        Prediction {
            label: UNKNOWN_LABEL.to_string(),
            confidence: NO_MODEL_CONFIDENCE,
        }
    }
}
