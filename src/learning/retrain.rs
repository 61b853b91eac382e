//! Batch rebuild of the offline model from the training log.

use crate::classifier::{OfflineClassifier, OfflineModel};
use crate::gesture::{GestureStatus, TrainingSample};
use crate::store::LearningStore;
use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Elementwise mean of each gesture's samples.
///
/// A group's arity is set by its first sample; later samples of a different
/// length are skipped. Gestures with no samples are absent from the result.
pub fn retrain(samples: &[TrainingSample]) -> OfflineModel {
    let mut sums: BTreeMap<&str, (Vec<f64>, usize)> = BTreeMap::new();

    for sample in samples {
        let coords = sample.landmark_data.as_slice();
        let (sum, count) = sums
            .entry(sample.gesture_definition_id.as_str())
            .or_insert_with(|| (vec![0.0; coords.len()], 0));
        if sum.len() != coords.len() {
            tracing::warn!(
                gesture = %sample.gesture_definition_id,
                sample = %sample.id,
                expected = sum.len(),
                found = coords.len(),
                "Skipping sample with mismatched landmark arity"
            );
            continue;
        }
        for (acc, v) in sum.iter_mut().zip(coords) {
            *acc += v;
        }
        *count += 1;
    }

    let centroids = sums
        .into_iter()
        .map(|(id, (sum, count))| {
            let n = count as f64;
            (id.to_string(), sum.into_iter().map(|v| v / n).collect())
        })
        .collect();
    OfflineModel::new(centroids)
}

/// Default artifact version: a sortable UTC timestamp.
pub fn default_version() -> String {
    Utc::now().format("%Y%m%dT%H%M%SZ").to_string()
}

/// Outcome of one retraining run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrainSummary {
    pub version: String,
    pub samples: usize,
    pub gestures: usize,
    pub output: PathBuf,
    /// Gestures moved from `training` to `ready` (install runs only).
    pub promoted: Vec<String>,
}

/// Snapshot the log, rebuild, write the artifact.
pub struct RetrainJob {
    store: Arc<LearningStore>,
}

impl RetrainJob {
    pub fn new(store: Arc<LearningStore>) -> Self {
        Self { store }
    }

    /// Rebuild and write to `out`. Writing is the only effect.
    pub fn run(&self, out: &Path, version: Option<String>) -> Result<(OfflineModel, RetrainSummary)> {
        let samples = self
            .store
            .training_snapshot()
            .context("Failed to snapshot training log")?;
        let version = version.unwrap_or_else(default_version);
        let model = retrain(&samples).versioned(version.clone());

        model
            .write_atomic(out)
            .with_context(|| format!("Failed to write model artifact: {}", out.display()))?;

        tracing::info!(
            version = %version,
            samples = samples.len(),
            gestures = model.len(),
            output = %out.display(),
            "Offline model rebuilt"
        );

        let summary = RetrainSummary {
            version,
            samples: samples.len(),
            gestures: model.len(),
            output: out.to_path_buf(),
            promoted: Vec::new(),
        };
        Ok((model, summary))
    }

    /// Rebuild, write, hot-swap into `classifier`, and promote every
    /// `training` gesture now covered by the model to `ready`.
    pub fn run_and_install(
        &self,
        out: &Path,
        version: Option<String>,
        classifier: &OfflineClassifier,
    ) -> Result<RetrainSummary> {
        let (model, mut summary) = self.run(out, version)?;

        let covered: Vec<String> = model.centroids.keys().cloned().collect();
        classifier.install(model);

        for def in self.store.gestures()? {
            if def.status == GestureStatus::Training
                && covered.contains(&def.id)
                && self.store.set_gesture_status(&def.id, GestureStatus::Ready)?
            {
                summary.promoted.push(def.id);
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::{LandmarkVector, SampleSource};
    use tempfile::TempDir;

    fn sample(gesture: &str, coords: &[f64]) -> TrainingSample {
        TrainingSample::new(
            gesture,
            LandmarkVector::new(coords.to_vec()).unwrap(),
            SampleSource::LiveCapture,
        )
    }

    #[test]
    fn single_sample_is_its_own_centroid() {
        let model = retrain(&[sample("g1", &[0.0, 0.0])]);
        assert_eq!(model.len(), 1);
        assert_eq!(model.centroid("g1"), Some(&[0.0, 0.0][..]));
    }

    #[test]
    fn centroid_is_elementwise_mean() {
        let model = retrain(&[
            sample("g1", &[0.0, 2.0]),
            sample("g1", &[2.0, 4.0]),
            sample("g2", &[10.0, 10.0]),
        ]);
        assert_eq!(model.centroid("g1"), Some(&[1.0, 3.0][..]));
        assert_eq!(model.centroid("g2"), Some(&[10.0, 10.0][..]));
    }

    #[test]
    fn empty_log_yields_empty_model() {
        assert!(retrain(&[]).is_empty());
    }

    #[test]
    fn mismatched_arity_is_skipped() {
        let model = retrain(&[
            sample("g1", &[1.0, 1.0]),
            sample("g1", &[5.0, 5.0, 5.0]),
            sample("g1", &[3.0, 3.0]),
        ]);
        assert_eq!(model.centroid("g1"), Some(&[2.0, 2.0][..]));
    }

    #[test]
    fn retrain_is_deterministic() {
        let log = vec![sample("b", &[1.0]), sample("a", &[2.0]), sample("b", &[3.0])];
        assert_eq!(retrain(&log).centroids, retrain(&log).centroids);
    }

    #[test]
    fn job_writes_artifact_and_installs() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LearningStore::open_in_memory().unwrap());
        store.define_gesture("g1", "milk").unwrap();
        store.define_gesture("g2", "more").unwrap();
        store.append_sample(&sample("g1", &[0.0, 0.0])).unwrap();
        // Queued: no definition yet.
        store.append_sample(&sample("g9", &[9.0, 9.0])).unwrap();

        let out = tmp.path().join("models").join("offline_model.json");
        let classifier = OfflineClassifier::new();
        let summary = RetrainJob::new(Arc::clone(&store))
            .run_and_install(&out, Some("v1".into()), &classifier)
            .unwrap();

        assert_eq!(summary.gestures, 1);
        assert_eq!(summary.samples, 1);
        assert_eq!(summary.promoted, vec!["g1".to_string()]);
        assert_eq!(classifier.version().as_deref(), Some("v1"));
        assert_eq!(
            store.gesture("g1").unwrap().unwrap().status,
            GestureStatus::Ready
        );
        assert_eq!(
            store.gesture("g2").unwrap().unwrap().status,
            GestureStatus::Training
        );

        let on_disk = OfflineModel::load(&out).unwrap();
        assert_eq!(on_disk.centroid("g1"), Some(&[0.0, 0.0][..]));
        assert!(on_disk.centroid("g9").is_none());
    }

    #[test]
    fn run_only_writes_artifact() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LearningStore::open_in_memory().unwrap());
        store.define_gesture("g1", "milk").unwrap();
        store.append_sample(&sample("g1", &[1.0])).unwrap();

        let out = tmp.path().join("model.json");
        let (_, summary) = RetrainJob::new(Arc::clone(&store)).run(&out, None).unwrap();
        assert!(out.exists());
        assert!(summary.promoted.is_empty());
        assert_eq!(
            store.gesture("g1").unwrap().unwrap().status,
            GestureStatus::Training
        );
    }

    #[test]
    fn disabled_gesture_gets_no_centroid() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LearningStore::open_in_memory().unwrap());
        store.define_gesture("g1", "milk").unwrap();
        store.define_gesture("g2", "more").unwrap();
        store.append_sample(&sample("g1", &[0.0])).unwrap();
        store.append_sample(&sample("g2", &[1.0])).unwrap();
        store.set_gesture_status("g2", GestureStatus::Disabled).unwrap();

        let classifier = OfflineClassifier::new();
        let summary = RetrainJob::new(Arc::clone(&store))
            .run_and_install(&tmp.path().join("model.json"), Some("v1".into()), &classifier)
            .unwrap();

        assert_eq!(summary.gestures, 1);
        assert_eq!(summary.promoted, vec!["g1".to_string()]);
        let model = classifier.snapshot().unwrap();
        assert!(model.centroid("g2").is_none());
        assert_eq!(classifier.classify(&LandmarkVector::new(vec![1.0]).unwrap()).label, "g1");
        assert_eq!(
            store.gesture("g2").unwrap().unwrap().status,
            GestureStatus::Disabled
        );
    }
}
