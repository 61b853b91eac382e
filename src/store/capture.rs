use super::learning::LearningStore;
use crate::gesture::{
    ClassificationResult, InteractionLog, LandmarkVector, ProcessedBy, SampleSource, TrainingSample,
};
use anyhow::Result;
use std::sync::Arc;

/// Writes labelled landmark vectors into the training log.
///
/// Corrections are dual-written: a `correction` sample under the true
/// gesture and a failed interaction under the predicted one, committed
/// together.
#[derive(Clone)]
pub struct TrainingCapture {
    store: Arc<LearningStore>,
}

impl TrainingCapture {
    pub fn new(store: Arc<LearningStore>) -> Self {
        Self { store }
    }

    /// Append a sample for `gesture_id`. Samples for undefined gestures are
    /// kept but stay queued until the gesture is defined.
    pub fn record_sample(
        &self,
        gesture_id: &str,
        vector: LandmarkVector,
        source: SampleSource,
    ) -> Result<TrainingSample> {
        let sample = TrainingSample::new(gesture_id, vector, source);
        self.store.append_sample(&sample)?;
        tracing::debug!(
            gesture = %gesture_id,
            source = source.as_str(),
            sample = %sample.id,
            "Training sample recorded"
        );
        Ok(sample)
    }

    /// Caregiver correction without a classification result at hand.
    pub fn record_correction(
        &self,
        predicted_id: &str,
        actual_id: &str,
        vector: LandmarkVector,
    ) -> Result<TrainingSample> {
        self.write_correction(predicted_id, actual_id, vector, 0.0, ProcessedBy::Local)
    }

    /// Caregiver correction of `result`, keeping its confidence and origin.
    pub fn record_correction_for(
        &self,
        result: &ClassificationResult,
        actual_id: &str,
        vector: LandmarkVector,
    ) -> Result<TrainingSample> {
        self.write_correction(
            &result.label,
            actual_id,
            vector,
            result.confidence,
            result.processed_by,
        )
    }

    fn write_correction(
        &self,
        predicted_id: &str,
        actual_id: &str,
        vector: LandmarkVector,
        confidence: f64,
        processed_by: ProcessedBy,
    ) -> Result<TrainingSample> {
        let mut sample = TrainingSample::new(actual_id, vector, SampleSource::Correction);
        sample.predicted_gesture_id = Some(predicted_id.to_string());
        sample.confidence = Some(confidence);

        let mut log = InteractionLog::new(predicted_id, false, confidence, processed_by);
        log.caregiver_override_id = Some(actual_id.to_string());
        log.timestamp = sample.created_at;

        let logged = self.store.append_correction(&sample, &log)?;
        tracing::info!(
            predicted = %predicted_id,
            actual = %actual_id,
            interaction_logged = logged,
            "Correction recorded"
        );
        Ok(sample)
    }
}
