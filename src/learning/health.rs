//! Adaptive per-gesture health score and confidence threshold.

use crate::gesture::{GestureDefinition, InteractionLog, MAX_HEALTH_SCORE};
use crate::store::LearningStore;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Health score below which remedial practice is requested.
pub const REMEDIAL_PRACTICE_BELOW: u32 = 70;

const SUCCESS_REWARD: u32 = 1;
const FAILURE_PENALTY: u32 = 5;
const SUCCESS_THRESHOLD_STEP: f64 = 0.01;
const FAILURE_THRESHOLD_STEP: f64 = 0.02;

/// Apply one outcome to `def` in place.
///
/// Returns whether the post-update score calls for remedial practice.
pub fn apply_outcome(def: &mut GestureDefinition, was_successful: bool, at: DateTime<Utc>) -> bool {
    if was_successful {
        def.health_score = (def.health_score + SUCCESS_REWARD).min(MAX_HEALTH_SCORE);
        def.min_confidence_threshold = (def.min_confidence_threshold - SUCCESS_THRESHOLD_STEP).max(0.0);
        def.last_successful_recognition = Some(at);
    } else {
        def.health_score = def.health_score.saturating_sub(FAILURE_PENALTY);
        def.min_confidence_threshold = (def.min_confidence_threshold + FAILURE_THRESHOLD_STEP).min(1.0);
    }
    def.health_score < REMEDIAL_PRACTICE_BELOW
}

/// Runs [`apply_outcome`] against stored definitions.
///
/// Each update is one store transaction, so outcomes for the same gesture
/// apply one after another.
#[derive(Clone)]
pub struct HealthScoreTracker {
    store: Arc<LearningStore>,
}

impl HealthScoreTracker {
    pub fn new(store: Arc<LearningStore>) -> Self {
        Self { store }
    }

    /// Update the gesture named by `log`. Unknown gestures are a no-op
    /// returning `false`.
    pub fn process_interaction(&self, log: &InteractionLog) -> Result<bool> {
        let outcome = self.store.update_gesture(&log.gesture_definition_id, |def| {
            let triggered = apply_outcome(def, log.was_successful, log.timestamp);
            (triggered, def.health_score, def.min_confidence_threshold)
        })?;

        let Some((triggered, score, threshold)) = outcome else {
            tracing::debug!(
                gesture = %log.gesture_definition_id,
                "Ignoring interaction for unknown gesture"
            );
            return Ok(false);
        };

        if triggered {
            tracing::info!(
                gesture = %log.gesture_definition_id,
                score,
                threshold,
                "Health score below practice threshold"
            );
        } else {
            tracing::debug!(
                gesture = %log.gesture_definition_id,
                success = log.was_successful,
                score,
                threshold,
                "Health score updated"
            );
        }
        Ok(triggered)
    }
}
