//! The recognition service object.
//!
//! `GestureEngine` is built once from `Config`, owns every component of the
//! pipeline, and is shared by `Arc`. Data flow:
//!
//! ```text
//! vector ──▶ router ──▶ ClassificationResult ──▶ caller
//!                                                   │ report_outcome
//!                          interaction log ◀────────┤
//!                          health tracker  ◀────────┤──▶ PracticeNotifier
//!                          training log    ◀────────┘ (corrections)
//! ```

use crate::analytics::AnalyticsAggregator;
use crate::classifier::{ClassificationRouter, OfflineClassifier, RemoteClassifier};
use crate::config::Config;
use crate::gesture::{
    ClassificationResult, GestureDefinition, InteractionLog, LandmarkProvider, LandmarkVector,
    LearningAnalyticsSnapshot, SampleSource, TrainingSample,
};
use crate::learning::{HealthScoreTracker, RetrainJob, RetrainSummary};
use crate::store::{LearningStore, TrainingCapture};
use crate::sync::{ConnectivityProbe, SyncService};
use anyhow::{Context, Result};
use std::sync::Arc;

/// UI boundary for remedial-practice prompts.
pub trait PracticeNotifier: Send + Sync {
    fn remedial_practice_needed(&self, gesture: &GestureDefinition);
}

/// Default notifier: logs the prompt.
pub struct LogNotifier;

impl PracticeNotifier for LogNotifier {
    fn remedial_practice_needed(&self, gesture: &GestureDefinition) {
        tracing::info!(
            gesture = %gesture.id,
            label = %gesture.label,
            score = gesture.health_score,
            "Remedial practice suggested"
        );
    }
}

/// What the caregiver said about a recognition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Confirmed,
    /// The child meant this gesture id instead.
    Corrected(String),
}

/// Effects of one `report_outcome` call.
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeReport {
    /// Gesture whose health score was updated (the recognized one).
    pub gesture_id: String,
    pub remedial_practice: bool,
    /// The correction sample, for corrected outcomes.
    pub correction: Option<TrainingSample>,
}

pub struct GestureEngine {
    config: Config,
    store: Arc<LearningStore>,
    offline: Arc<OfflineClassifier>,
    router: ClassificationRouter,
    tracker: HealthScoreTracker,
    capture: TrainingCapture,
    aggregator: AnalyticsAggregator,
    notifier: Arc<dyn PracticeNotifier>,
}

impl GestureEngine {
    /// Open the configured database and load the active model, if any.
    pub fn from_config(config: Config) -> Result<Self> {
        let db_path = config.database_path();
        let store = Arc::new(
            LearningStore::open(&db_path)
                .with_context(|| format!("Failed to open store at {}", db_path.display()))?,
        );

        let model_path = config.model_path();
        let offline = match OfflineClassifier::load_or_empty(&model_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Ignoring unreadable offline model, starting empty: {e:#}");
                OfflineClassifier::new()
            }
        };
        Ok(Self::with_store(config, store, Arc::new(offline)))
    }

    /// Assemble from an already-open store and classifier.
    pub fn with_store(config: Config, store: Arc<LearningStore>, offline: Arc<OfflineClassifier>) -> Self {
        let router = ClassificationRouter::from_config(
            &config.classifier,
            config.sync.api_token.as_deref(),
            Arc::clone(&offline),
            store.clone(),
        );
        Self {
            tracker: HealthScoreTracker::new(Arc::clone(&store)),
            capture: TrainingCapture::new(Arc::clone(&store)),
            aggregator: AnalyticsAggregator::new(Arc::clone(&store)),
            config,
            store,
            offline,
            router,
            notifier: Arc::new(LogNotifier),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn PracticeNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Replace the configured remote classifier.
    pub fn with_remote(mut self, remote: Arc<dyn RemoteClassifier>) -> Self {
        self.router = self.router.with_remote(remote);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<LearningStore> {
        &self.store
    }

    pub fn offline(&self) -> &Arc<OfflineClassifier> {
        &self.offline
    }

    pub fn router(&self) -> &ClassificationRouter {
        &self.router
    }

    pub fn capture(&self) -> &TrainingCapture {
        &self.capture
    }

    // ── Recognition ─────────────────────────────────────────────

    pub async fn classify(&self, vector: &LandmarkVector) -> ClassificationResult {
        self.router.classify_gesture(vector).await
    }

    /// Extract landmarks from `frame` and classify. `None` when no hand is
    /// detected.
    pub async fn classify_frame<P: LandmarkProvider>(
        &self,
        provider: &P,
        frame: &P::Frame,
    ) -> Option<ClassificationResult> {
        let vector = provider.extract(frame)?;
        Some(self.classify(&vector).await)
    }

    /// Record the caregiver's verdict on `result`.
    ///
    /// Confirmed: a successful interaction for the recognized gesture.
    /// Corrected: a correction sample under the actual gesture plus a failed
    /// interaction for the recognized one, written together. Either way the
    /// recognized gesture's health is updated, and the notifier is told if
    /// practice is needed. Correcting to the same label counts as a
    /// confirmation.
    pub fn report_outcome(
        &self,
        result: &ClassificationResult,
        vector: LandmarkVector,
        outcome: Outcome,
    ) -> Result<OutcomeReport> {
        let (log, correction) = match outcome {
            Outcome::Corrected(actual) if actual != result.label => {
                let sample = self
                    .capture
                    .record_correction_for(result, &actual, vector)?;
                let log = InteractionLog::new(&result.label, false, result.confidence, result.processed_by)
                    .at(sample.created_at);
                (log, Some(sample))
            }
            _ => {
                let log = InteractionLog::new(&result.label, true, result.confidence, result.processed_by);
                self.store.append_interaction(&log)?;
                (log, None)
            }
        };

        let remedial_practice = self.tracker.process_interaction(&log)?;
        if remedial_practice {
            if let Some(def) = self.store.gesture(&result.label)? {
                self.notifier.remedial_practice_needed(&def);
            }
        }

        Ok(OutcomeReport {
            gesture_id: result.label.clone(),
            remedial_practice,
            correction,
        })
    }

    // ── Vocabulary and training ─────────────────────────────────

    pub fn define_gesture(&self, id: &str, label: &str) -> Result<GestureDefinition> {
        self.store.define_gesture(id, label)
    }

    /// Record a deliberate teaching-session capture.
    pub fn record_sample(&self, gesture_id: &str, vector: LandmarkVector) -> Result<TrainingSample> {
        self.capture
            .record_sample(gesture_id, vector, SampleSource::LiveCapture)
    }

    /// Rebuild from the training log, write to the active model path, swap
    /// it in, and promote newly covered gestures to `ready`.
    pub fn retrain_and_install(&self, version: Option<String>) -> Result<RetrainSummary> {
        RetrainJob::new(Arc::clone(&self.store)).run_and_install(
            &self.config.model_path(),
            version,
            &self.offline,
        )
    }

    pub fn refresh_analytics(&self) -> Result<Vec<LearningAnalyticsSnapshot>> {
        self.aggregator.refresh_all()
    }

    /// A sync service sharing this engine's store and classifier.
    pub fn sync_service(&self, probe: Arc<dyn ConnectivityProbe>) -> SyncService {
        SyncService::from_config(
            &self.config,
            Arc::clone(&self.store),
            Arc::clone(&self.offline),
            probe,
        )
    }
}
