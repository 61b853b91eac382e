use super::landmarks::LandmarkVector;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health score given to a newly defined gesture.
pub const DEFAULT_HEALTH_SCORE: u32 = 100;

/// Upper bound of the health score.
pub const MAX_HEALTH_SCORE: u32 = 100;

/// Confidence threshold used when a gesture has no definition yet.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.7;

// ── Enumerations ─────────────────────────────────────────────────

/// Lifecycle state of a gesture definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GestureStatus {
    /// Still collecting samples; not yet in the offline model.
    Training,
    /// Part of the served vocabulary.
    Ready,
    /// Switched off by an admin; stays off until re-enabled.
    Disabled,
}

impl GestureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Training => "training",
            Self::Ready => "ready",
            Self::Disabled => "disabled",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "ready" => Self::Ready,
            "disabled" => Self::Disabled,
            _ => Self::Training,
        }
    }
}

/// Provenance of a training sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SampleSource {
    /// Captured deliberately in a teaching session.
    LiveCapture,
    /// Produced by a caregiver correcting a wrong recognition.
    Correction,
}

impl SampleSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LiveCapture => "liveCapture",
            Self::Correction => "correction",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "correction" => Self::Correction,
            _ => Self::LiveCapture,
        }
    }
}

/// Upload state of a training sample. Only ever moves pending → synced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Synced,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "synced" => Self::Synced,
            _ => Self::Pending,
        }
    }
}

/// Which classifier produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessedBy {
    Local,
    Cloud,
}

impl ProcessedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Cloud => "cloud",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "cloud" => Self::Cloud,
            _ => Self::Local,
        }
    }
}

// ── Records ──────────────────────────────────────────────────────

/// A vocabulary symbol the child can sign, with its adaptive quality state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GestureDefinition {
    pub id: String,
    pub label: String,
    pub status: GestureStatus,
    /// Quality metric in `[0, 100]`.
    pub health_score: u32,
    /// Confidence below which a recognition asks for confirmation, in `[0, 1]`.
    pub min_confidence_threshold: f64,
    pub training_sessions_count: u32,
    #[serde(default)]
    pub last_successful_recognition: Option<DateTime<Utc>>,
}

impl GestureDefinition {
    /// A freshly defined gesture: training, full health, default threshold.
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            status: GestureStatus::Training,
            health_score: DEFAULT_HEALTH_SCORE,
            min_confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            training_sessions_count: 0,
            last_successful_recognition: None,
        }
    }
}

/// One labelled landmark vector in the append-only training log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingSample {
    pub id: String,
    pub gesture_definition_id: String,
    pub landmark_data: LandmarkVector,
    pub source: SampleSource,
    pub sync_status: SyncStatus,
    pub created_at: DateTime<Utc>,
    /// For corrections: the gesture that was wrongly recognized.
    #[serde(default)]
    pub predicted_gesture_id: Option<String>,
    /// For corrections: the confidence of the wrong recognition.
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl TrainingSample {
    /// A pending sample stamped with a fresh id and the current time.
    pub fn new(
        gesture_definition_id: impl Into<String>,
        landmark_data: LandmarkVector,
        source: SampleSource,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            gesture_definition_id: gesture_definition_id.into(),
            landmark_data,
            source,
            sync_status: SyncStatus::Pending,
            created_at: Utc::now(),
            predicted_gesture_id: None,
            confidence: None,
        }
    }
}

/// One recognition outcome; the system of record for scoring and analytics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionLog {
    pub id: String,
    pub gesture_definition_id: String,
    pub was_successful: bool,
    pub confidence_score: f64,
    pub timestamp: DateTime<Utc>,
    pub processed_by: ProcessedBy,
    /// Gesture a caregiver substituted for a wrong recognition.
    #[serde(default)]
    pub caregiver_override_id: Option<String>,
}

impl InteractionLog {
    pub fn new(
        gesture_definition_id: impl Into<String>,
        was_successful: bool,
        confidence_score: f64,
        processed_by: ProcessedBy,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            gesture_definition_id: gesture_definition_id.into(),
            was_successful,
            confidence_score,
            timestamp: Utc::now(),
            processed_by,
            caregiver_override_id: None,
        }
    }

    /// Same log with an explicit timestamp (imports, backfills, tests).
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Uniform classification outcome, whichever classifier produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub label: String,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub processed_by: ProcessedBy,
    pub timestamp: DateTime<Utc>,
    /// Caregiver-facing suggestions (cloud only).
    pub suggestions: Vec<String>,
    pub requires_confirmation: bool,
}

/// Rolling recognition-quality summary for one tracked entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningAnalyticsSnapshot {
    /// `"global"` or a gesture definition id.
    pub id: String,
    #[serde(rename = "successRate7d")]
    pub success_rate_7d: f64,
    pub improvement_trend: f64,
    pub last_calculated: DateTime<Utc>,
}
