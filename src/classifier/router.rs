//! Classification routing engine.
//!
//! Races the remote classifier against a fixed timeout and falls back to
//! the offline nearest-centroid classifier on timeout, non-2xx, or any
//! transport error. Every call yields a `ClassificationResult`.

use super::offline::OfflineClassifier;
use super::remote::{HttpRemoteClassifier, RemoteClassifier};
use crate::config::ClassifierConfig;
use crate::gesture::{ClassificationResult, LandmarkVector, ProcessedBy, DEFAULT_CONFIDENCE_THRESHOLD};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Remote race budget.
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_millis(400);

// ── Threshold lookup ─────────────────────────────────────────────

/// Source of per-gesture confidence thresholds.
pub trait ThresholdLookup: Send + Sync {
    /// The gesture's `minConfidenceThreshold`, or `None` if it is unknown.
    fn threshold_for(&self, gesture_id: &str) -> Option<f64>;
}

impl ThresholdLookup for HashMap<String, f64> {
    fn threshold_for(&self, gesture_id: &str) -> Option<f64> {
        self.get(gesture_id).copied()
    }
}

// ── Router stats ─────────────────────────────────────────────────

/// Counters for how requests were served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RouterStats {
    /// Requests answered by the remote classifier.
    pub cloud: u64,
    /// Requests answered by the offline classifier.
    pub local: u64,
    /// Local answers that followed a failed or timed-out remote attempt.
    pub fallbacks: u64,
}

#[derive(Default)]
struct Counters {
    cloud: AtomicU64,
    local: AtomicU64,
    fallbacks: AtomicU64,
}

// ── Router ───────────────────────────────────────────────────────

/// Online/offline classification router.
pub struct ClassificationRouter {
    remote: Option<Arc<dyn RemoteClassifier>>,
    offline: Arc<OfflineClassifier>,
    thresholds: Arc<dyn ThresholdLookup>,
    timeout: Duration,
    default_threshold: f64,
    counters: Counters,
}

impl ClassificationRouter {
    /// A local-only router (no remote endpoint).
    pub fn new(offline: Arc<OfflineClassifier>, thresholds: Arc<dyn ThresholdLookup>) -> Self {
        Self {
            remote: None,
            offline,
            thresholds,
            timeout: DEFAULT_REMOTE_TIMEOUT,
            default_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            counters: Counters::default(),
        }
    }

    /// Create from a `ClassifierConfig`.
    pub fn from_config(
        config: &ClassifierConfig,
        api_token: Option<&str>,
        offline: Arc<OfflineClassifier>,
        thresholds: Arc<dyn ThresholdLookup>,
    ) -> Self {
        let timeout = Duration::from_millis(config.timeout_ms);
        let mut router = Self::new(offline, thresholds)
            .with_timeout(timeout)
            .with_default_threshold(config.default_threshold);
        if let Some(url) = config.cloud_url.as_deref().filter(|u| !u.trim().is_empty()) {
            router = router.with_remote(Arc::new(HttpRemoteClassifier::new(
                url,
                api_token,
                // The client's own deadline only bounds abandoned requests.
                timeout.saturating_mul(4),
            )));
        }
        router
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteClassifier>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_default_threshold(mut self, threshold: f64) -> Self {
        self.default_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn offline(&self) -> &Arc<OfflineClassifier> {
        &self.offline
    }

    pub fn stats(&self) -> RouterStats {
        RouterStats {
            cloud: self.counters.cloud.load(Ordering::Relaxed),
            local: self.counters.local.load(Ordering::Relaxed),
            fallbacks: self.counters.fallbacks.load(Ordering::Relaxed),
        }
    }

    /// Threshold for `gesture_id`, or the router default if unknown.
    pub fn active_threshold(&self, gesture_id: &str) -> f64 {
        self.thresholds
            .threshold_for(gesture_id)
            .unwrap_or(self.default_threshold)
    }

    /// Classify a landmark vector.
    ///
    /// 1. If a remote classifier is configured, race it against the timeout.
    /// 2. On remote success, return its answer tagged `cloud`.
    /// 3. Otherwise classify offline and tag `local`.
    ///
    /// Exactly one of the two paths produces the result. A remote call that
    /// loses the race is dropped, so its late answer is never used.
    pub async fn classify_gesture(&self, vector: &LandmarkVector) -> ClassificationResult {
        if let Some(remote) = &self.remote {
            match tokio::time::timeout(self.timeout, remote.classify(vector)).await {
                Ok(Ok(answer)) => {
                    self.counters.cloud.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(
                        label = %answer.label,
                        confidence = answer.confidence,
                        remote = remote.name(),
                        "Gesture classified remotely"
                    );
                    return self.finish(
                        answer.label,
                        answer.confidence,
                        ProcessedBy::Cloud,
                        answer.suggestions,
                    );
                }
                Ok(Err(e)) => {
                    tracing::warn!("Remote classification failed, falling back to offline model: {e}");
                }
                Err(_) => {
                    tracing::warn!(
                        timeout_ms = self.timeout.as_millis() as u64,
                        "Remote classification timed out, falling back to offline model"
                    );
                }
            }
            self.counters.fallbacks.fetch_add(1, Ordering::Relaxed);
        }

        let prediction = self.offline.classify(vector);
        self.counters.local.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            label = %prediction.label,
            confidence = prediction.confidence,
            "Gesture classified offline"
        );
        self.finish(
            prediction.label,
            prediction.confidence,
            ProcessedBy::Local,
            Vec::new(),
        )
    }

    fn finish(
        &self,
        label: String,
        confidence: f64,
        processed_by: ProcessedBy,
        suggestions: Vec<String>,
    ) -> ClassificationResult {
        let threshold = self.active_threshold(&label);
        ClassificationResult {
            requires_confirmation: confidence < threshold,
            label,
            confidence,
            processed_by,
            timestamp: Utc::now(),
            suggestions,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::artifact::OfflineModel;
    use crate::classifier::remote::RemoteClassification;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicUsize;

    /// Scripted remote used to exercise the race without a network.
    struct ScriptedRemote {
        delay: Duration,
        answer: Option<RemoteClassification>,
        calls: AtomicUsize,
    }

    impl ScriptedRemote {
        fn answering(label: &str, confidence: f64, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                answer: Some(RemoteClassification {
                    label: label.into(),
                    confidence,
                    suggestions: vec!["try again".into()],
                }),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                delay: Duration::ZERO,
                answer: None,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl RemoteClassifier for ScriptedRemote {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn classify(&self, _vector: &LandmarkVector) -> anyhow::Result<RemoteClassification> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.answer
                .clone()
                .ok_or_else(|| anyhow::anyhow!("connection refused"))
        }
    }

    fn vector() -> LandmarkVector {
        LandmarkVector::new(vec![0.0, 0.0]).unwrap()
    }

    fn thresholds(entries: &[(&str, f64)]) -> Arc<dyn ThresholdLookup> {
        let map: HashMap<String, f64> = entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), *v))
            .collect();
        Arc::new(map)
    }

    fn offline_with(entries: &[(&str, &[f64])]) -> Arc<OfflineClassifier> {
        let centroids: BTreeMap<String, Vec<f64>> = entries
            .iter()
            .map(|(id, c)| ((*id).to_string(), c.to_vec()))
            .collect();
        Arc::new(OfflineClassifier::with_model(OfflineModel::new(centroids)))
    }

    #[tokio::test]
    async fn no_remote_no_model_returns_unknown_local() {
        let router = ClassificationRouter::new(Arc::new(OfflineClassifier::new()), thresholds(&[]));
        let result = router.classify_gesture(&vector()).await;
        assert_eq!(result.label, "unknown");
        assert!((result.confidence - 0.5).abs() < f64::EPSILON);
        assert_eq!(result.processed_by, ProcessedBy::Local);
        assert!(result.suggestions.is_empty());
        assert!(result.requires_confirmation);
    }

    #[tokio::test]
    async fn remote_success_is_tagged_cloud() {
        let remote = ScriptedRemote::answering("drink", 0.9, Duration::ZERO);
        let router = ClassificationRouter::new(offline_with(&[("eat", &[0.0, 0.0])]), thresholds(&[]))
            .with_remote(remote.clone());

        let result = router.classify_gesture(&vector()).await;
        assert_eq!(result.label, "drink");
        assert_eq!(result.processed_by, ProcessedBy::Cloud);
        assert_eq!(result.suggestions, vec!["try again".to_string()]);
        assert!(!result.requires_confirmation);
        assert_eq!(
            router.stats(),
            RouterStats {
                cloud: 1,
                local: 0,
                fallbacks: 0
            }
        );
    }

    #[tokio::test]
    async fn remote_error_falls_back_once() {
        let remote = ScriptedRemote::failing();
        let router = ClassificationRouter::new(offline_with(&[("eat", &[0.0, 0.0])]), thresholds(&[]))
            .with_remote(remote.clone());

        let result = router.classify_gesture(&vector()).await;
        assert_eq!(result.label, "eat");
        assert_eq!(result.processed_by, ProcessedBy::Local);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            router.stats(),
            RouterStats {
                cloud: 0,
                local: 1,
                fallbacks: 1
            }
        );
    }

    #[tokio::test]
    async fn slow_remote_times_out_to_local() {
        let remote = ScriptedRemote::answering("drink", 0.99, Duration::from_secs(5));
        let router = ClassificationRouter::new(Arc::new(OfflineClassifier::new()), thresholds(&[]))
            .with_remote(remote)
            .with_timeout(Duration::from_millis(50));

        let started = std::time::Instant::now();
        let result = router.classify_gesture(&vector()).await;
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(result.processed_by, ProcessedBy::Local);
        assert_eq!(result.label, "unknown");
    }

    #[tokio::test]
    async fn requires_confirmation_uses_gesture_threshold() {
        // Distance 1 → confidence 0.5.
        let offline = offline_with(&[("eat", &[1.0, 0.0])]);
        let strict = ClassificationRouter::new(offline.clone(), thresholds(&[("eat", 0.6)]));
        assert!(strict.classify_gesture(&vector()).await.requires_confirmation);

        let lenient = ClassificationRouter::new(offline, thresholds(&[("eat", 0.4)]));
        assert!(!lenient.classify_gesture(&vector()).await.requires_confirmation);
    }

    #[tokio::test]
    async fn threshold_applies_to_cloud_results_too() {
        let remote = ScriptedRemote::answering("drink", 0.8, Duration::ZERO);
        let router = ClassificationRouter::new(Arc::new(OfflineClassifier::new()), thresholds(&[("drink", 0.85)]))
            .with_remote(remote);
        assert!(router.classify_gesture(&vector()).await.requires_confirmation);
    }

    #[test]
    fn unknown_gesture_uses_default_threshold() {
        let router = ClassificationRouter::new(Arc::new(OfflineClassifier::new()), thresholds(&[]));
        assert!((router.active_threshold("nope") - 0.7).abs() < f64::EPSILON);
        let router = router.with_default_threshold(1.5);
        assert!((router.active_threshold("nope") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn from_config_without_url_is_local_only() {
        let config = ClassifierConfig::default();
        let router = ClassificationRouter::from_config(
            &config,
            None,
            Arc::new(OfflineClassifier::new()),
            thresholds(&[]),
        );
        assert!(!router.has_remote());
        assert_eq!(router.timeout(), Duration::from_millis(400));
    }
}
