//! Periodic exchange with the central store.
//!
//! Each cycle pushes pending training samples, checks for a newer offline
//! model, and posts analytics. Every half is best-effort: a failure is
//! logged, recorded in the `SyncReport`, and retried on the next tick.

use super::policy::{ConnectivityProbe, SkipReason, SyncPolicy};
use super::protocol::{AnalyticsUpload, ModelCheckResponse, UploadRequest};
use crate::analytics::AnalyticsAggregator;
use crate::classifier::{OfflineClassifier, OfflineModel};
use crate::config::Config;
use crate::gesture::TrainingSample;
use crate::store::LearningStore;
use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

const META_LAST_PUSH: &str = "sync.last_push_at";
const META_LAST_MODEL: &str = "sync.last_model_version";

// ── Report ──────────────────────────────────────────────────────

/// Result of one half of a cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    #[default]
    Done,
    Skipped {
        reason: SkipReason,
    },
    Failed {
        error: String,
    },
}

impl StepOutcome {
    fn failed(err: &anyhow::Error) -> Self {
        Self::Failed {
            error: format!("{err:#}"),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

/// What one sync cycle did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    /// Samples acknowledged by the collector and flipped to synced.
    pub uploaded: usize,
    pub push: StepOutcome,
    /// Version installed by this cycle, if a new model arrived.
    pub installed_version: Option<String>,
    pub pull: StepOutcome,
    pub analytics: StepOutcome,
}

// ── Service ─────────────────────────────────────────────────────

pub struct SyncService {
    store: Arc<LearningStore>,
    classifier: Arc<OfflineClassifier>,
    aggregator: AnalyticsAggregator,
    probe: Arc<dyn ConnectivityProbe>,
    policy: SyncPolicy,
    client: reqwest::Client,
    upload_url: Option<String>,
    model_check_url: Option<String>,
    analytics_url: Option<String>,
    api_token: Option<String>,
    batch_size: usize,
    interval: Duration,
    model_path: PathBuf,
}

impl SyncService {
    pub fn from_config(
        config: &Config,
        store: Arc<LearningStore>,
        classifier: Arc<OfflineClassifier>,
        probe: Arc<dyn ConnectivityProbe>,
    ) -> Self {
        let sync = &config.sync;
        let request_timeout = Duration::from_secs(sync.request_timeout_secs.max(1));
        let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.trim().is_empty());
        Self {
            aggregator: AnalyticsAggregator::new(Arc::clone(&store)),
            store,
            classifier,
            probe,
            policy: SyncPolicy::from_config(sync),
            client: reqwest::Client::builder()
                .timeout(request_timeout)
                .connect_timeout(request_timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            upload_url: non_empty(&sync.upload_url),
            model_check_url: non_empty(&sync.model_check_url),
            analytics_url: non_empty(&sync.analytics_url),
            api_token: non_empty(&sync.api_token),
            batch_size: sync.batch_size.max(1),
            interval: Duration::from_secs(sync.interval_secs.max(1)),
            model_path: config.model_path(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// One full cycle. Never fails; outcomes are in the report.
    ///
    /// Push and pull run concurrently so neither delays the other.
    pub async fn run_cycle(&self) -> SyncReport {
        let link = self.probe.current();

        let push = async {
            if self.upload_url.is_none() {
                return (0, StepOutcome::Skipped { reason: SkipReason::NotConfigured });
            }
            if let Err(reason) = self.policy.upload_allowed(link) {
                return (0, StepOutcome::Skipped { reason });
            }
            match self.push_pending().await {
                Ok(n) => (n, StepOutcome::Done),
                Err(e) => {
                    tracing::warn!("Training upload failed, will retry next cycle: {e:#}");
                    (0, StepOutcome::failed(&e))
                }
            }
        };

        let pull = async {
            if self.model_check_url.is_none() {
                return (None, StepOutcome::Skipped { reason: SkipReason::NotConfigured });
            }
            if let Err(reason) = self.policy.network_allowed(link) {
                return (None, StepOutcome::Skipped { reason });
            }
            match self.pull_model().await {
                Ok(version) => (version, StepOutcome::Done),
                Err(e) => {
                    tracing::warn!("Model check failed, will retry next cycle: {e:#}");
                    (None, StepOutcome::failed(&e))
                }
            }
        };

        let ((uploaded, push), (installed_version, pull)) = tokio::join!(push, pull);

        let analytics = if self.analytics_url.is_none() {
            StepOutcome::Skipped { reason: SkipReason::NotConfigured }
        } else if let Err(reason) = self.policy.network_allowed(link) {
            StepOutcome::Skipped { reason }
        } else {
            match self.push_analytics().await {
                Ok(_) => StepOutcome::Done,
                Err(e) => {
                    tracing::warn!("Analytics upload failed: {e:#}");
                    StepOutcome::failed(&e)
                }
            }
        };

        SyncReport {
            uploaded,
            push,
            installed_version,
            pull,
            analytics,
        }
    }

    /// Upload pending samples batch by batch.
    ///
    /// A batch is flipped to synced only after a 2xx; the first failed batch
    /// stops the push and leaves it (and everything after it) pending.
    pub async fn push_pending(&self) -> Result<usize> {
        let Some(url) = self.upload_url.as_deref() else {
            return Ok(0);
        };

        let mut uploaded = 0;
        loop {
            let batch = self.store.pending_samples(self.batch_size)?;
            if batch.is_empty() {
                break;
            }

            self.upload_batch(url, &batch)
                .await
                .with_context(|| format!("after {uploaded} samples acknowledged"))?;

            let ids: Vec<String> = batch.iter().map(|s| s.id.clone()).collect();
            let flipped = self.store.mark_synced(&ids)?;
            uploaded += flipped;
            tracing::debug!(batch = batch.len(), flipped, "Upload batch acknowledged");

            if flipped == 0 || batch.len() < self.batch_size {
                break;
            }
        }

        if uploaded > 0 {
            self.store.set_meta(
                META_LAST_PUSH,
                &Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            )?;
            tracing::info!(uploaded, "Training samples synced");
        }
        Ok(uploaded)
    }

    async fn upload_batch(&self, url: &str, batch: &[TrainingSample]) -> Result<()> {
        let body = UploadRequest::from_samples(batch);
        let resp = self.authed(self.client.post(url).json(&body)).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("Collector returned status {}", resp.status());
        }
        Ok(())
    }

    /// Ask for a newer model and install it if offered.
    ///
    /// The artifact is validated, written next to the active path, renamed
    /// into place, and only then swapped into the classifier. Returns the
    /// installed version.
    pub async fn pull_model(&self) -> Result<Option<String>> {
        let Some(check_url) = self.model_check_url.as_deref() else {
            return Ok(None);
        };

        let current = self.classifier.version().unwrap_or_default();
        let mut url = reqwest::Url::parse(check_url)
            .with_context(|| format!("Invalid model check URL: {check_url}"))?;
        url.query_pairs_mut().append_pair("currentVersion", &current);

        let resp = self.authed(self.client.get(url.clone())).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("Model check returned status {}", resp.status());
        }
        let check: ModelCheckResponse = resp.json().await.context("Malformed model check response")?;
        if !check.has_new_model {
            tracing::debug!(current = %current, "Offline model is up to date");
            return Ok(None);
        }

        let model_ref = check
            .model_url
            .as_deref()
            .context("Model check offered a new model without a URL")?;
        let model_url = url
            .join(model_ref)
            .with_context(|| format!("Invalid model URL: {model_ref}"))?;

        let resp = self.authed(self.client.get(model_url.clone())).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("Model download returned status {}", resp.status());
        }
        let raw = resp.text().await?;
        let mut model = OfflineModel::from_json(&raw)
            .with_context(|| format!("Downloaded model from {model_url} is invalid"))?;
        if model.version.is_none() {
            model.version = check.version.clone();
        }

        model.write_atomic(&self.model_path)?;
        let version = model
            .version
            .clone()
            .unwrap_or_else(|| "unversioned".to_string());
        self.classifier.install(model);
        self.store.set_meta(META_LAST_MODEL, &version)?;

        tracing::info!(
            version = %version,
            path = %self.model_path.display(),
            "Downloaded and installed offline model"
        );
        Ok(Some(version))
    }

    /// Refresh analytics and post every snapshot. Returns how many were sent.
    pub async fn push_analytics(&self) -> Result<usize> {
        let Some(url) = self.analytics_url.as_deref() else {
            return Ok(0);
        };
        let snapshots = self.aggregator.refresh_all()?;
        let body = AnalyticsUpload {
            snapshots: &snapshots,
        };
        let resp = self.authed(self.client.post(url).json(&body)).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("Analytics endpoint returned status {}", resp.status());
        }
        tracing::debug!(snapshots = snapshots.len(), "Analytics uploaded");
        Ok(snapshots.len())
    }

    /// Run a cycle now and then every interval until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_secs = self.interval.as_secs(), "Sync service started");

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("Sync service stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let report = self.run_cycle().await;
                    tracing::info!(
                        uploaded = report.uploaded,
                        push_ok = report.push.is_done(),
                        pull_ok = report.pull.is_done(),
                        installed = report.installed_version.as_deref().unwrap_or("none"),
                        "Sync cycle finished"
                    );
                }
            }
        }
    }
}
