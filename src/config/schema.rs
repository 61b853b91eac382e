use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default sync cadence: every 6 hours.
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 6 * 60 * 60;

// ── Top-level config ─────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub classifier: ClassifierConfig,
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
}

// ── Storage ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root for the database and model artifacts. Defaults to the platform
    /// data directory.
    pub data_dir: Option<PathBuf>,
    /// Override for the interaction/training database path.
    pub database_path: Option<PathBuf>,
}

// ── Classifier ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Remote classification endpoint. `None` keeps classification local.
    pub cloud_url: Option<String>,
    /// Budget for the remote attempt before falling back.
    pub timeout_ms: u64,
    /// Threshold for gestures without a definition.
    pub default_threshold: f64,
    /// Override for the active offline model artifact path.
    pub model_path: Option<PathBuf>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            cloud_url: None,
            timeout_ms: 400,
            default_threshold: crate::gesture::DEFAULT_CONFIDENCE_THRESHOLD,
            model_path: None,
        }
    }
}

// ── Sync ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Correction/training upload endpoint.
    pub upload_url: Option<String>,
    /// Model-check endpoint (`?currentVersion=`).
    pub model_check_url: Option<String>,
    /// Analytics snapshot upload endpoint.
    pub analytics_url: Option<String>,
    /// Bearer token for every central-store request.
    pub api_token: Option<String>,
    /// Samples per upload request.
    pub batch_size: usize,
    /// Only touch the network on unmetered links.
    pub unmetered_only: bool,
    /// Caregiver consent to upload training data.
    pub upload_consent: bool,
    pub request_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            upload_url: None,
            model_check_url: None,
            analytics_url: None,
            api_token: None,
            batch_size: 100,
            unmetered_only: true,
            upload_consent: false,
            request_timeout_secs: 30,
        }
    }
}

// ── Logging ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl Config {
    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("org", "handsign", "handsign")
    }

    /// `<config_dir>/config.toml` for this platform.
    pub fn default_path() -> Option<PathBuf> {
        Self::project_dirs().map(|d| d.config_dir().join("config.toml"))
    }

    /// Parse a TOML document, apply env overrides, validate.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, or the default location; a missing file yields defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_path(),
        };
        match path {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(&p)
                    .with_context(|| format!("Failed to read config: {}", p.display()))?;
                Self::from_toml(&raw).with_context(|| format!("Invalid config: {}", p.display()))
            }
            _ => {
                let mut config = Self::default();
                config.apply_env_overrides();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// `HANDSIGN_CLOUD_URL`, `HANDSIGN_API_TOKEN`, `HANDSIGN_SYNC_URL`.
    ///
    /// `HANDSIGN_SYNC_URL` is a base URL; it fills any sync endpoint not set
    /// explicitly with `/sync-data`, `/check-model`, `/analytics`.
    pub fn apply_env_overrides(&mut self) {
        if let Some(url) = non_empty_env("HANDSIGN_CLOUD_URL") {
            self.classifier.cloud_url = Some(url);
        }
        if let Some(token) = non_empty_env("HANDSIGN_API_TOKEN") {
            self.sync.api_token = Some(token);
        }
        if let Some(base) = non_empty_env("HANDSIGN_SYNC_URL") {
            self.apply_sync_base(&base);
        }
    }

    fn apply_sync_base(&mut self, base: &str) {
        let base = base.trim_end_matches('/');
        self.sync
            .upload_url
            .get_or_insert_with(|| format!("{base}/sync-data"));
        self.sync
            .model_check_url
            .get_or_insert_with(|| format!("{base}/check-model"));
        self.sync
            .analytics_url
            .get_or_insert_with(|| format!("{base}/analytics"));
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.classifier.default_threshold) {
            anyhow::bail!(
                "classifier.default_threshold must be within [0, 1], got {}",
                self.classifier.default_threshold
            );
        }
        if self.classifier.timeout_ms == 0 {
            anyhow::bail!("classifier.timeout_ms must be greater than zero");
        }
        if self.sync.interval_secs == 0 {
            anyhow::bail!("sync.interval_secs must be greater than zero");
        }
        if self.sync.batch_size == 0 {
            anyhow::bail!("sync.batch_size must be greater than zero");
        }
        Ok(())
    }

    /// Directory holding the database and model artifacts.
    pub fn data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .clone()
            .or_else(|| Self::project_dirs().map(|d| d.data_dir().to_path_buf()))
            .unwrap_or_else(|| PathBuf::from(".handsign"))
    }

    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| self.data_dir().join("learning.db"))
    }

    /// Where the active offline model artifact lives.
    pub fn model_path(&self) -> PathBuf {
        self.classifier
            .model_path
            .clone()
            .unwrap_or_else(|| self.data_dir().join("models").join("offline_model.json"))
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
