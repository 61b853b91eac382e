//! Offline model artifacts: decode, validate, and write-then-rename.

use crate::error::GestureError;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// Gesture id → centroid vector.
///
/// A `BTreeMap` so iteration (and therefore tie-breaking) is lexicographic
/// by gesture id. Replaced wholesale on every retraining run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineModel {
    pub version: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub centroids: BTreeMap<String, Vec<f64>>,
}

/// On-disk shapes accepted by the loader.
#[derive(Deserialize)]
#[serde(untagged)]
enum ArtifactRepr {
    Versioned {
        #[serde(default)]
        version: Option<String>,
        #[serde(default, rename = "createdAt")]
        created_at: Option<DateTime<Utc>>,
        centroids: BTreeMap<String, Vec<f64>>,
    },
    /// Unversioned `{ "<id>": [..] }` mapping.
    Bare(BTreeMap<String, Vec<f64>>),
}

impl OfflineModel {
    pub fn new(centroids: BTreeMap<String, Vec<f64>>) -> Self {
        Self {
            version: None,
            created_at: None,
            centroids,
        }
    }

    /// Stamp a version and creation time.
    pub fn versioned(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self.created_at = Some(Utc::now());
        self
    }

    pub fn len(&self) -> usize {
        self.centroids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty()
    }

    pub fn centroid(&self, gesture_id: &str) -> Option<&[f64]> {
        self.centroids.get(gesture_id).map(Vec::as_slice)
    }

    /// Decode and validate an artifact.
    pub fn from_json(raw: &str) -> std::result::Result<Self, GestureError> {
        let repr: ArtifactRepr = serde_json::from_str(raw)
            .map_err(|e| GestureError::MalformedArtifact(e.to_string()))?;
        let model = match repr {
            ArtifactRepr::Versioned {
                version,
                created_at,
                centroids,
            } => Self {
                version,
                created_at,
                centroids,
            },
            ArtifactRepr::Bare(centroids) => Self::new(centroids),
        };
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> std::result::Result<(), GestureError> {
        for (id, centroid) in &self.centroids {
            if centroid.is_empty() {
                return Err(GestureError::MalformedArtifact(format!(
                    "centroid for '{id}' is empty"
                )));
            }
            if centroid.iter().any(|v| !v.is_finite()) {
                return Err(GestureError::MalformedArtifact(format!(
                    "centroid for '{id}' has non-finite values"
                )));
            }
        }
        Ok(())
    }

    /// Read an artifact from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model artifact: {}", path.display()))?;
        Self::from_json(&raw)
            .with_context(|| format!("Invalid model artifact: {}", path.display()))
    }

    /// Write to a temp file next to `path`, then rename over it.
    ///
    /// Readers of `path` see either the previous artifact or this one.
    pub fn write_atomic(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, json.as_bytes())
    }
}

/// Replace `path` with `bytes` via a sibling temp file and rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create model dir: {}", dir.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("Failed to install artifact at {}", path.display()))?;
    Ok(())
}
