//! Rolling success-rate and trend snapshots over the interaction log.

use crate::gesture::{InteractionLog, LearningAnalyticsSnapshot};
use crate::store::LearningStore;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Snapshot id covering every gesture.
pub const GLOBAL_ENTITY_ID: &str = "global";

const WINDOW_DAYS: i64 = 7;

/// Fraction of successful interactions; 0 for an empty set.
pub fn success_rate<'a>(logs: impl IntoIterator<Item = &'a InteractionLog>) -> f64 {
    let (total, ok) = logs.into_iter().fold((0u64, 0u64), |(total, ok), log| {
        (total + 1, ok + u64::from(log.was_successful))
    });
    if total == 0 {
        0.0
    } else {
        ok as f64 / total as f64
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Compute the snapshot for `id` from `logs` as of `now`.
///
/// Current window is `[now - 7d, ∞)`, previous is `[now - 14d, now - 7d)`.
pub fn refresh<'a>(
    id: &str,
    logs: impl IntoIterator<Item = &'a InteractionLog>,
    now: DateTime<Utc>,
) -> LearningAnalyticsSnapshot {
    let current_start = now - Duration::days(WINDOW_DAYS);
    let previous_start = now - Duration::days(2 * WINDOW_DAYS);

    let mut current = Vec::new();
    let mut previous = Vec::new();
    for log in logs {
        if log.timestamp >= current_start {
            current.push(log);
        } else if log.timestamp >= previous_start {
            previous.push(log);
        }
    }

    let current_rate = success_rate(current.iter().copied());
    let previous_rate = success_rate(previous.iter().copied());
    LearningAnalyticsSnapshot {
        id: id.to_string(),
        success_rate_7d: round2(current_rate),
        improvement_trend: round2(current_rate - previous_rate),
        last_calculated: now,
    }
}

/// Recomputes and persists snapshots.
#[derive(Clone)]
pub struct AnalyticsAggregator {
    store: Arc<LearningStore>,
}

impl AnalyticsAggregator {
    pub fn new(store: Arc<LearningStore>) -> Self {
        Self { store }
    }

    /// Refresh the global snapshot and one per gesture that has interactions
    /// or an existing row.
    pub fn refresh_all(&self) -> Result<Vec<LearningAnalyticsSnapshot>> {
        self.refresh_at(Utc::now())
    }

    /// Refresh as of `now`. Rows whose rates did not change are left as is,
    /// including their `last_calculated`.
    pub fn refresh_at(&self, now: DateTime<Utc>) -> Result<Vec<LearningAnalyticsSnapshot>> {
        let logs = self
            .store
            .interactions_since(now - Duration::days(2 * WINDOW_DAYS))?;

        // Entities with a stored row are recomputed even once their logs age
        // out of both windows, so they fall back to zero.
        let existing = self.store.snapshots()?;
        let mut by_gesture: BTreeMap<&str, Vec<&InteractionLog>> = existing
            .iter()
            .filter(|s| s.id != GLOBAL_ENTITY_ID)
            .map(|s| (s.id.as_str(), Vec::new()))
            .collect();
        for log in &logs {
            by_gesture
                .entry(log.gesture_definition_id.as_str())
                .or_default()
                .push(log);
        }

        let mut fresh = vec![refresh(GLOBAL_ENTITY_ID, &logs, now)];
        fresh.extend(
            by_gesture
                .into_iter()
                .map(|(id, group)| refresh(id, group.into_iter(), now)),
        );

        let mut out = Vec::with_capacity(fresh.len());
        let mut updated = 0usize;
        for snap in fresh {
            match self.store.snapshot(&snap.id)? {
                Some(existing)
                    if existing.success_rate_7d == snap.success_rate_7d
                        && existing.improvement_trend == snap.improvement_trend =>
                {
                    out.push(existing);
                }
                _ => {
                    self.store.upsert_snapshot(&snap)?;
                    updated += 1;
                    out.push(snap);
                }
            }
        }

        tracing::info!(entities = out.len(), updated, "Analytics refreshed");
        Ok(out)
    }

    pub fn global(&self) -> Result<Option<LearningAnalyticsSnapshot>> {
        self.store.snapshot(GLOBAL_ENTITY_ID)
    }
}
