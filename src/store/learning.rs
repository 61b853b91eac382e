use crate::classifier::ThresholdLookup;
use crate::gesture::{
    GestureDefinition, GestureStatus, InteractionLog, LandmarkVector, LearningAnalyticsSnapshot,
    ProcessedBy, SampleSource, SyncStatus, TrainingSample,
};
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

// ── Row helpers ─────────────────────────────────────────────────

/// Fixed-width UTC timestamps so lexicographic order is time order.
fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

fn conversion_error(column: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(err))
}

const GESTURE_COLUMNS: &str = "id, label, status, health_score, min_confidence_threshold,
     training_sessions_count, last_successful_recognition";

fn gesture_from_row(row: &Row<'_>) -> rusqlite::Result<GestureDefinition> {
    Ok(GestureDefinition {
        id: row.get(0)?,
        label: row.get(1)?,
        status: GestureStatus::from_str_lossy(&row.get::<_, String>(2)?),
        health_score: row.get(3)?,
        min_confidence_threshold: row.get(4)?,
        training_sessions_count: row.get(5)?,
        last_successful_recognition: row
            .get::<_, Option<String>>(6)?
            .map(|s| parse_ts(&s)),
    })
}

const SAMPLE_COLUMNS: &str = "s.id, s.gesture_definition_id, s.landmark_data, s.source, s.sync_status,
     s.created_at, s.predicted_gesture_id, s.confidence";

fn sample_from_row(row: &Row<'_>) -> rusqlite::Result<TrainingSample> {
    let raw: String = row.get(2)?;
    let landmark_data: LandmarkVector =
        serde_json::from_str(&raw).map_err(|e| conversion_error(2, e))?;
    Ok(TrainingSample {
        id: row.get(0)?,
        gesture_definition_id: row.get(1)?,
        landmark_data,
        source: SampleSource::from_str_lossy(&row.get::<_, String>(3)?),
        sync_status: SyncStatus::from_str_lossy(&row.get::<_, String>(4)?),
        created_at: parse_ts(&row.get::<_, String>(5)?),
        predicted_gesture_id: row.get(6)?,
        confidence: row.get(7)?,
    })
}

const INTERACTION_COLUMNS: &str = "id, gesture_definition_id, was_successful, confidence_score,
     timestamp, processed_by, caregiver_override_id";

fn interaction_from_row(row: &Row<'_>) -> rusqlite::Result<InteractionLog> {
    Ok(InteractionLog {
        id: row.get(0)?,
        gesture_definition_id: row.get(1)?,
        was_successful: row.get(2)?,
        confidence_score: row.get(3)?,
        timestamp: parse_ts(&row.get::<_, String>(4)?),
        processed_by: ProcessedBy::from_str_lossy(&row.get::<_, String>(5)?),
        caregiver_override_id: row.get(6)?,
    })
}

/// Drop rows that fail to decode, logging each one.
fn collect_rows<T>(rows: impl Iterator<Item = rusqlite::Result<T>>, what: &str) -> Vec<T> {
    rows.filter_map(|r| match r {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!("Skipping undecodable {what} row: {e}");
            None
        }
    })
    .collect()
}

fn insert_sample(conn: &Connection, sample: &TrainingSample) -> Result<()> {
    let landmarks = serde_json::to_string(&sample.landmark_data)?;
    conn.execute(
        "INSERT INTO training_samples
            (id, gesture_definition_id, landmark_data, source, sync_status,
             created_at, predicted_gesture_id, confidence)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            sample.id,
            sample.gesture_definition_id,
            landmarks,
            sample.source.as_str(),
            sample.sync_status.as_str(),
            ts(&sample.created_at),
            sample.predicted_gesture_id,
            sample.confidence,
        ],
    )?;
    Ok(())
}

/// Insert `log` only if its gesture exists. Returns whether a row was written.
fn insert_interaction(conn: &Connection, log: &InteractionLog) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT INTO interaction_logs
            (id, gesture_definition_id, was_successful, confidence_score,
             timestamp, processed_by, caregiver_override_id)
         SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7
         WHERE EXISTS (SELECT 1 FROM gesture_definitions WHERE id = ?2)",
        params![
            log.id,
            log.gesture_definition_id,
            log.was_successful,
            log.confidence_score,
            ts(&log.timestamp),
            log.processed_by.as_str(),
            log.caregiver_override_id,
        ],
    )?;
    Ok(inserted == 1)
}

// ── SQLite store ────────────────────────────────────────────────

/// Local system of record: gesture definitions, the training log, the
/// interaction log, and analytics snapshots.
///
/// One connection behind a mutex gives a single writer at a time; every
/// append is one statement or one transaction, so concurrent appenders
/// never interleave partial records.
///
/// Confidence thresholds are mirrored in memory so the classify path never
/// waits on the connection lock. Every write that can change a threshold
/// goes through `insert_gesture` or `update_gesture`, which keep the mirror
/// current.
pub struct LearningStore {
    conn: Mutex<Connection>,
    thresholds: RwLock<HashMap<String, f64>>,
}

impl LearningStore {
    /// Open (creating if needed) the database at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data dir: {}", parent.display()))?;
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open learning DB: {}", db_path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous  = NORMAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA temp_store   = MEMORY;",
        )?;

        Self::init_schema(&conn)?;
        let thresholds = Self::load_thresholds(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            thresholds: RwLock::new(thresholds),
        })
    }

    /// A throwaway store for tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        let thresholds = Self::load_thresholds(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            thresholds: RwLock::new(thresholds),
        })
    }

    fn load_thresholds(conn: &Connection) -> Result<HashMap<String, f64>> {
        let mut stmt = conn.prepare("SELECT id, min_confidence_threshold FROM gesture_definitions")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)))?;
        Ok(collect_rows(rows, "threshold").into_iter().collect())
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS gesture_definitions (
                id                          TEXT PRIMARY KEY,
                label                       TEXT NOT NULL,
                status                      TEXT NOT NULL DEFAULT 'training',
                health_score                INTEGER NOT NULL,
                min_confidence_threshold    REAL NOT NULL,
                training_sessions_count     INTEGER NOT NULL DEFAULT 0,
                last_successful_recognition TEXT
            );
            CREATE TABLE IF NOT EXISTS training_samples (
                seq                   INTEGER PRIMARY KEY AUTOINCREMENT,
                id                    TEXT NOT NULL UNIQUE,
                gesture_definition_id TEXT NOT NULL,
                landmark_data         TEXT NOT NULL,
                source                TEXT NOT NULL,
                sync_status           TEXT NOT NULL DEFAULT 'pending',
                created_at            TEXT NOT NULL,
                predicted_gesture_id  TEXT,
                confidence            REAL
            );
            CREATE INDEX IF NOT EXISTS idx_samples_gesture ON training_samples(gesture_definition_id);
            CREATE INDEX IF NOT EXISTS idx_samples_sync ON training_samples(sync_status);
            CREATE TABLE IF NOT EXISTS interaction_logs (
                seq                   INTEGER PRIMARY KEY AUTOINCREMENT,
                id                    TEXT NOT NULL UNIQUE,
                gesture_definition_id TEXT NOT NULL,
                was_successful        INTEGER NOT NULL,
                confidence_score      REAL NOT NULL,
                timestamp             TEXT NOT NULL,
                processed_by          TEXT NOT NULL,
                caregiver_override_id TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_interactions_gesture ON interaction_logs(gesture_definition_id);
            CREATE INDEX IF NOT EXISTS idx_interactions_timestamp ON interaction_logs(timestamp);
            CREATE TABLE IF NOT EXISTS analytics_snapshots (
                id                TEXT PRIMARY KEY,
                success_rate_7d   REAL NOT NULL,
                improvement_trend REAL NOT NULL,
                last_calculated   TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS meta (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    // ── Gesture definitions ─────────────────────────────────────

    /// Create a definition with default health and threshold.
    ///
    /// Returns the stored definition; an existing one is left untouched.
    pub fn define_gesture(&self, id: &str, label: &str) -> Result<GestureDefinition> {
        self.insert_gesture(&GestureDefinition::new(id, label))?;
        self.gesture(id)?
            .with_context(|| format!("Gesture '{id}' vanished after insert"))
    }

    /// Insert a complete definition (import/admin path). Returns `false`
    /// if a definition with that id already exists.
    pub fn insert_gesture(&self, def: &GestureDefinition) -> Result<bool> {
        let conn = self.conn.lock();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO gesture_definitions
                (id, label, status, health_score, min_confidence_threshold,
                 training_sessions_count, last_successful_recognition)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                def.id,
                def.label,
                def.status.as_str(),
                def.health_score,
                def.min_confidence_threshold,
                def.training_sessions_count,
                def.last_successful_recognition.as_ref().map(ts),
            ],
        )?;
        if inserted == 1 {
            self.thresholds
                .write()
                .insert(def.id.clone(), def.min_confidence_threshold);
            tracing::info!(gesture = %def.id, label = %def.label, "Gesture defined");
        }
        Ok(inserted == 1)
    }

    pub fn gesture(&self, id: &str) -> Result<Option<GestureDefinition>> {
        let conn = self.conn.lock();
        let def = conn
            .query_row(
                &format!("SELECT {GESTURE_COLUMNS} FROM gesture_definitions WHERE id = ?1"),
                params![id],
                gesture_from_row,
            )
            .optional()?;
        Ok(def)
    }

    pub fn gestures(&self) -> Result<Vec<GestureDefinition>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare(&format!("SELECT {GESTURE_COLUMNS} FROM gesture_definitions ORDER BY id"))?;
        let rows = stmt.query_map([], gesture_from_row)?;
        Ok(collect_rows(rows, "gesture"))
    }

    /// Admin/retraining status change. Returns `false` for unknown ids.
    pub fn set_gesture_status(&self, id: &str, status: GestureStatus) -> Result<bool> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE gesture_definitions SET status = ?2 WHERE id = ?1",
            params![id, status.as_str()],
        )?;
        if updated == 1 {
            tracing::info!(gesture = %id, status = status.as_str(), "Gesture status changed");
        }
        Ok(updated == 1)
    }

    /// Read-modify-write one definition inside a transaction.
    ///
    /// Updates to the same gesture are serialized by the connection lock, so
    /// each step of the health rule sees the previous step's result. Returns
    /// `None` (and runs nothing) if the gesture does not exist.
    pub fn update_gesture<R>(
        &self,
        id: &str,
        update: impl FnOnce(&mut GestureDefinition) -> R,
    ) -> Result<Option<R>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let current = tx
            .query_row(
                &format!("SELECT {GESTURE_COLUMNS} FROM gesture_definitions WHERE id = ?1"),
                params![id],
                gesture_from_row,
            )
            .optional()?;
        let Some(mut def) = current else {
            return Ok(None);
        };

        let out = update(&mut def);

        tx.execute(
            "UPDATE gesture_definitions
             SET label = ?2, status = ?3, health_score = ?4, min_confidence_threshold = ?5,
                 training_sessions_count = ?6, last_successful_recognition = ?7
             WHERE id = ?1",
            params![
                def.id,
                def.label,
                def.status.as_str(),
                def.health_score,
                def.min_confidence_threshold,
                def.training_sessions_count,
                def.last_successful_recognition.as_ref().map(ts),
            ],
        )?;
        tx.commit()?;
        self.thresholds
            .write()
            .insert(def.id, def.min_confidence_threshold);
        Ok(Some(out))
    }

    // ── Training log ────────────────────────────────────────────

    /// Append one sample. Live captures also bump the gesture's session count.
    pub fn append_sample(&self, sample: &TrainingSample) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        insert_sample(&tx, sample)?;
        if sample.source == SampleSource::LiveCapture {
            tx.execute(
                "UPDATE gesture_definitions
                 SET training_sessions_count = training_sessions_count + 1
                 WHERE id = ?1",
                params![sample.gesture_definition_id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Append a correction sample and the matching failed interaction in
    /// one transaction. Returns whether the interaction was written (it is
    /// skipped when its gesture is unknown).
    pub fn append_correction(&self, sample: &TrainingSample, log: &InteractionLog) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        insert_sample(&tx, sample)?;
        let logged = insert_interaction(&tx, log)?;
        tx.commit()?;
        Ok(logged)
    }

    /// Up to `limit` pending samples whose gesture is defined, oldest first.
    ///
    /// Samples for undefined gestures stay queued until a definition appears.
    pub fn pending_samples(&self, limit: usize) -> Result<Vec<TrainingSample>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SAMPLE_COLUMNS} FROM training_samples s
             JOIN gesture_definitions g ON g.id = s.gesture_definition_id
             WHERE s.sync_status = 'pending'
             ORDER BY s.seq ASC LIMIT ?1"
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![limit], sample_from_row)?;
        Ok(collect_rows(rows, "training sample"))
    }

    /// Flip acknowledged samples from pending to synced. Never reverses.
    pub fn mark_synced(&self, ids: &[String]) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut flipped = 0;
        {
            let mut stmt = tx.prepare(
                "UPDATE training_samples SET sync_status = 'synced'
                 WHERE id = ?1 AND sync_status = 'pending'",
            )?;
            for id in ids {
                flipped += stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(flipped)
    }

    /// Consistent copy of every sample eligible for training.
    ///
    /// Samples of `disabled` gestures stay in the log (and still sync) but
    /// get no centroid, so a disabled gesture is never predicted offline.
    pub fn training_snapshot(&self) -> Result<Vec<TrainingSample>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SAMPLE_COLUMNS} FROM training_samples s
             JOIN gesture_definitions g
               ON g.id = s.gesture_definition_id AND g.status != 'disabled'
             ORDER BY s.seq ASC"
        ))?;
        let rows = stmt.query_map([], sample_from_row)?;
        Ok(collect_rows(rows, "training sample"))
    }

    /// Samples held back because their gesture is not defined yet.
    pub fn queued_sample_count(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM training_samples
             WHERE gesture_definition_id NOT IN (SELECT id FROM gesture_definitions)",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn sample_count(&self, status: SyncStatus) -> Result<i64> {
        let conn = self.conn.lock();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM training_samples WHERE sync_status = ?1",
            params![status.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ── Interaction log ─────────────────────────────────────────

    /// Append an interaction. Unknown gestures are a silent no-op (`false`).
    pub fn append_interaction(&self, log: &InteractionLog) -> Result<bool> {
        let conn = self.conn.lock();
        let logged = insert_interaction(&conn, log)?;
        if !logged {
            tracing::debug!(
                gesture = %log.gesture_definition_id,
                "Dropping interaction for unknown gesture"
            );
        }
        Ok(logged)
    }

    /// Interactions at or after `since`, oldest first.
    pub fn interactions_since(&self, since: DateTime<Utc>) -> Result<Vec<InteractionLog>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {INTERACTION_COLUMNS} FROM interaction_logs
             WHERE timestamp >= ?1 ORDER BY seq ASC"
        ))?;
        let rows = stmt.query_map(params![ts(&since)], interaction_from_row)?;
        Ok(collect_rows(rows, "interaction"))
    }

    pub fn interactions(&self) -> Result<Vec<InteractionLog>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {INTERACTION_COLUMNS} FROM interaction_logs ORDER BY seq ASC"
        ))?;
        let rows = stmt.query_map([], interaction_from_row)?;
        Ok(collect_rows(rows, "interaction"))
    }

    // ── Analytics snapshots ─────────────────────────────────────

    /// Insert or replace the single snapshot row for `snapshot.id`.
    pub fn upsert_snapshot(&self, snapshot: &LearningAnalyticsSnapshot) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO analytics_snapshots (id, success_rate_7d, improvement_trend, last_calculated)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                success_rate_7d   = excluded.success_rate_7d,
                improvement_trend = excluded.improvement_trend,
                last_calculated   = excluded.last_calculated",
            params![
                snapshot.id,
                snapshot.success_rate_7d,
                snapshot.improvement_trend,
                ts(&snapshot.last_calculated),
            ],
        )?;
        Ok(())
    }

    pub fn snapshot(&self, id: &str) -> Result<Option<LearningAnalyticsSnapshot>> {
        let conn = self.conn.lock();
        let snap = conn
            .query_row(
                "SELECT id, success_rate_7d, improvement_trend, last_calculated
                 FROM analytics_snapshots WHERE id = ?1",
                params![id],
                |row| {
                    Ok(LearningAnalyticsSnapshot {
                        id: row.get(0)?,
                        success_rate_7d: row.get(1)?,
                        improvement_trend: row.get(2)?,
                        last_calculated: parse_ts(&row.get::<_, String>(3)?),
                    })
                },
            )
            .optional()?;
        Ok(snap)
    }

    pub fn snapshots(&self) -> Result<Vec<LearningAnalyticsSnapshot>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, success_rate_7d, improvement_trend, last_calculated
             FROM analytics_snapshots ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(LearningAnalyticsSnapshot {
                id: row.get(0)?,
                success_rate_7d: row.get(1)?,
                improvement_trend: row.get(2)?,
                last_calculated: parse_ts(&row.get::<_, String>(3)?),
            })
        })?;
        Ok(collect_rows(rows, "analytics snapshot"))
    }

    // ── Meta ────────────────────────────────────────────────────

    pub fn meta(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let value = conn
            .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

impl ThresholdLookup for LearningStore {
    fn threshold_for(&self, gesture_id: &str) -> Option<f64> {
        self.thresholds.read().get(gesture_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn vector(coords: &[f64]) -> LandmarkVector {
        LandmarkVector::new(coords.to_vec()).unwrap()
    }

    fn store() -> LearningStore {
        LearningStore::open_in_memory().unwrap()
    }

    #[test]
    fn define_gesture_is_idempotent() {
        let store = store();
        let first = store.define_gesture("g1", "milk").unwrap();
        store
            .update_gesture("g1", |d| d.health_score = 50)
            .unwrap();
        let second = store.define_gesture("g1", "other label").unwrap();
        assert_eq!(first.label, "milk");
        assert_eq!(second.label, "milk");
        assert_eq!(second.health_score, 50);
    }

    #[test]
    fn update_unknown_gesture_runs_nothing() {
        let store = store();
        let mut ran = false;
        let out = store.update_gesture("ghost", |_| ran = true).unwrap();
        assert!(out.is_none());
        assert!(!ran);
    }

    #[test]
    fn live_capture_bumps_session_count() {
        let store = store();
        store.define_gesture("g1", "milk").unwrap();
        store
            .append_sample(&TrainingSample::new("g1", vector(&[0.0]), SampleSource::LiveCapture))
            .unwrap();
        store
            .append_sample(&TrainingSample::new("g1", vector(&[1.0]), SampleSource::Correction))
            .unwrap();
        assert_eq!(store.gesture("g1").unwrap().unwrap().training_sessions_count, 1);
    }

    #[test]
    fn samples_for_unknown_gesture_are_queued_until_defined() {
        let store = store();
        store
            .append_sample(&TrainingSample::new("later", vector(&[0.0]), SampleSource::LiveCapture))
            .unwrap();
        assert!(store.pending_samples(10).unwrap().is_empty());
        assert!(store.training_snapshot().unwrap().is_empty());
        assert_eq!(store.queued_sample_count().unwrap(), 1);

        store.define_gesture("later", "later").unwrap();
        assert_eq!(store.pending_samples(10).unwrap().len(), 1);
        assert_eq!(store.training_snapshot().unwrap().len(), 1);
        assert_eq!(store.queued_sample_count().unwrap(), 0);
    }

    #[test]
    fn mark_synced_is_one_way_and_counts_flips() {
        let store = store();
        store.define_gesture("g1", "milk").unwrap();
        let sample = TrainingSample::new("g1", vector(&[0.0]), SampleSource::LiveCapture);
        store.append_sample(&sample).unwrap();

        assert_eq!(store.mark_synced(&[sample.id.clone()]).unwrap(), 1);
        assert_eq!(store.mark_synced(&[sample.id.clone()]).unwrap(), 0);
        assert!(store.pending_samples(10).unwrap().is_empty());
        assert_eq!(store.sample_count(SyncStatus::Synced).unwrap(), 1);
    }

    #[test]
    fn pending_samples_respects_limit_and_order() {
        let store = store();
        store.define_gesture("g1", "milk").unwrap();
        let ids: Vec<String> = (0..5)
            .map(|i| {
                let s = TrainingSample::new("g1", vector(&[f64::from(i)]), SampleSource::LiveCapture);
                store.append_sample(&s).unwrap();
                s.id
            })
            .collect();
        let batch = store.pending_samples(3).unwrap();
        let got: Vec<&str> = batch.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(got, ids[..3].iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn interaction_for_unknown_gesture_is_dropped() {
        let store = store();
        let logged = store
            .append_interaction(&InteractionLog::new("ghost", true, 0.9, ProcessedBy::Local))
            .unwrap();
        assert!(!logged);
        assert!(store.interactions().unwrap().is_empty());
    }

    #[test]
    fn correction_dual_write_is_atomic_pair() {
        let store = store();
        store.define_gesture("eat", "eat").unwrap();
        store.define_gesture("drink", "drink").unwrap();

        let mut sample = TrainingSample::new("drink", vector(&[1.0, 2.0]), SampleSource::Correction);
        sample.predicted_gesture_id = Some("eat".into());
        let mut log = InteractionLog::new("eat", false, 0.61, ProcessedBy::Cloud);
        log.caregiver_override_id = Some("drink".into());

        assert!(store.append_correction(&sample, &log).unwrap());
        let logs = store.interactions().unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].caregiver_override_id.as_deref(), Some("drink"));
        assert!(!logs[0].was_successful);
        let samples = store.training_snapshot().unwrap();
        assert_eq!(samples[0].predicted_gesture_id.as_deref(), Some("eat"));
        assert_eq!(samples[0].source, SampleSource::Correction);
    }

    #[test]
    fn interactions_since_filters_by_time() {
        let store = store();
        store.define_gesture("g1", "milk").unwrap();
        let now = Utc::now();
        let old = InteractionLog::new("g1", true, 0.9, ProcessedBy::Local)
            .at(now - chrono::Duration::days(10));
        let recent = InteractionLog::new("g1", false, 0.2, ProcessedBy::Cloud)
            .at(now - chrono::Duration::days(1));
        store.append_interaction(&old).unwrap();
        store.append_interaction(&recent).unwrap();

        let since = store.interactions_since(now - chrono::Duration::days(7)).unwrap();
        assert_eq!(since.len(), 1);
        assert_eq!(since[0].id, recent.id);
        assert_eq!(since[0].processed_by, ProcessedBy::Cloud);
    }

    #[test]
    fn snapshot_upsert_keeps_one_row() {
        let store = store();
        let mut snap = LearningAnalyticsSnapshot {
            id: "global".into(),
            success_rate_7d: 0.5,
            improvement_trend: 0.1,
            last_calculated: Utc::now(),
        };
        store.upsert_snapshot(&snap).unwrap();
        snap.success_rate_7d = 0.75;
        store.upsert_snapshot(&snap).unwrap();

        let all = store.snapshots().unwrap();
        assert_eq!(all.len(), 1);
        assert!((all[0].success_rate_7d - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn threshold_lookup_reads_definition() {
        let store = store();
        store.define_gesture("g1", "milk").unwrap();
        assert_eq!(store.threshold_for("g1"), Some(0.7));
        assert_eq!(store.threshold_for("ghost"), None);
    }

    #[test]
    fn threshold_lookup_follows_updates_and_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("learning.db");
        {
            let store = LearningStore::open(&path).unwrap();
            store.define_gesture("g1", "milk").unwrap();
            store
                .update_gesture("g1", |def| def.min_confidence_threshold = 0.76)
                .unwrap();
            assert_eq!(store.threshold_for("g1"), Some(0.76));

            // Redefining leaves the stored threshold alone.
            store.define_gesture("g1", "milk").unwrap();
            assert_eq!(store.threshold_for("g1"), Some(0.76));
        }
        let reopened = LearningStore::open(&path).unwrap();
        assert_eq!(reopened.threshold_for("g1"), Some(0.76));
    }

    #[test]
    fn threshold_lookup_does_not_wait_on_connection() {
        let store = store();
        store.define_gesture("g1", "milk").unwrap();
        let _held = store.conn.lock();
        assert_eq!(store.threshold_for("g1"), Some(0.7));
    }

    #[test]
    fn disabled_gesture_samples_are_kept_but_not_trained() {
        let store = store();
        store.define_gesture("eat", "eat").unwrap();
        store.define_gesture("wave", "wave").unwrap();
        store
            .append_sample(&TrainingSample::new("eat", vector(&[0.0]), SampleSource::LiveCapture))
            .unwrap();
        store
            .append_sample(&TrainingSample::new("wave", vector(&[1.0]), SampleSource::LiveCapture))
            .unwrap();
        store.set_gesture_status("wave", GestureStatus::Disabled).unwrap();

        let trained: Vec<_> = store
            .training_snapshot()
            .unwrap()
            .into_iter()
            .map(|s| s.gesture_definition_id)
            .collect();
        assert_eq!(trained, vec!["eat".to_string()]);
        assert_eq!(store.pending_samples(10).unwrap().len(), 2);

        store.set_gesture_status("wave", GestureStatus::Ready).unwrap();
        assert_eq!(store.training_snapshot().unwrap().len(), 2);
    }

    #[test]
    fn concurrent_appenders_do_not_lose_records() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LearningStore::open(&tmp.path().join("learning.db")).unwrap());
        store.define_gesture("g1", "milk").unwrap();

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        let v = vector(&[f64::from(t), f64::from(i)]);
                        store
                            .append_sample(&TrainingSample::new("g1", v, SampleSource::LiveCapture))
                            .unwrap();
                        store
                            .append_interaction(&InteractionLog::new("g1", i % 2 == 0, 0.8, ProcessedBy::Local))
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.training_snapshot().unwrap().len(), 100);
        assert_eq!(store.interactions().unwrap().len(), 100);
        assert_eq!(store.gesture("g1").unwrap().unwrap().training_sessions_count, 100);
    }

    #[test]
    fn meta_roundtrip() {
        let store = store();
        assert!(store.meta("sync.last_push_at").unwrap().is_none());
        store.set_meta("sync.last_push_at", "x").unwrap();
        store.set_meta("sync.last_push_at", "y").unwrap();
        assert_eq!(store.meta("sync.last_push_at").unwrap().as_deref(), Some("y"));
    }
}
