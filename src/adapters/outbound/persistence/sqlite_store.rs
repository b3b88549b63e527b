use super::schema::SCHEMA;
use crate::ports::outbound::{CveBatchOutcome, SuggestionComputer, TrackerStore};
use crate::shared::error::TrackerError;
use crate::shared::Result;
use crate::tracking::domain::{
    AffectedProduct, ChangeEvent, Channel, ChannelName, ChannelObservation, ChannelSnapshot,
    ChannelStatus, ChannelUpdate, CveId, CveRecord, CvssScore, Evaluation, EvaluationId,
    EvaluationOutcome, EvaluationState, MatchBasis, PackageSnapshot, PendingChange,
    RebuildSummary, RecomputeKey, Revision, Severity, StoredSuggestion, Suggestion,
    SuggestionPayload, VersionStatus,
};
use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

const EVALUATION_COLUMNS: &str =
    "id, channel, revision, state, created_at, started_at, completed_at, error";

const CVE_COLUMNS: &str =
    "cve_id, published, last_modified, title, description, severity, score, affected";

const SUGGESTION_COLUMNS: &str =
    "cve_id, channel, package, match_basis, status, payload, computed_at";

/// SQLite-backed TrackerStore
///
/// A single connection guarded by a mutex serializes all writers; each
/// trait method holds the lock for one transaction at a time and never
/// across caller-supplied computation.
#[derive(Clone)]
pub struct SqliteTrackerStore {
    conn: Arc<Mutex<Connection>>,
    committed: Arc<Notify>,
    /// Parsed snapshots of COMPLETED evaluations, which never change
    snapshots: Arc<Mutex<HashMap<i64, Arc<ChannelSnapshot>>>>,
}

impl SqliteTrackerStore {
    /// Opens (or creates) the database file at `path` and applies the schema
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        conn.busy_timeout(std::time::Duration::from_secs(30))?;
        Self::from_connection(conn)
    }

    /// Creates an in-memory store (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)
            .context("Failed to initialize database schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            committed: Arc::new(Notify::new()),
            snapshots: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Tracker store connection mutex is poisoned"))
    }

    fn signal_commit(&self) {
        self.committed.notify_one();
    }

    fn snapshot_cache(&self) -> Result<MutexGuard<'_, HashMap<i64, Arc<ChannelSnapshot>>>> {
        self.snapshots
            .lock()
            .map_err(|_| anyhow::anyhow!("Snapshot cache mutex is poisoned"))
    }

    fn load_snapshot(&self, conn: &Connection, head: SnapshotHead) -> Result<Arc<ChannelSnapshot>> {
        let (id, channel, revision) = head;
        if let Some(hit) = self.snapshot_cache()?.get(&id) {
            return Ok(Arc::clone(hit));
        }

        let result: String = conn.query_row(
            "SELECT result FROM evaluations WHERE id = ?1 AND state = 'COMPLETED'",
            params![id],
            |row| row.get(0),
        )?;
        let snapshot: PackageSnapshot = serde_json::from_str(&result)
            .with_context(|| format!("Corrupt package snapshot of evaluation {}", id))?;
        let snapshot = Arc::new(ChannelSnapshot {
            channel: ChannelName::new(channel)?,
            evaluation_id: EvaluationId(id),
            revision: Revision::new(revision)?,
            snapshot,
        });

        self.snapshot_cache()?.insert(id, Arc::clone(&snapshot));
        Ok(snapshot)
    }

    fn load_latest_snapshot(
        &self,
        conn: &Connection,
        channel: &ChannelName,
    ) -> Result<Option<Arc<ChannelSnapshot>>> {
        let head = conn
            .query_row(
                "SELECT id, channel, revision FROM evaluations
                 WHERE channel = ?1 AND state = 'COMPLETED'
                 ORDER BY id DESC LIMIT 1",
                params![channel.as_str()],
                read_snapshot_head,
            )
            .optional()?;
        head.map(|head| self.load_snapshot(conn, head)).transpose()
    }

    /// Latest COMPLETED snapshot of every channel, ordered by channel name
    fn load_all_latest_snapshots(&self, conn: &Connection) -> Result<Vec<Arc<ChannelSnapshot>>> {
        let mut stmt = conn.prepare(
            "SELECT e.id, e.channel, e.revision FROM evaluations e
             WHERE e.state = 'COMPLETED'
               AND e.id = (SELECT MAX(id) FROM evaluations
                           WHERE channel = e.channel AND state = 'COMPLETED')
             ORDER BY e.channel",
        )?;
        let heads = stmt
            .query_map([], read_snapshot_head)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let latest: HashSet<i64> = heads.iter().map(|(id, _, _)| *id).collect();
        self.snapshot_cache()?.retain(|id, _| latest.contains(id));

        heads
            .into_iter()
            .map(|head| self.load_snapshot(conn, head))
            .collect()
    }
}

type SnapshotHead = (i64, String, String);

fn read_snapshot_head(row: &rusqlite::Row<'_>) -> rusqlite::Result<SnapshotHead> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

/// Constraint failures are integrity violations; everything else is plain I/O.
fn classify(error: rusqlite::Error) -> anyhow::Error {
    if error.sqlite_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation) {
        TrackerError::IntegrityViolation {
            details: error.to_string(),
        }
        .into()
    } else {
        error.into()
    }
}

fn insert_event(tx: &Transaction<'_>, event: &ChangeEvent) -> Result<()> {
    let payload = serde_json::to_string(event)?;
    tx.execute(
        "INSERT INTO change_events (payload, created_at) VALUES (?1, ?2)",
        params![payload, Utc::now()],
    )
    .map_err(classify)?;
    Ok(())
}

type EvaluationRow = (
    i64,
    String,
    String,
    String,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
    Option<String>,
);

fn read_evaluation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EvaluationRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn evaluation_from_row(row: EvaluationRow) -> Result<Evaluation> {
    let (id, channel, revision, state, created_at, started_at, completed_at, error) = row;
    Ok(Evaluation {
        id: EvaluationId(id),
        channel: ChannelName::new(channel)?,
        revision: Revision::new(revision)?,
        state: state.parse()?,
        created_at,
        started_at,
        completed_at,
        error,
    })
}

type CveRow = (
    String,
    Option<DateTime<Utc>>,
    DateTime<Utc>,
    Option<String>,
    String,
    String,
    Option<f64>,
    String,
);

fn read_cve_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CveRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn cve_from_row(row: CveRow) -> Result<CveRecord> {
    let (id, published, last_modified, title, description, severity, score, affected) = row;
    let affected: Vec<AffectedProduct> = serde_json::from_str(&affected)
        .with_context(|| format!("Corrupt affected products of {}", id))?;
    Ok(CveRecord {
        id: CveId::new(id)?,
        published,
        last_modified,
        title,
        description,
        severity: Severity::parse_lenient(&severity),
        score: score.map(|s| CvssScore::new(s as f32)).transpose()?,
        affected,
    })
}

fn load_cve(conn: &Connection, id: &CveId) -> Result<Option<CveRecord>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM cve_records WHERE cve_id = ?1", CVE_COLUMNS),
            params![id.as_str()],
            read_cve_row,
        )
        .optional()?;
    row.map(cve_from_row).transpose()
}

fn load_all_cves(conn: &Connection) -> Result<Vec<CveRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM cve_records ORDER BY cve_id",
        CVE_COLUMNS
    ))?;
    let rows = stmt
        .query_map([], read_cve_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(cve_from_row).collect()
}

impl TrackerStore for SqliteTrackerStore {
    fn record_channel_observation(
        &self,
        observation: &ChannelObservation,
    ) -> Result<ChannelUpdate> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let stored: Option<(String, String)> = tx
            .query_row(
                "SELECT revision, status FROM channels WHERE name = ?1",
                params![observation.name.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let created = stored.is_none();
        let revision_changed = stored
            .as_ref()
            .map_or(true, |(revision, _)| revision != observation.revision.as_str());
        // A channel brought back into evaluation at the same revision is
        // scheduled unless that revision was already evaluated.
        let reactivated = match &stored {
            Some((_, status)) if !revision_changed && observation.status.is_evaluated() => {
                !status.parse::<ChannelStatus>()?.is_evaluated()
                    && tx
                        .query_row(
                            "SELECT 1 FROM evaluations WHERE channel = ?1 AND revision = ?2",
                            params![observation.name.as_str(), observation.revision.as_str()],
                            |_| Ok(()),
                        )
                        .optional()?
                        .is_none()
            }
            _ => false,
        };
        let scheduled = (revision_changed || reactivated) && observation.status.is_evaluated();

        tx.execute(
            "INSERT INTO channels (name, status, variant, revision, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(name) DO UPDATE SET
                status = excluded.status,
                variant = excluded.variant,
                revision = excluded.revision,
                updated_at = CASE WHEN channels.revision = excluded.revision
                                  THEN channels.updated_at
                                  ELSE excluded.updated_at END",
            params![
                observation.name.as_str(),
                observation.status.as_str(),
                observation.variant,
                observation.revision.as_str(),
                Utc::now()
            ],
        )
        .map_err(classify)?;

        if scheduled {
            insert_event(
                &tx,
                &ChangeEvent::NewRevision {
                    channel: observation.name.clone(),
                    revision: observation.revision.clone(),
                },
            )?;
        }

        tx.commit()?;
        if scheduled {
            self.signal_commit();
        }

        Ok(ChannelUpdate {
            created,
            revision_changed,
            scheduled,
        })
    }

    fn channels(&self) -> Result<Vec<Channel>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT name, status, variant, revision, updated_at FROM channels ORDER BY name",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, DateTime<Utc>>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(name, status, variant, revision, updated_at)| {
                Ok(Channel {
                    name: ChannelName::new(name)?,
                    status: status.parse::<ChannelStatus>()?,
                    variant,
                    revision: Revision::new(revision)?,
                    updated_at,
                })
            })
            .collect()
    }

    fn create_pending_evaluation(
        &self,
        channel: &ChannelName,
        revision: &Revision,
    ) -> Result<Option<EvaluationId>> {
        let conn = self.lock()?;
        let inserted = conn
            .execute(
                "INSERT INTO evaluations (channel, revision, state, created_at)
                 VALUES (?1, ?2, 'PENDING', ?3)
                 ON CONFLICT(channel, revision) DO NOTHING",
                params![channel.as_str(), revision.as_str(), Utc::now()],
            )
            .map_err(classify)?;
        if inserted == 0 {
            return Ok(None);
        }
        Ok(Some(EvaluationId(conn.last_insert_rowid())))
    }

    fn next_pending_evaluations(&self, limit: usize) -> Result<Vec<Evaluation>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM evaluations WHERE state = 'PENDING' ORDER BY id LIMIT ?1",
            EVALUATION_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![limit as i64], read_evaluation_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(evaluation_from_row).collect()
    }

    fn claim_evaluation(&self, id: EvaluationId) -> Result<bool> {
        let conn = self.lock()?;
        let claimed = conn
            .execute(
                "UPDATE evaluations SET state = 'RUNNING', started_at = ?2
                 WHERE id = ?1 AND state = 'PENDING'",
                params![id.0, Utc::now()],
            )
            .map_err(classify)?;
        Ok(claimed == 1)
    }

    fn finish_evaluation(&self, id: EvaluationId, outcome: &EvaluationOutcome) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let current: Option<(String, String)> = tx
            .query_row(
                "SELECT state, channel FROM evaluations WHERE id = ?1",
                params![id.0],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((state, channel)) = current else {
            return Err(TrackerError::IntegrityViolation {
                details: format!("evaluation {} does not exist", id),
            }
            .into());
        };
        let state: EvaluationState = state.parse()?;
        state.ensure_transition(id, outcome.state())?;

        let now = Utc::now();
        match outcome {
            EvaluationOutcome::Completed(snapshot) => {
                let result = serde_json::to_string(snapshot)?;
                tx.execute(
                    "UPDATE evaluations SET state = 'COMPLETED', completed_at = ?2, result = ?3
                     WHERE id = ?1",
                    params![id.0, now, result],
                )
                .map_err(classify)?;
                insert_event(
                    &tx,
                    &ChangeEvent::EvaluationCompleted {
                        evaluation_id: id,
                        channel: ChannelName::new(channel)?,
                    },
                )?;
            }
            EvaluationOutcome::Failed(error) => {
                tx.execute(
                    "UPDATE evaluations SET state = 'FAILED', completed_at = ?2, error = ?3
                     WHERE id = ?1",
                    params![id.0, now, error],
                )
                .map_err(classify)?;
            }
        }

        tx.commit()?;
        if matches!(outcome, EvaluationOutcome::Completed(_)) {
            self.signal_commit();
        }
        Ok(())
    }

    fn recover_interrupted_evaluations(&self, reason: &str) -> Result<Vec<EvaluationId>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let ids = {
            let mut stmt =
                tx.prepare("SELECT id FROM evaluations WHERE state = 'RUNNING' ORDER BY id")?;
            let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        tx.execute(
            "UPDATE evaluations SET state = 'FAILED', completed_at = ?1, error = ?2
             WHERE state = 'RUNNING'",
            params![Utc::now(), reason],
        )
        .map_err(classify)?;
        tx.commit()?;

        Ok(ids.into_iter().map(EvaluationId).collect())
    }

    fn evaluation(&self, id: EvaluationId) -> Result<Option<Evaluation>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM evaluations WHERE id = ?1", EVALUATION_COLUMNS),
                params![id.0],
                read_evaluation_row,
            )
            .optional()?;
        row.map(evaluation_from_row).transpose()
    }

    fn evaluations(&self) -> Result<Vec<Evaluation>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM evaluations ORDER BY id",
            EVALUATION_COLUMNS
        ))?;
        let rows = stmt
            .query_map([], read_evaluation_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(evaluation_from_row).collect()
    }

    fn channels_with_completed_evaluations(&self) -> Result<Vec<ChannelName>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT channel FROM evaluations WHERE state = 'COMPLETED' ORDER BY channel",
        )?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(ChannelName::new).collect()
    }

    fn latest_channel_snapshot(&self, channel: &ChannelName) -> Result<Option<ChannelSnapshot>> {
        let conn = self.lock()?;
        Ok(self
            .load_latest_snapshot(&conn, channel)?
            .map(|snapshot| (*snapshot).clone()))
    }

    fn upsert_cve_batch(
        &self,
        records: &[CveRecord],
        checkpoint: Option<(&str, DateTime<Utc>)>,
    ) -> Result<CveBatchOutcome> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut outcome = CveBatchOutcome::default();

        for record in records {
            let stored: Option<DateTime<Utc>> = tx
                .query_row(
                    "SELECT last_modified FROM cve_records WHERE cve_id = ?1",
                    params![record.id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;

            if !record.supersedes(stored) {
                tracing::debug!(cve = %record.id, "record not newer than stored version, skipping");
                outcome.skipped += 1;
                continue;
            }

            let affected = serde_json::to_string(&record.affected)?;
            tx.execute(
                "INSERT INTO cve_records
                    (cve_id, published, last_modified, title, description, severity, score, affected)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(cve_id) DO UPDATE SET
                    published = excluded.published,
                    last_modified = excluded.last_modified,
                    title = excluded.title,
                    description = excluded.description,
                    severity = excluded.severity,
                    score = excluded.score,
                    affected = excluded.affected",
                params![
                    record.id.as_str(),
                    record.published,
                    record.last_modified,
                    record.title,
                    record.description,
                    record.severity.as_str(),
                    record.score.map(|s| f64::from(s.value())),
                    affected
                ],
            )
            .map_err(classify)?;

            insert_event(
                &tx,
                &ChangeEvent::CveChanged {
                    cve_id: record.id.clone(),
                },
            )?;

            if stored.is_some() {
                outcome.updated += 1;
            } else {
                outcome.inserted += 1;
            }
            outcome.changed.push(record.id.clone());
        }

        if let Some((name, value)) = checkpoint {
            let current: Option<DateTime<Utc>> = tx
                .query_row(
                    "SELECT value FROM checkpoints WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()?;
            if current.map_or(true, |current| value > current) {
                tx.execute(
                    "INSERT INTO checkpoints (name, value) VALUES (?1, ?2)
                     ON CONFLICT(name) DO UPDATE SET value = excluded.value",
                    params![name, value],
                )
                .map_err(classify)?;
            }
        }

        tx.commit()?;
        if !outcome.changed.is_empty() {
            self.signal_commit();
        }
        Ok(outcome)
    }

    fn cve_record(&self, id: &CveId) -> Result<Option<CveRecord>> {
        let conn = self.lock()?;
        load_cve(&conn, id)
    }

    fn cve_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM cve_records", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn checkpoint(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                "SELECT value FROM checkpoints WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn rebuild_suggestions(
        &self,
        key: &RecomputeKey,
        compute: &SuggestionComputer<'_>,
    ) -> Result<RebuildSummary> {
        // Inputs are read in one transaction and the lock is released
        // before computing; only the row swap below holds it again.
        let (snapshots, cves) = {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            let inputs = match key {
                RecomputeKey::Cve(id) => match load_cve(&tx, id)? {
                    Some(cve) => (self.load_all_latest_snapshots(&tx)?, vec![cve]),
                    None => (Vec::new(), Vec::new()),
                },
                RecomputeKey::Channel(name) => match self.load_latest_snapshot(&tx, name)? {
                    Some(snapshot) => (vec![snapshot], load_all_cves(&tx)?),
                    None => (Vec::new(), Vec::new()),
                },
            };
            tx.commit()?;
            inputs
        };

        let fresh = snapshots
            .iter()
            .flat_map(|snapshot| compute(snapshot, &cves))
            .map(|suggestion| {
                let payload = serde_json::to_string(&suggestion.payload)?;
                Ok((suggestion, payload))
            })
            .collect::<Result<Vec<(Suggestion, String)>>>()?;
        drop(cves);

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let removed = match key {
            RecomputeKey::Cve(id) => tx.execute(
                "DELETE FROM suggestions WHERE cve_id = ?1",
                params![id.as_str()],
            )?,
            RecomputeKey::Channel(name) => tx.execute(
                "DELETE FROM suggestions WHERE channel = ?1",
                params![name.as_str()],
            )?,
        };

        let computed_at = Utc::now();
        {
            let mut insert = tx.prepare(&format!(
                "INSERT INTO suggestions ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                SUGGESTION_COLUMNS
            ))?;
            for (suggestion, payload) in &fresh {
                insert
                    .execute(params![
                        suggestion.cve_id.as_str(),
                        suggestion.channel.as_str(),
                        suggestion.package,
                        i64::from(suggestion.match_basis.bits()),
                        suggestion.status.as_str(),
                        payload,
                        computed_at
                    ])
                    .map_err(classify)?;
            }
        }

        tx.commit()?;
        Ok(RebuildSummary {
            removed,
            inserted: fresh.len(),
        })
    }

    fn suggestions_for(&self, key: &RecomputeKey) -> Result<Vec<StoredSuggestion>> {
        let conn = self.lock()?;
        let (filter, value) = match key {
            RecomputeKey::Cve(id) => ("cve_id", id.as_str()),
            RecomputeKey::Channel(name) => ("channel", name.as_str()),
        };
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM suggestions WHERE {} = ?1 ORDER BY cve_id, channel, package",
            SUGGESTION_COLUMNS, filter
        ))?;
        let rows = stmt
            .query_map(params![value], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, DateTime<Utc>>(6)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(
                |(cve_id, channel, package, basis, status, payload, computed_at)| {
                    let payload: SuggestionPayload = serde_json::from_str(&payload)
                        .with_context(|| format!("Corrupt suggestion payload for {}", cve_id))?;
                    Ok(StoredSuggestion {
                        suggestion: Suggestion {
                            cve_id: CveId::new(cve_id)?,
                            channel: ChannelName::new(channel)?,
                            package,
                            match_basis: MatchBasis::from_bits(basis as u8),
                            status: VersionStatus::parse_lenient(&status),
                            payload,
                        },
                        computed_at,
                    })
                },
            )
            .collect()
    }

    fn suggestion_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM suggestions", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn pending_changes(&self, limit: usize) -> Result<Vec<PendingChange>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, payload FROM change_events WHERE delivered_at IS NULL ORDER BY id LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(sequence, payload)| {
                let event: ChangeEvent = serde_json::from_str(&payload)
                    .with_context(|| format!("Corrupt change event {}", sequence))?;
                Ok(PendingChange { sequence, event })
            })
            .collect()
    }

    fn ack_changes(&self, sequences: &[i64]) -> Result<()> {
        if sequences.is_empty() {
            return Ok(());
        }
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = Utc::now();
        {
            let mut ack = tx.prepare(
                "UPDATE change_events SET delivered_at = ?2 WHERE id = ?1 AND delivered_at IS NULL",
            )?;
            for sequence in sequences {
                ack.execute(params![sequence, now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn commit_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.committed)
    }
}
