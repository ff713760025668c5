//! SQLite backend for [`GovernanceStore`].
//!
//! Lineage records live in `lineage_records`, keyed by `(dataset_id, seq)`, with
//! a `UNIQUE (dataset_id, parent_hash)` constraint so no two records in a chain
//! can claim the same parent (the root uses an empty parent). Audit events live
//! in `audit_events` with an AUTOINCREMENT sequence and a uniqueness constraint
//! on `(event_type, subject, payload_hash)`. Both tables carry triggers that
//! abort any UPDATE or DELETE.
//!
//! Writes run in `BEGIN IMMEDIATE` transactions: the head read and the insert
//! happen under the database write lock, which is what serializes writers in
//! separate processes sharing the same file.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{
    Connection, ErrorCode, OptionalExtension, Row, Transaction, TransactionBehavior, params,
};
use tracing::{debug, info};

use provgate_types::{
    AuditAppend, AuditEvent, AuditEventType, ContentHash, DatasetId, Deadline, LineageRecord,
    NewAuditEvent, NewLineageRecord, StepMetadata, StepType,
};

use crate::sqlite_security::prepare_db_path;
use crate::{GovernanceStore, StoreError, check_expected_parent, monotonic_now};

/// Current on-disk schema version.
pub const SCHEMA_VERSION: i64 = 2;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

const TABLES: &str = r"
    CREATE TABLE IF NOT EXISTS lineage_records (
        dataset_id TEXT NOT NULL,
        seq INTEGER NOT NULL,
        step_type TEXT NOT NULL,
        data_hash TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        parent_hash TEXT NOT NULL DEFAULT '',
        metadata_json TEXT NOT NULL,
        recorded_at TEXT NOT NULL,
        PRIMARY KEY (dataset_id, seq),
        UNIQUE (dataset_id, parent_hash)
    );

    CREATE TABLE IF NOT EXISTS audit_events (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        event_type TEXT NOT NULL,
        subject TEXT NOT NULL,
        actor TEXT NOT NULL,
        payload_hash TEXT NOT NULL,
        payload_json TEXT NOT NULL,
        recorded_at TEXT NOT NULL,
        UNIQUE (event_type, subject, payload_hash)
    );

    CREATE INDEX IF NOT EXISTS idx_audit_events_subject
    ON audit_events (subject, seq);
";

// Added in schema version 2.
const APPEND_ONLY_TRIGGERS: &str = r"
    CREATE TRIGGER IF NOT EXISTS lineage_records_no_update
    BEFORE UPDATE ON lineage_records
    BEGIN SELECT RAISE(ABORT, 'lineage records are append-only'); END;

    CREATE TRIGGER IF NOT EXISTS lineage_records_no_delete
    BEFORE DELETE ON lineage_records
    BEGIN SELECT RAISE(ABORT, 'lineage records are append-only'); END;

    CREATE TRIGGER IF NOT EXISTS audit_events_no_update
    BEFORE UPDATE ON audit_events
    BEGIN SELECT RAISE(ABORT, 'audit events are append-only'); END;

    CREATE TRIGGER IF NOT EXISTS audit_events_no_delete
    BEFORE DELETE ON audit_events
    BEGIN SELECT RAISE(ABORT, 'audit events are append-only'); END;
";

const RECORD_COLUMNS: &str =
    "dataset_id, seq, step_type, data_hash, content_hash, parent_hash, metadata_json, recorded_at";

const EVENT_COLUMNS: &str =
    "seq, event_type, subject, actor, payload_hash, payload_json, recorded_at";

pub struct SqliteStore {
    connection: Mutex<Connection>,
    busy_timeout: Duration,
}

impl SqliteStore {
    /// Open or create the store at `path`, migrating older schemas.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, StoreError> {
        let path = path.as_ref();
        prepare_db_path(path)?;

        let connection = Connection::open(path).map_err(|e| {
            StoreError::Backend(format!("failed to open {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "Opened governance store");
        Self::initialize(connection, busy_timeout)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let connection = Connection::open_in_memory()?;
        Self::initialize(connection, DEFAULT_BUSY_TIMEOUT)
    }

    fn initialize(mut connection: Connection, busy_timeout: Duration) -> Result<Self, StoreError> {
        connection
            .execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")
            .map_err(|e| StoreError::Backend(format!("failed to set store pragmas: {e}")))?;
        connection.busy_timeout(busy_timeout)?;
        migrate(&mut connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
            busy_timeout,
        })
    }

    /// Lock the connection and bound SQLite's lock wait by the caller's deadline.
    fn lock(&self, deadline: Deadline) -> Result<MutexGuard<'_, Connection>, StoreError> {
        deadline.check()?;
        let connection = self
            .connection
            .lock()
            .map_err(|_| StoreError::Backend("sqlite store mutex poisoned".to_string()))?;
        deadline.check()?;
        let wait = deadline
            .remaining()
            .map_or(self.busy_timeout, |left| left.min(self.busy_timeout));
        connection.busy_timeout(wait)?;
        Ok(connection)
    }
}

fn migrate(connection: &mut Connection) -> Result<(), StoreError> {
    let tx = connection.transaction()?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", [], |row| row.get(0))
        .optional()?;

    match version {
        None => {
            tx.execute(
                "INSERT INTO store_meta (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )?;
            tx.execute_batch(TABLES)?;
            tx.execute_batch(APPEND_ONLY_TRIGGERS)?;
        }
        Some(1) => {
            info!(from = 1, to = SCHEMA_VERSION, "Migrating governance store schema");
            tx.execute_batch(APPEND_ONLY_TRIGGERS)?;
            tx.execute("UPDATE store_meta SET version = ?1", params![SCHEMA_VERSION])?;
        }
        Some(v) if v == SCHEMA_VERSION => {}
        Some(v) => {
            return Err(StoreError::VersionMismatch(format!(
                "unsupported schema version {v} (expected {SCHEMA_VERSION})"
            )));
        }
    }
    tx.commit()?;
    Ok(())
}

// ============================================================================
// Row encoding
// ============================================================================

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {raw:?}: {e}")))
}

fn parse_hash(raw: String) -> Result<ContentHash, StoreError> {
    ContentHash::parse(raw).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn to_sql_seq(seq: u64) -> Result<i64, StoreError> {
    i64::try_from(seq).map_err(|_| StoreError::Invalid(format!("sequence {seq} out of range")))
}

fn from_sql_seq(seq: i64) -> Result<u64, StoreError> {
    u64::try_from(seq).map_err(|_| StoreError::Corrupt(format!("negative sequence {seq}")))
}

struct RecordRow {
    dataset_id: String,
    seq: i64,
    step_type: String,
    data_hash: String,
    content_hash: String,
    parent_hash: String,
    metadata_json: String,
    recorded_at: String,
}

impl RecordRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            dataset_id: row.get(0)?,
            seq: row.get(1)?,
            step_type: row.get(2)?,
            data_hash: row.get(3)?,
            content_hash: row.get(4)?,
            parent_hash: row.get(5)?,
            metadata_json: row.get(6)?,
            recorded_at: row.get(7)?,
        })
    }

    fn decode(self) -> Result<LineageRecord, StoreError> {
        let step_type: StepType = self
            .step_type
            .parse()
            .map_err(|e: provgate_types::UnknownStepType| StoreError::Corrupt(e.to_string()))?;
        let metadata: StepMetadata = serde_json::from_str(&self.metadata_json).map_err(|e| {
            StoreError::Corrupt(format!("metadata of {}#{}: {e}", self.dataset_id, self.seq))
        })?;
        let parent_hash = if self.parent_hash.is_empty() {
            None
        } else {
            Some(parse_hash(self.parent_hash)?)
        };
        Ok(LineageRecord {
            seq: from_sql_seq(self.seq)?,
            dataset_id: DatasetId::new(self.dataset_id)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            step_type,
            data_hash: parse_hash(self.data_hash)?,
            content_hash: parse_hash(self.content_hash)?,
            parent_hash,
            metadata,
            recorded_at: parse_timestamp(&self.recorded_at)?,
        })
    }
}

struct EventRow {
    seq: i64,
    event_type: String,
    subject: String,
    actor: String,
    payload_hash: String,
    payload_json: String,
    recorded_at: String,
}

impl EventRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            seq: row.get(0)?,
            event_type: row.get(1)?,
            subject: row.get(2)?,
            actor: row.get(3)?,
            payload_hash: row.get(4)?,
            payload_json: row.get(5)?,
            recorded_at: row.get(6)?,
        })
    }

    fn decode(self) -> Result<AuditEvent, StoreError> {
        let event_type: AuditEventType = self
            .event_type
            .parse()
            .map_err(|e: provgate_types::UnknownEventType| StoreError::Corrupt(e.to_string()))?;
        let payload = serde_json::from_str(&self.payload_json)
            .map_err(|e| StoreError::Corrupt(format!("audit payload #{}: {e}", self.seq)))?;
        Ok(AuditEvent {
            seq: from_sql_seq(self.seq)?,
            event_type,
            subject: self.subject,
            actor: self.actor,
            payload_hash: parse_hash(self.payload_hash)?,
            payload,
            recorded_at: parse_timestamp(&self.recorded_at)?,
        })
    }
}

fn query_head(
    connection: &Connection,
    dataset_id: &DatasetId,
) -> Result<Option<LineageRecord>, StoreError> {
    let row = connection
        .query_row(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM lineage_records
                 WHERE dataset_id = ?1 ORDER BY seq DESC LIMIT 1"
            ),
            params![dataset_id.as_str()],
            RecordRow::from_row,
        )
        .optional()?;
    row.map(RecordRow::decode).transpose()
}

fn query_event_by_key(
    tx: &Transaction<'_>,
    event: &NewAuditEvent,
) -> Result<Option<AuditEvent>, StoreError> {
    let row = tx
        .query_row(
            &format!(
                "SELECT {EVENT_COLUMNS} FROM audit_events
                 WHERE event_type = ?1 AND subject = ?2 AND payload_hash = ?3"
            ),
            params![
                event.event_type.as_str(),
                &event.subject,
                event.payload_hash.as_str()
            ],
            EventRow::from_row,
        )
        .optional()?;
    row.map(EventRow::decode).transpose()
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::ConstraintViolation
    )
}

// ============================================================================
// GovernanceStore
// ============================================================================

impl GovernanceStore for SqliteStore {
    fn put_lineage_record(
        &self,
        record: NewLineageRecord,
        expected_parent: Option<&ContentHash>,
        deadline: Deadline,
    ) -> Result<LineageRecord, StoreError> {
        let mut connection = self.lock(deadline)?;
        let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let head = query_head(&tx, &record.dataset_id)?;
        check_expected_parent(&record, expected_parent, head.as_ref())?;

        let seq = head.as_ref().map_or(0, |h| h.seq + 1);
        let recorded_at = monotonic_now(head.as_ref().map(|h| h.recorded_at));
        let metadata_json = serde_json::to_string(&record.metadata)
            .map_err(|e| StoreError::Invalid(format!("unserializable metadata: {e}")))?;

        let inserted = tx.execute(
            "INSERT INTO lineage_records
                 (dataset_id, seq, step_type, data_hash, content_hash, parent_hash,
                  metadata_json, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.dataset_id.as_str(),
                to_sql_seq(seq)?,
                record.step_type().as_str(),
                record.data_hash.as_str(),
                record.content_hash.as_str(),
                record.parent_hash.as_ref().map_or("", ContentHash::as_str),
                metadata_json,
                format_timestamp(recorded_at),
            ],
        );
        if let Err(err) = inserted {
            if is_constraint_violation(&err) {
                let actual = query_head(&tx, &record.dataset_id)?.map(|h| h.content_hash);
                return Err(StoreError::Conflict {
                    dataset_id: record.dataset_id,
                    expected: expected_parent.cloned(),
                    actual,
                });
            }
            return Err(err.into());
        }

        // Dropping the transaction rolls it back.
        deadline.check()?;
        tx.commit()?;
        Ok(record.into_record(seq, recorded_at))
    }

    fn get_chain_head(
        &self,
        dataset_id: &DatasetId,
        deadline: Deadline,
    ) -> Result<Option<LineageRecord>, StoreError> {
        let connection = self.lock(deadline)?;
        query_head(&connection, dataset_id)
    }

    fn get_full_chain(
        &self,
        dataset_id: &DatasetId,
        deadline: Deadline,
    ) -> Result<Vec<LineageRecord>, StoreError> {
        let connection = self.lock(deadline)?;
        let mut stmt = connection.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM lineage_records
             WHERE dataset_id = ?1 ORDER BY seq ASC"
        ))?;
        let rows = stmt
            .query_map(params![dataset_id.as_str()], RecordRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(RecordRow::decode).collect()
    }

    fn put_audit_event(
        &self,
        event: NewAuditEvent,
        deadline: Deadline,
    ) -> Result<AuditAppend, StoreError> {
        let mut connection = self.lock(deadline)?;
        let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let last_at: Option<String> = tx
            .query_row(
                "SELECT recorded_at FROM audit_events ORDER BY seq DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        let last_at = last_at.as_deref().map(parse_timestamp).transpose()?;
        let recorded_at = monotonic_now(last_at);
        let payload_json = serde_json::to_string(&event.payload)
            .map_err(|e| StoreError::Invalid(format!("unserializable payload: {e}")))?;

        let changed = tx.execute(
            "INSERT INTO audit_events
                 (event_type, subject, actor, payload_hash, payload_json, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (event_type, subject, payload_hash) DO NOTHING",
            params![
                event.event_type.as_str(),
                &event.subject,
                &event.actor,
                event.payload_hash.as_str(),
                payload_json,
                format_timestamp(recorded_at),
            ],
        )?;

        if changed == 0 {
            let existing = query_event_by_key(&tx, &event)?.ok_or_else(|| {
                StoreError::Corrupt("audit insert ignored but no matching event found".to_string())
            })?;
            return Ok(AuditAppend::Duplicate(existing));
        }

        let seq = from_sql_seq(tx.last_insert_rowid())?;
        deadline.check()?;
        tx.commit()?;
        Ok(AuditAppend::Inserted(event.into_event(seq, recorded_at)))
    }

    fn list_audit_events(
        &self,
        subject: Option<&str>,
        deadline: Deadline,
    ) -> Result<Vec<AuditEvent>, StoreError> {
        let connection = self.lock(deadline)?;
        let mut stmt = connection.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM audit_events
             WHERE ?1 IS NULL OR subject = ?1 ORDER BY seq ASC"
        ))?;
        let rows = stmt
            .query_map(params![subject], EventRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(EventRow::decode).collect()
    }
}
