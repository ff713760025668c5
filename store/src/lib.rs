//! Persistence contracts for provgate and the backends that implement them.
//!
//! - [`GovernanceStore`]: lineage chains and audit events. Chain extension is a
//!   compare-and-set on the expected parent hash, so concurrent writers against
//!   the same dataset are linearized by the backend rather than by any
//!   in-process lock.
//! - [`ModelRegistry`]: read-only model metadata lookup.
//! - [`BiasMetricProvider`]: one numeric deviation per model.
//!
//! Backends: [`MemoryStore`] and [`SqliteStore`]. Registries:
//! [`StaticModelRegistry`] and [`JsonDirRegistry`].

mod bias;
mod memory;
mod registry;
mod sqlite;
mod sqlite_security;

use chrono::{DateTime, Utc};
use thiserror::Error;

use provgate_types::{
    AuditAppend, AuditEvent, ContentHash, DatasetId, Deadline, DeadlineExceeded, LineageRecord,
    ModelId, ModelMetadata, NewAuditEvent, NewLineageRecord,
};

pub use bias::{BiasMetricError, BiasMetricProvider, RegistryBiasMetrics, StaticBiasMetrics};
pub use memory::MemoryStore;
pub use registry::{JsonDirRegistry, StaticModelRegistry};
pub use sqlite::{SCHEMA_VERSION, SqliteStore};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    /// The chain head was not the expected parent. Another writer won.
    #[error(
        "chain {dataset_id} moved: expected head {}, found {}",
        display_head(expected.as_ref()),
        display_head(actual.as_ref())
    )]
    Conflict {
        dataset_id: DatasetId,
        expected: Option<ContentHash>,
        actual: Option<ContentHash>,
    },
    #[error("storage backend error: {0}")]
    Backend(String),
    /// Persisted data could not be decoded.
    #[error("corrupt stored data: {0}")]
    Corrupt(String),
    #[error("store schema version mismatch: {0}")]
    VersionMismatch(String),
    /// The caller handed the store a record that contradicts its own arguments.
    #[error("invalid write: {0}")]
    Invalid(String),
    #[error(transparent)]
    DeadlineExceeded(#[from] DeadlineExceeded),
}

fn display_head(hash: Option<&ContentHash>) -> &str {
    hash.map_or("<none>", ContentHash::short)
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

// ============================================================================
// Contracts
// ============================================================================

/// Durable storage for lineage chains and audit events.
///
/// Implementations must be safe to share across threads. Every method takes a
/// caller deadline; a write whose deadline passes before commit must leave no
/// trace.
pub trait GovernanceStore: Send + Sync {
    /// Append `record` as the new head of its chain iff the current head's
    /// content hash equals `expected_parent` (`None` meaning "no chain yet").
    ///
    /// The store assigns the sequence number and a timestamp that never runs
    /// backwards within the chain.
    fn put_lineage_record(
        &self,
        record: NewLineageRecord,
        expected_parent: Option<&ContentHash>,
        deadline: Deadline,
    ) -> Result<LineageRecord, StoreError>;

    fn get_chain_head(
        &self,
        dataset_id: &DatasetId,
        deadline: Deadline,
    ) -> Result<Option<LineageRecord>, StoreError>;

    /// Records for `dataset_id` in sequence order, root first. Empty when unknown.
    fn get_full_chain(
        &self,
        dataset_id: &DatasetId,
        deadline: Deadline,
    ) -> Result<Vec<LineageRecord>, StoreError>;

    /// Append an audit event. A second event with the same
    /// (event type, subject, payload hash) is a no-op returning the original.
    fn put_audit_event(
        &self,
        event: NewAuditEvent,
        deadline: Deadline,
    ) -> Result<AuditAppend, StoreError>;

    /// Audit events in sequence order, optionally restricted to one subject.
    fn list_audit_events(
        &self,
        subject: Option<&str>,
        deadline: Deadline,
    ) -> Result<Vec<AuditEvent>, StoreError>;
}

/// Source of model metadata.
pub trait ModelRegistry: Send + Sync {
    fn get_model_metadata(
        &self,
        model_id: &ModelId,
        deadline: Deadline,
    ) -> Result<Option<ModelMetadata>, StoreError>;
}

// ============================================================================
// Shared write rules
// ============================================================================

/// Compare-and-set precondition shared by every backend.
pub(crate) fn check_expected_parent(
    record: &NewLineageRecord,
    expected_parent: Option<&ContentHash>,
    head: Option<&LineageRecord>,
) -> Result<(), StoreError> {
    if record.parent_hash.as_ref() != expected_parent {
        return Err(StoreError::Invalid(format!(
            "record parent {} does not match expected parent {}",
            display_head(record.parent_hash.as_ref()),
            display_head(expected_parent),
        )));
    }
    let actual = head.map(|h| &h.content_hash);
    if actual != expected_parent {
        return Err(StoreError::Conflict {
            dataset_id: record.dataset_id.clone(),
            expected: expected_parent.cloned(),
            actual: actual.cloned(),
        });
    }
    Ok(())
}

/// Server-assigned timestamp that never precedes `previous`.
pub(crate) fn monotonic_now(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match previous {
        Some(prev) if prev > now => prev,
        _ => now,
    }
}
