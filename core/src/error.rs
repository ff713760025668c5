use thiserror::Error;

use provgate_store::StoreError;
use provgate_types::{ContentHash, DatasetId, DeadlineExceeded, ModelId};
use provgate_utils::HashError;

fn short(hash: Option<&ContentHash>) -> &str {
    hash.map_or("<none>", ContentHash::short)
}

/// Errors surfaced by the tracker and the gate.
///
/// A broken chain is not an error: [`crate::LineageTracker::verify_chain`]
/// reports it as a value. Likewise a blocked deployment is a report with
/// failures, except through [`crate::ComplianceGate::ensure_deployable`].
#[derive(Debug, Error)]
pub enum ProvenanceError {
    #[error("storage failure: {0}")]
    Storage(#[source] StoreError),

    #[error("no lineage chain for dataset {0}")]
    ChainNotFound(DatasetId),

    /// Another writer advanced the chain first. Re-read the head and retry.
    #[error(
        "dataset {dataset_id} was modified concurrently (expected head {}, found {})",
        short(expected.as_ref()),
        short(actual.as_ref())
    )]
    ConcurrentModification {
        dataset_id: DatasetId,
        expected: Option<ContentHash>,
        actual: Option<ContentHash>,
    },

    #[error("dataset {dataset_id} is already linked to model {model_id}")]
    AlreadyLinked {
        dataset_id: DatasetId,
        model_id: ModelId,
    },

    /// The outcome was computed but could not be recorded. It must not be acted on.
    #[error("audit event for {subject} could not be written: {source}")]
    AuditWrite {
        subject: String,
        #[source]
        source: StoreError,
    },

    #[error("operation deadline exceeded")]
    DeadlineExceeded,

    #[error("serialization failed: {0}")]
    Serialization(#[from] HashError),

    #[error("deployment of {model_id} blocked by: {}", failures.join(", "))]
    DeploymentBlocked {
        model_id: ModelId,
        failures: Vec<String>,
    },
}

impl ProvenanceError {
    /// Only a lost compare-and-set race is worth retrying.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, ProvenanceError::ConcurrentModification { .. })
    }
}

impl From<StoreError> for ProvenanceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict {
                dataset_id,
                expected,
                actual,
            } => ProvenanceError::ConcurrentModification {
                dataset_id,
                expected,
                actual,
            },
            StoreError::DeadlineExceeded(_) => ProvenanceError::DeadlineExceeded,
            other => ProvenanceError::Storage(other),
        }
    }
}

impl From<DeadlineExceeded> for ProvenanceError {
    fn from(_: DeadlineExceeded) -> Self {
        ProvenanceError::DeadlineExceeded
    }
}
