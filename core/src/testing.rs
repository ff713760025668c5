//! Store doubles shared by unit tests.

use std::sync::Arc;

use provgate_store::{GovernanceStore, MemoryStore, StoreError};
use provgate_types::{
    AuditAppend, AuditEvent, ContentHash, DatasetId, Deadline, LineageRecord, NewAuditEvent,
    NewLineageRecord,
};

/// Delegates everything to the wrapped store except audit appends, which fail.
pub(crate) struct BrokenAuditStore(pub(crate) Arc<MemoryStore>);

impl GovernanceStore for BrokenAuditStore {
    fn put_lineage_record(
        &self,
        record: NewLineageRecord,
        expected_parent: Option<&ContentHash>,
        deadline: Deadline,
    ) -> Result<LineageRecord, StoreError> {
        self.0.put_lineage_record(record, expected_parent, deadline)
    }

    fn get_chain_head(
        &self,
        dataset_id: &DatasetId,
        deadline: Deadline,
    ) -> Result<Option<LineageRecord>, StoreError> {
        self.0.get_chain_head(dataset_id, deadline)
    }

    fn get_full_chain(
        &self,
        dataset_id: &DatasetId,
        deadline: Deadline,
    ) -> Result<Vec<LineageRecord>, StoreError> {
        self.0.get_full_chain(dataset_id, deadline)
    }

    fn put_audit_event(
        &self,
        _event: NewAuditEvent,
        _deadline: Deadline,
    ) -> Result<AuditAppend, StoreError> {
        Err(StoreError::Backend("audit table unavailable".into()))
    }

    fn list_audit_events(
        &self,
        subject: Option<&str>,
        deadline: Deadline,
    ) -> Result<Vec<AuditEvent>, StoreError> {
        self.0.list_audit_events(subject, deadline)
    }
}
