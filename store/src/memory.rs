use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use provgate_types::{
    AuditAppend, AuditEvent, AuditEventType, ContentHash, DatasetId, Deadline, LineageRecord,
    NewAuditEvent, NewLineageRecord,
};

use crate::{GovernanceStore, StoreError, check_expected_parent, monotonic_now};

type AuditKey = (AuditEventType, String, ContentHash);

#[derive(Default)]
struct MemoryState {
    chains: HashMap<DatasetId, Vec<LineageRecord>>,
    audit: Vec<AuditEvent>,
    audit_index: HashMap<AuditKey, usize>,
}

/// Process-local store. Same contract as the durable backends; state is lost
/// when the value is dropped.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Backend("memory store mutex poisoned".to_string()))
    }
}

impl GovernanceStore for MemoryStore {
    fn put_lineage_record(
        &self,
        record: NewLineageRecord,
        expected_parent: Option<&ContentHash>,
        deadline: Deadline,
    ) -> Result<LineageRecord, StoreError> {
        deadline.check()?;
        let mut state = self.lock()?;
        let head = state
            .chains
            .get(&record.dataset_id)
            .and_then(|chain| chain.last());
        check_expected_parent(&record, expected_parent, head)?;

        let seq = head.map_or(0, |head| head.seq + 1);
        let recorded_at = monotonic_now(head.map(|head| head.recorded_at));
        deadline.check()?;

        let stored = record.into_record(seq, recorded_at);
        state
            .chains
            .entry(stored.dataset_id.clone())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    fn get_chain_head(
        &self,
        dataset_id: &DatasetId,
        deadline: Deadline,
    ) -> Result<Option<LineageRecord>, StoreError> {
        deadline.check()?;
        let state = self.lock()?;
        Ok(state
            .chains
            .get(dataset_id)
            .and_then(|chain| chain.last().cloned()))
    }

    fn get_full_chain(
        &self,
        dataset_id: &DatasetId,
        deadline: Deadline,
    ) -> Result<Vec<LineageRecord>, StoreError> {
        deadline.check()?;
        let state = self.lock()?;
        Ok(state.chains.get(dataset_id).cloned().unwrap_or_default())
    }

    fn put_audit_event(
        &self,
        event: NewAuditEvent,
        deadline: Deadline,
    ) -> Result<AuditAppend, StoreError> {
        deadline.check()?;
        let mut state = self.lock()?;
        let key = (
            event.event_type,
            event.subject.clone(),
            event.payload_hash.clone(),
        );
        if let Some(&idx) = state.audit_index.get(&key) {
            return Ok(AuditAppend::Duplicate(state.audit[idx].clone()));
        }

        let seq = state.audit.last().map_or(1, |last| last.seq + 1);
        let recorded_at = monotonic_now(state.audit.last().map(|last| last.recorded_at));
        deadline.check()?;

        let stored = event.into_event(seq, recorded_at);
        let idx = state.audit.len();
        state.audit.push(stored.clone());
        state.audit_index.insert(key, idx);
        Ok(AuditAppend::Inserted(stored))
    }

    fn list_audit_events(
        &self,
        subject: Option<&str>,
        deadline: Deadline,
    ) -> Result<Vec<AuditEvent>, StoreError> {
        deadline.check()?;
        let state = self.lock()?;
        Ok(state
            .audit
            .iter()
            .filter(|event| subject.is_none_or(|s| event.subject == s))
            .cloned()
            .collect())
    }
}
