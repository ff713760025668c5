//! Racing writers on one chain head.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use serde_json::json;
use tempfile::tempdir;

use provgate_core::ProvenanceError;
use provgate_store::{GovernanceStore, MemoryStore, SqliteStore, StoreError};
use provgate_types::{
    AuditAppend, AuditEvent, ContentHash, DatasetId, Deadline, LineageRecord, NewAuditEvent,
    NewLineageRecord,
};

use crate::common::{Pipeline, raw_customers};

/// Holds every armed `get_chain_head` call until all racers have read the head.
struct RendezvousStore<S> {
    inner: S,
    armed: AtomicBool,
    barrier: Barrier,
}

impl<S> RendezvousStore<S> {
    fn new(inner: S, racers: usize) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(false),
            barrier: Barrier::new(racers),
        }
    }

    fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

impl<S: GovernanceStore> GovernanceStore for RendezvousStore<S> {
    fn put_lineage_record(
        &self,
        record: NewLineageRecord,
        expected_parent: Option<&ContentHash>,
        deadline: Deadline,
    ) -> Result<LineageRecord, StoreError> {
        self.inner.put_lineage_record(record, expected_parent, deadline)
    }

    fn get_chain_head(
        &self,
        dataset_id: &DatasetId,
        deadline: Deadline,
    ) -> Result<Option<LineageRecord>, StoreError> {
        let head = self.inner.get_chain_head(dataset_id, deadline);
        if self.armed.load(Ordering::SeqCst) {
            self.barrier.wait();
        }
        head
    }

    fn get_full_chain(
        &self,
        dataset_id: &DatasetId,
        deadline: Deadline,
    ) -> Result<Vec<LineageRecord>, StoreError> {
        self.inner.get_full_chain(dataset_id, deadline)
    }

    fn put_audit_event(
        &self,
        event: NewAuditEvent,
        deadline: Deadline,
    ) -> Result<AuditAppend, StoreError> {
        self.inner.put_audit_event(event, deadline)
    }

    fn list_audit_events(
        &self,
        subject: Option<&str>,
        deadline: Deadline,
    ) -> Result<Vec<AuditEvent>, StoreError> {
        self.inner.list_audit_events(subject, deadline)
    }
}

fn race<S: GovernanceStore + 'static>(store: Arc<RendezvousStore<S>>) {
    let pipeline = Pipeline::new(store.clone());
    let dataset_id = pipeline
        .tracker
        .track_extraction("customer_db", "SELECT *", &raw_customers(), Deadline::NONE)
        .unwrap();
    store.arm();

    let handles: Vec<_> = ["dedupe", "normalize"]
        .into_iter()
        .map(|step| {
            let tracker = pipeline.tracker.clone();
            let dataset_id = dataset_id.clone();
            thread::spawn(move || {
                tracker.track_transformation(
                    &dataset_id,
                    step,
                    &raw_customers(),
                    &json!({"step": step}),
                    "",
                    Deadline::after(Duration::from_secs(10)),
                )
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    let losers: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
    assert_eq!(winners, 1);
    assert_eq!(losers.len(), 1);
    assert!(
        matches!(losers[0], ProvenanceError::ConcurrentModification { .. }),
        "{:?}",
        losers[0]
    );
    assert!(losers[0].is_retriable());

    let chain = pipeline.tracker.chain(&dataset_id, Deadline::NONE).unwrap();
    assert_eq!(chain.len(), 2);
    assert!(pipeline.tracker.verify_chain(&dataset_id, Deadline::NONE).unwrap().is_valid());
}

#[test]
fn memory_store_admits_one_writer_per_head() {
    race(Arc::new(RendezvousStore::new(MemoryStore::new(), 2)));
}

#[test]
fn sqlite_store_admits_one_writer_per_head() {
    let dir = tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("race.db"), Duration::from_secs(5)).unwrap();
    race(Arc::new(RendezvousStore::new(store, 2)));
}
