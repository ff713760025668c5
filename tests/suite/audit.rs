//! Audit trail ordering and idempotency.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::tempdir;

use provgate_core::AuditTrail;
use provgate_store::{MemoryStore, SqliteStore};
use provgate_types::{AuditEventType, ContentHash, Deadline};
use provgate_utils::fingerprint;

use crate::common::Pipeline;

#[test]
fn lineage_steps_are_audited_in_order() {
    let pipeline = Pipeline::new(Arc::new(MemoryStore::new()));
    let dataset_id = pipeline.linked_chain();

    let events = pipeline
        .audit
        .events(Some(dataset_id.as_str()), Deadline::NONE)
        .unwrap();
    let types: Vec<AuditEventType> = events.iter().map(|e| e.event_type).collect();
    assert_eq!(
        types,
        [
            AuditEventType::LineageExtraction,
            AuditEventType::LineageTransformation,
            AuditEventType::LineageModelLink,
        ]
    );

    let chain = pipeline.tracker.chain(&dataset_id, Deadline::NONE).unwrap();
    for (event, record) in events.iter().zip(&chain) {
        assert_eq!(event.payload_hash, record.content_hash);
        assert_eq!(event.actor, "integration");
    }
    assert!(events.windows(2).all(|w| w[0].seq < w[1].seq));
}

#[test]
fn retries_are_absorbed_across_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("audit.db");
    let payload = json!({"decision": "approved", "model": "model_v1.2"});
    let hash: ContentHash = fingerprint(&payload).unwrap();

    let first_seq = {
        let trail = AuditTrail::new(
            Arc::new(SqliteStore::open(&path, Duration::from_secs(5)).unwrap()),
            "release-bot",
        );
        let event = trail.event(
            AuditEventType::GateDecision,
            "model_v1.2",
            hash.clone(),
            payload.clone(),
        );
        trail.record(event, Deadline::NONE).unwrap().event().seq
    };

    let trail = AuditTrail::new(
        Arc::new(SqliteStore::open(&path, Duration::from_secs(5)).unwrap()),
        "release-bot",
    );
    let retry = trail.event(AuditEventType::GateDecision, "model_v1.2", hash.clone(), payload);
    let appended = trail.record(retry, Deadline::NONE).unwrap();
    assert!(appended.is_duplicate());
    assert_eq!(appended.event().seq, first_seq);

    let other = trail.event(
        AuditEventType::GateDecision,
        "model_v1.3",
        hash,
        json!({"decision": "approved", "model": "model_v1.2"}),
    );
    let appended = trail.record(other, Deadline::NONE).unwrap();
    assert!(!appended.is_duplicate());
    assert!(appended.event().seq > first_seq);
    assert_eq!(trail.events(None, Deadline::NONE).unwrap().len(), 2);
}
