//! Tamper detection and append-only enforcement on the SQLite backend.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use tempfile::tempdir;

use provgate_config::GateConfig;
use provgate_store::SqliteStore;
use provgate_types::{BreakKind, Deadline, RiskLevel};

use crate::common::{Pipeline, compliant_metadata, model_id};

fn open(path: &Path) -> Pipeline {
    Pipeline::new(Arc::new(
        SqliteStore::open(path, Duration::from_secs(5)).unwrap(),
    ))
}

#[test]
fn triggers_reject_rewrites() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("governance.db");
    let pipeline = open(&path);
    let dataset_id = pipeline.linked_chain();
    drop(pipeline);

    let conn = Connection::open(&path).unwrap();
    let update = conn.execute(
        "UPDATE lineage_records SET metadata_json = '{}' WHERE dataset_id = ?1",
        [dataset_id.as_str()],
    );
    assert!(update.is_err());
    let delete = conn.execute("DELETE FROM audit_events", []);
    assert!(delete.is_err());
}

#[test]
fn rewritten_metadata_breaks_chain_and_blocks_gate() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("governance.db");
    let dataset_id = open(&path).linked_chain();

    {
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("DROP TRIGGER lineage_records_no_update;")
            .unwrap();
        let changed = conn
            .execute(
                "UPDATE lineage_records
                 SET metadata_json = REPLACE(metadata_json, 'remove_nulls', 'remove_outliers')
                 WHERE dataset_id = ?1 AND seq = 1",
                [dataset_id.as_str()],
            )
            .unwrap();
        assert_eq!(changed, 1);
    }

    let pipeline = open(&path);
    let verification = pipeline
        .tracker
        .verify_chain(&dataset_id, Deadline::NONE)
        .unwrap();
    assert!(!verification.is_valid());
    assert_eq!(verification.broken_indices(), vec![1]);
    assert!(matches!(
        verification.breaks[0].kind,
        BreakKind::ContentHashMismatch { .. }
    ));

    let gate = pipeline.gate(compliant_metadata(&dataset_id), 0.05);
    let decision = gate
        .validate_deployment(&model_id(), RiskLevel::High, &GateConfig::default(), Deadline::NONE)
        .unwrap();
    assert_eq!(
        decision.report.failures,
        vec!["lineage_completeness_check".to_string()]
    );
}
