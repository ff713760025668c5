//! Lineage tracking end to end, against both store backends.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::tempdir;

use provgate_core::ProvenanceError;
use provgate_store::{MemoryStore, SqliteStore};
use provgate_types::{
    BreakKind, DatasetId, Deadline, ModelId, Representativeness, StepMetadata, StepType,
};

use crate::common::{Pipeline, clean_customers, model_id, raw_customers};

#[test]
fn chain_records_three_linked_steps() {
    let pipeline = Pipeline::new(Arc::new(MemoryStore::new()));
    let dataset_id = pipeline.linked_chain();

    let chain = pipeline.tracker.chain(&dataset_id, Deadline::NONE).unwrap();
    let steps: Vec<StepType> = chain.iter().map(|r| r.step_type).collect();
    assert_eq!(
        steps,
        [StepType::Extraction, StepType::Transformation, StepType::ModelLink]
    );
    assert!(chain[0].parent_hash.is_none());
    for pair in chain.windows(2) {
        assert_eq!(pair[1].parent_hash.as_ref(), Some(&pair[0].content_hash));
    }

    let verification = pipeline.tracker.verify_chain(&dataset_id, Deadline::NONE).unwrap();
    assert!(verification.is_valid());
    assert_eq!(verification.record_count, 3);
    assert_eq!(verification.linked_model, Some(model_id()));
}

#[test]
fn extraction_profiles_tabular_data() {
    let pipeline = Pipeline::new(Arc::new(MemoryStore::new()));
    let dataset_id = pipeline.linked_chain();
    let chain = pipeline.tracker.chain(&dataset_id, Deadline::NONE).unwrap();

    let StepMetadata::Extraction(extraction) = &chain[0].metadata else {
        panic!("root is not an extraction: {:?}", chain[0].metadata);
    };
    assert_eq!(extraction.source, "customer_db");
    let profile = extraction.profile.as_ref().unwrap();
    assert_eq!(profile.row_count, 4);
    assert_eq!(profile.column_count, 4);
    assert!((profile.completeness - 14.0 / 16.0).abs() < 1e-12);
    assert_eq!(profile.representativeness, Some(Representativeness::Pass));

    let StepMetadata::Transformation(step) = &chain[1].metadata else {
        panic!("second record is not a transformation");
    };
    assert_eq!(step.step_name, "remove_nulls");
    let shape = step.shape.as_ref().unwrap();
    assert_eq!((shape.rows_before, shape.rows_after, shape.rows_removed), (4, 2, 2));
}

#[test]
fn sqlite_and_memory_hash_identically() {
    let dir = tempdir().unwrap();
    let sqlite = Pipeline::new(Arc::new(
        SqliteStore::open(dir.path().join("lineage.db"), Duration::from_secs(5)).unwrap(),
    ));
    let memory = Pipeline::new(Arc::new(MemoryStore::new()));

    let a = sqlite.linked_chain();
    let b = memory.linked_chain();
    let chain_a = sqlite.tracker.chain(&a, Deadline::NONE).unwrap();
    let chain_b = memory.tracker.chain(&b, Deadline::NONE).unwrap();

    // Dataset ids differ, so only data hashes line up.
    let data_a: Vec<_> = chain_a.iter().map(|r| r.data_hash.clone()).collect();
    let data_b: Vec<_> = chain_b.iter().map(|r| r.data_hash.clone()).collect();
    assert_eq!(data_a, data_b);
    assert!(sqlite.tracker.verify_chain(&a, Deadline::NONE).unwrap().is_valid());
}

#[test]
fn linked_chain_rejects_further_steps() {
    let pipeline = Pipeline::new(Arc::new(MemoryStore::new()));
    let dataset_id = pipeline.linked_chain();

    let err = pipeline
        .tracker
        .track_transformation(
            &dataset_id,
            "late_fix",
            &clean_customers(),
            &json!({"rows": []}),
            "",
            Deadline::NONE,
        )
        .unwrap_err();
    assert!(matches!(err, ProvenanceError::AlreadyLinked { .. }), "{err:?}");

    let other = ModelId::new("model_v2.0").unwrap();
    let err = pipeline
        .tracker
        .link_to_model(&dataset_id, &other, None, Deadline::NONE)
        .unwrap_err();
    match err {
        ProvenanceError::AlreadyLinked { model_id: linked, .. } => assert_eq!(linked, model_id()),
        other => panic!("expected AlreadyLinked, got {other:?}"),
    }
}

#[test]
fn unknown_dataset_is_not_found_but_verifies_as_broken() {
    let pipeline = Pipeline::new(Arc::new(MemoryStore::new()));
    let ghost = DatasetId::new("ds_missing").unwrap();

    let err = pipeline
        .tracker
        .track_transformation(&ghost, "x", &raw_customers(), &clean_customers(), "", Deadline::NONE)
        .unwrap_err();
    assert!(matches!(err, ProvenanceError::ChainNotFound(_)));

    let verification = pipeline.tracker.verify_chain(&ghost, Deadline::NONE).unwrap();
    assert!(!verification.is_valid());
    assert_eq!(verification.breaks[0].kind, BreakKind::EmptyChain);
}

#[test]
fn expired_deadline_leaves_no_record() {
    let pipeline = Pipeline::new(Arc::new(MemoryStore::new()));
    let dataset_id = pipeline
        .tracker
        .track_extraction("customer_db", "q", &raw_customers(), Deadline::NONE)
        .unwrap();

    let expired = Deadline::after(Duration::ZERO);
    let err = pipeline
        .tracker
        .track_transformation(&dataset_id, "s", &raw_customers(), &clean_customers(), "", expired)
        .unwrap_err();
    assert!(matches!(err, ProvenanceError::DeadlineExceeded), "{err:?}");
    assert_eq!(pipeline.tracker.chain(&dataset_id, Deadline::NONE).unwrap().len(), 1);
}
