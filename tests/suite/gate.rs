//! Compliance gate scenarios over a real lineage chain.

use std::sync::Arc;

use provgate_config::GateConfig;
use provgate_core::{ComplianceCheck, ProvenanceError};
use provgate_store::MemoryStore;
use provgate_types::{AuditEventType, Deadline, ModelId, RiskLevel};

use crate::common::{Pipeline, compliant_metadata, model_id, now};

#[test]
fn bias_above_threshold_blocks_only_on_bias() {
    let pipeline = Pipeline::new(Arc::new(MemoryStore::new()));
    let dataset_id = pipeline.linked_chain();
    let gate = pipeline.gate(compliant_metadata(&dataset_id), 0.12);

    let decision = gate
        .validate_deployment(&model_id(), RiskLevel::High, &GateConfig::default(), Deadline::NONE)
        .unwrap();

    assert!(!decision.report.can_deploy);
    assert_eq!(decision.report.failures, vec!["bias_threshold_check".to_string()]);
    assert!(decision.report.checks_run() >= 7);
    assert_eq!(decision.report.risk_level, RiskLevel::High);
    assert_eq!(decision.report.timestamp, now());
}

#[test]
fn bias_below_threshold_deploys() {
    let pipeline = Pipeline::new(Arc::new(MemoryStore::new()));
    let dataset_id = pipeline.linked_chain();
    let gate = pipeline.gate(compliant_metadata(&dataset_id), 0.05);

    let decision = gate
        .validate_deployment(&model_id(), RiskLevel::High, &GateConfig::default(), Deadline::NONE)
        .unwrap();

    assert!(decision.can_deploy());
    assert!(decision.report.failures.is_empty());
    let names: Vec<&str> = decision.report.checks.iter().map(|c| c.name.as_str()).collect();
    let expected: Vec<&str> = ComplianceCheck::REGISTRY.iter().map(|c| c.name()).collect();
    assert_eq!(names, expected);
}

#[test]
fn configured_threshold_is_honoured() {
    let pipeline = Pipeline::new(Arc::new(MemoryStore::new()));
    let dataset_id = pipeline.linked_chain();
    let gate = pipeline.gate(compliant_metadata(&dataset_id), 0.12);

    let mut config = GateConfig::default();
    config.bias_threshold = 0.15;
    let decision = gate
        .validate_deployment(&model_id(), RiskLevel::High, &config, Deadline::NONE)
        .unwrap();
    assert!(decision.can_deploy());
}

#[test]
fn oversight_blocks_high_but_not_minimal() {
    let pipeline = Pipeline::new(Arc::new(MemoryStore::new()));
    let dataset_id = pipeline.linked_chain();
    let mut meta = compliant_metadata(&dataset_id);
    meta.human_oversight = None;
    let gate = pipeline.gate(meta, 0.05);
    let config = GateConfig::default();

    let high = gate
        .validate_deployment(&model_id(), RiskLevel::High, &config, Deadline::NONE)
        .unwrap();
    assert_eq!(high.report.failures, vec!["human_oversight_check".to_string()]);

    let minimal = gate
        .validate_deployment(&model_id(), RiskLevel::Minimal, &config, Deadline::NONE)
        .unwrap();
    assert!(minimal.can_deploy());
    let check = minimal.report.check("human_oversight_check").unwrap();
    assert!(!check.passed);
    assert!(!check.required);
}

#[test]
fn unacceptable_tier_never_deploys() {
    let pipeline = Pipeline::new(Arc::new(MemoryStore::new()));
    let dataset_id = pipeline.linked_chain();
    let gate = pipeline.gate(compliant_metadata(&dataset_id), 0.0);

    let err = gate
        .ensure_deployable(
            &model_id(),
            RiskLevel::Unacceptable,
            &GateConfig::default(),
            Deadline::NONE,
        )
        .unwrap_err();
    match err {
        ProvenanceError::DeploymentBlocked { failures, .. } => {
            assert_eq!(failures, vec!["risk_tier_permitted_check".to_string()]);
        }
        other => panic!("expected DeploymentBlocked, got {other:?}"),
    }
}

#[test]
fn model_without_declared_lineage_fails_lineage_check() {
    let pipeline = Pipeline::new(Arc::new(MemoryStore::new()));
    let dataset_id = pipeline.linked_chain();
    let mut meta = compliant_metadata(&dataset_id);
    meta.data_lineage_id = None;
    let gate = pipeline.gate(meta, 0.05);

    let decision = gate
        .validate_deployment(&model_id(), RiskLevel::High, &GateConfig::default(), Deadline::NONE)
        .unwrap();
    assert_eq!(
        decision.report.failures,
        vec!["lineage_completeness_check".to_string()]
    );
}

#[test]
fn every_call_is_audited_once() {
    let pipeline = Pipeline::new(Arc::new(MemoryStore::new()));
    let dataset_id = pipeline.linked_chain();
    let gate = pipeline.gate(compliant_metadata(&dataset_id), 0.12);
    let unknown = ModelId::new("shadow_model").unwrap();
    let config = GateConfig::default();

    for _ in 0..3 {
        gate.validate_deployment(&model_id(), RiskLevel::High, &config, Deadline::NONE)
            .unwrap();
    }
    let decision = gate
        .validate_deployment(&unknown, RiskLevel::Limited, &config, Deadline::NONE)
        .unwrap();
    assert!(!decision.can_deploy());

    let events = pipeline.audit.events(None, Deadline::NONE).unwrap();
    let decisions: Vec<_> = events
        .iter()
        .filter(|e| e.event_type == AuditEventType::GateDecision)
        .collect();
    assert_eq!(decisions.len(), 4);
    assert_eq!(
        decisions.iter().filter(|e| e.subject == "model_v1.2").count(),
        3
    );
    assert_eq!(decisions[3].subject, "shadow_model");
    assert_eq!(decisions[3].payload_hash, decision.audit_event.payload_hash);
}
