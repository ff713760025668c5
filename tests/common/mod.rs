//! Shared fixtures for the integration suite.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde_json::{Value, json};

use provgate_core::{AuditTrail, ComplianceGate, FixedClock, LineageTracker};
use provgate_store::{GovernanceStore, StaticBiasMetrics, StaticModelRegistry};
use provgate_types::{
    DatasetId, Deadline, ModelCard, ModelId, ModelMetadata, OversightConfig, PerformanceMetrics,
    RiskAssessment, SecurityAssessment,
};

pub const MODEL: &str = "model_v1.2";

/// Evaluation instant used by every gate fixture.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 15, 9, 30, 0).unwrap()
}

pub fn model_id() -> ModelId {
    ModelId::new(MODEL).unwrap()
}

pub fn raw_customers() -> Value {
    json!({
        "columns": ["id", "age", "income", "target"],
        "rows": [
            [1, 34, 52000, "approve"],
            [2, null, 61000, "deny"],
            [3, 45, null, "approve"],
            [4, 29, 38000, "deny"]
        ]
    })
}

pub fn clean_customers() -> Value {
    json!({
        "columns": ["id", "age", "income", "target"],
        "rows": [
            [1, 34, 52000, "approve"],
            [4, 29, 38000, "deny"]
        ]
    })
}

pub struct Pipeline {
    pub store: Arc<dyn GovernanceStore>,
    pub audit: AuditTrail,
    pub tracker: LineageTracker,
}

impl Pipeline {
    pub fn new(store: Arc<dyn GovernanceStore>) -> Self {
        let audit = AuditTrail::new(store.clone(), "integration");
        let tracker = LineageTracker::new(store.clone(), audit.clone());
        Self {
            store,
            audit,
            tracker,
        }
    }

    /// customer_db extraction, remove_nulls, link to `model_v1.2`.
    pub fn linked_chain(&self) -> DatasetId {
        let raw = raw_customers();
        let clean = clean_customers();
        let dataset_id = self
            .tracker
            .track_extraction("customer_db", "SELECT * FROM customers", &raw, Deadline::NONE)
            .unwrap();
        self.tracker
            .track_transformation(
                &dataset_id,
                "remove_nulls",
                &raw,
                &clean,
                "df.dropna()",
                Deadline::NONE,
            )
            .unwrap();
        self.tracker
            .link_to_model(&dataset_id, &model_id(), Some("run-2026-03"), Deadline::NONE)
            .unwrap();
        dataset_id
    }

    pub fn gate(&self, metadata: ModelMetadata, bias: f64) -> ComplianceGate {
        let model = metadata.model_id.clone();
        ComplianceGate::new(
            self.tracker.clone(),
            Arc::new(StaticModelRegistry::with_models([metadata])),
            Arc::new(StaticBiasMetrics::new().with(model, bias)),
            self.audit.clone(),
        )
        .with_clock(Arc::new(FixedClock(now())))
    }
}

/// Metadata that passes every check at HIGH risk.
pub fn compliant_metadata(dataset_id: &DatasetId) -> ModelMetadata {
    let mut meta = ModelMetadata::new(model_id());
    meta.data_lineage_id = Some(dataset_id.clone());
    meta.risk_assessment = Some(RiskAssessment {
        completed_at: now() - TimeDelta::days(45),
        complete: true,
    });
    meta.model_card = Some(ModelCard {
        id: Some("card-model_v1.2".into()),
        fields: [
            ("intended_use", "Credit pre-screening"),
            ("limitations", "Not validated for applicants under 21"),
            ("training_data", "customer_db extract, nulls removed"),
            ("evaluation", "Holdout accuracy 0.91"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect::<BTreeMap<_, _>>(),
    });
    meta.human_oversight = Some(OversightConfig {
        enabled: true,
        measures: vec!["analyst_review".into(), "appeal_process".into()],
    });
    meta.security_assessment = Some(SecurityAssessment {
        assessment_id: "SEC-2026-007".into(),
        completed_at: now() - TimeDelta::days(20),
    });
    meta.performance = PerformanceMetrics {
        accuracy: Some(0.91),
        f1: Some(0.86),
    };
    meta
}
