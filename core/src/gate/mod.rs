//! Compliance Gate.
//!
//! `validate_deployment` gathers evidence (registry metadata, lineage, bias),
//! runs every check in [`ComplianceCheck::REGISTRY`] order without stopping at
//! the first failure, and records exactly one `gate.decision` audit event. A
//! decision that could not be audited is returned as an error, never as a
//! report.

mod checks;

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use provgate_config::GateConfig;
use provgate_store::{BiasMetricError, BiasMetricProvider, ModelRegistry};
use provgate_types::{
    AuditEvent, AuditEventType, CheckResult, ComplianceReport, Deadline, ModelId, RiskLevel,
};
use provgate_utils::{HashError, fingerprint};

use crate::ProvenanceError;
use crate::audit::AuditTrail;
use crate::clock::{Clock, SystemClock};
use crate::tracker::LineageTracker;

pub use checks::{BiasEvidence, CheckContext, CheckOutcome, ComplianceCheck, LineageEvidence};

/// A report together with the audit event that made it authoritative.
#[derive(Debug, Clone)]
pub struct GateDecision {
    pub evaluation_id: String,
    pub report: ComplianceReport,
    pub audit_event: AuditEvent,
}

impl GateDecision {
    #[must_use]
    pub fn can_deploy(&self) -> bool {
        self.report.can_deploy
    }
}

#[derive(Serialize)]
struct DecisionPayload<'a> {
    evaluation_id: &'a str,
    report: &'a ComplianceReport,
}

pub struct ComplianceGate {
    tracker: LineageTracker,
    registry: Arc<dyn ModelRegistry>,
    bias: Arc<dyn BiasMetricProvider>,
    audit: AuditTrail,
    clock: Arc<dyn Clock>,
}

impl ComplianceGate {
    pub fn new(
        tracker: LineageTracker,
        registry: Arc<dyn ModelRegistry>,
        bias: Arc<dyn BiasMetricProvider>,
        audit: AuditTrail,
    ) -> Self {
        Self {
            tracker,
            registry,
            bias,
            audit,
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Evaluate every compliance check for `model_id` at `risk_level`.
    ///
    /// Errors only for infrastructure faults, an expired deadline, or a failed
    /// audit write. A model that fails checks yields `Ok` with
    /// `can_deploy() == false`.
    pub fn validate_deployment(
        &self,
        model_id: &ModelId,
        risk_level: RiskLevel,
        config: &GateConfig,
        deadline: Deadline,
    ) -> Result<GateDecision, ProvenanceError> {
        deadline.check()?;

        let metadata = self.registry.get_model_metadata(model_id, deadline)?;
        let lineage = match metadata.as_ref().and_then(|m| m.data_lineage_id.as_ref()) {
            Some(dataset_id) => LineageEvidence::Verified {
                dataset_id: dataset_id.clone(),
                verification: self.tracker.verify_chain(dataset_id, deadline)?,
            },
            None => LineageEvidence::NotDeclared,
        };
        let bias = match self.bias.deviation(model_id, deadline) {
            Ok(Some(value)) => BiasEvidence::Measured(value),
            Ok(None) => BiasEvidence::NotReported,
            Err(err @ BiasMetricError::Unavailable { .. }) => {
                BiasEvidence::Unavailable(err.to_string())
            }
            Err(BiasMetricError::Store(err)) => return Err(err.into()),
        };

        let now = self.clock.now();
        let ctx = CheckContext {
            model_id,
            risk_level,
            config,
            now,
            metadata: metadata.as_ref(),
            lineage: &lineage,
            bias: &bias,
        };
        let checks: Vec<CheckResult> = ComplianceCheck::REGISTRY
            .iter()
            .map(|check| {
                let outcome = check.evaluate(&ctx);
                CheckResult {
                    name: check.name().to_string(),
                    description: check.description().to_string(),
                    required: check.is_required(risk_level),
                    passed: outcome.passed,
                    detail: outcome.detail,
                }
            })
            .collect();
        let report = ComplianceReport::new(model_id.clone(), risk_level, now, checks);

        let evaluation_id = Uuid::new_v4().to_string();
        let payload = serde_json::to_value(DecisionPayload {
            evaluation_id: &evaluation_id,
            report: &report,
        })
        .map_err(HashError::from)?;
        let payload_hash = fingerprint(&payload)?;
        let event = self.audit.event(
            AuditEventType::GateDecision,
            model_id.as_str(),
            payload_hash,
            payload,
        );
        let audit_event = self.audit.record(event, deadline)?.into_event();

        if report.can_deploy {
            info!(
                model_id = %model_id,
                risk_level = %risk_level,
                checks = report.checks_run(),
                warnings = report.warnings().count(),
                audit_seq = audit_event.seq,
                "Deployment approved"
            );
        } else {
            warn!(
                model_id = %model_id,
                risk_level = %risk_level,
                failures = ?report.failures,
                audit_seq = audit_event.seq,
                "Deployment blocked"
            );
        }

        Ok(GateDecision {
            evaluation_id,
            report,
            audit_event,
        })
    }

    /// Like [`Self::validate_deployment`], but a blocked decision is an error.
    ///
    /// The decision is audited either way.
    pub fn ensure_deployable(
        &self,
        model_id: &ModelId,
        risk_level: RiskLevel,
        config: &GateConfig,
        deadline: Deadline,
    ) -> Result<GateDecision, ProvenanceError> {
        let decision = self.validate_deployment(model_id, risk_level, config, deadline)?;
        if decision.can_deploy() {
            Ok(decision)
        } else {
            Err(ProvenanceError::DeploymentBlocked {
                model_id: decision.report.model_id,
                failures: decision.report.failures,
            })
        }
    }
}
