//! The compliance check registry.
//!
//! Checks form a closed set evaluated in [`ComplianceCheck::REGISTRY`] order.
//! Evaluation is pure: everything a check looks at is gathered into a
//! [`CheckContext`] before the first check runs.

use chrono::{DateTime, TimeDelta, Utc};

use provgate_config::GateConfig;
use provgate_types::{ChainVerification, DatasetId, ModelId, ModelMetadata, RiskLevel};

use RiskLevel::{High, Limited, Unacceptable};

/// What the gate found out about the model's data lineage.
#[derive(Debug, Clone)]
pub enum LineageEvidence {
    /// The model declares no dataset (or is not registered at all).
    NotDeclared,
    Verified {
        dataset_id: DatasetId,
        verification: ChainVerification,
    },
}

/// The bias provider's answer.
#[derive(Debug, Clone, PartialEq)]
pub enum BiasEvidence {
    Measured(f64),
    NotReported,
    Unavailable(String),
}

pub struct CheckContext<'a> {
    pub model_id: &'a ModelId,
    pub risk_level: RiskLevel,
    pub config: &'a GateConfig,
    pub now: DateTime<Utc>,
    /// `None` when the registry does not know the model.
    pub metadata: Option<&'a ModelMetadata>,
    pub lineage: &'a LineageEvidence,
    pub bias: &'a BiasEvidence,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub passed: bool,
    pub detail: String,
}

impl CheckOutcome {
    fn pass(detail: impl Into<String>) -> Self {
        Self {
            passed: true,
            detail: detail.into(),
        }
    }

    fn fail(detail: impl Into<String>) -> Self {
        Self {
            passed: false,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComplianceCheck {
    RiskAssessment,
    LineageCompleteness,
    BiasThreshold,
    Documentation,
    HumanOversight,
    SecurityAssessment,
    PerformanceThreshold,
    RiskTierPermitted,
}

impl ComplianceCheck {
    /// Evaluation order. Reports list checks in exactly this order.
    pub const REGISTRY: [ComplianceCheck; 8] = [
        ComplianceCheck::RiskAssessment,
        ComplianceCheck::LineageCompleteness,
        ComplianceCheck::BiasThreshold,
        ComplianceCheck::Documentation,
        ComplianceCheck::HumanOversight,
        ComplianceCheck::SecurityAssessment,
        ComplianceCheck::PerformanceThreshold,
        ComplianceCheck::RiskTierPermitted,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            ComplianceCheck::RiskAssessment => "risk_assessment_check",
            ComplianceCheck::LineageCompleteness => "lineage_completeness_check",
            ComplianceCheck::BiasThreshold => "bias_threshold_check",
            ComplianceCheck::Documentation => "documentation_check",
            ComplianceCheck::HumanOversight => "human_oversight_check",
            ComplianceCheck::SecurityAssessment => "security_assessment_check",
            ComplianceCheck::PerformanceThreshold => "performance_threshold_check",
            ComplianceCheck::RiskTierPermitted => "risk_tier_permitted_check",
        }
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            ComplianceCheck::RiskAssessment => "Risk assessment is complete and recent",
            ComplianceCheck::LineageCompleteness => {
                "Data lineage verifies and terminates in a link to this model"
            }
            ComplianceCheck::BiasThreshold => "Bias deviation is within the configured threshold",
            ComplianceCheck::Documentation => "Model card documents every required field",
            ComplianceCheck::HumanOversight => "Human oversight measures are configured",
            ComplianceCheck::SecurityAssessment => "Security assessment is on record and recent",
            ComplianceCheck::PerformanceThreshold => {
                "Accuracy and F1 meet the thresholds for the risk level"
            }
            ComplianceCheck::RiskTierPermitted => "Risk tier permits deployment",
        }
    }

    /// Risk levels at which a failure blocks deployment.
    #[must_use]
    pub const fn required_for(self) -> &'static [RiskLevel] {
        match self {
            ComplianceCheck::RiskAssessment
            | ComplianceCheck::Documentation
            | ComplianceCheck::PerformanceThreshold => &[Limited, High, Unacceptable],
            ComplianceCheck::LineageCompleteness
            | ComplianceCheck::BiasThreshold
            | ComplianceCheck::HumanOversight
            | ComplianceCheck::SecurityAssessment => &[High, Unacceptable],
            ComplianceCheck::RiskTierPermitted => &[Unacceptable],
        }
    }

    #[must_use]
    pub fn is_required(self, risk_level: RiskLevel) -> bool {
        self.required_for().contains(&risk_level)
    }

    #[must_use]
    pub fn evaluate(self, ctx: &CheckContext<'_>) -> CheckOutcome {
        match self {
            ComplianceCheck::LineageCompleteness => lineage(ctx),
            ComplianceCheck::BiasThreshold => bias(ctx),
            ComplianceCheck::RiskTierPermitted => tier_permitted(ctx),
            metadata_check => match ctx.metadata {
                None => CheckOutcome::fail(format!("model {} is not registered", ctx.model_id)),
                Some(meta) => match metadata_check {
                    ComplianceCheck::RiskAssessment => risk_assessment(ctx, meta),
                    ComplianceCheck::Documentation => documentation(ctx, meta),
                    ComplianceCheck::HumanOversight => human_oversight(meta),
                    ComplianceCheck::SecurityAssessment => security_assessment(ctx, meta),
                    _ => performance(ctx, meta),
                },
            },
        }
    }
}

enum Age {
    Fresh(i64),
    Stale(i64),
    Future,
}

fn age(now: DateTime<Utc>, at: DateTime<Utc>, max_days: u32) -> Age {
    let elapsed = now.signed_duration_since(at);
    if elapsed < TimeDelta::zero() {
        Age::Future
    } else if elapsed > TimeDelta::days(i64::from(max_days)) {
        Age::Stale(elapsed.num_days())
    } else {
        Age::Fresh(elapsed.num_days())
    }
}

fn risk_assessment(ctx: &CheckContext<'_>, meta: &ModelMetadata) -> CheckOutcome {
    let Some(assessment) = &meta.risk_assessment else {
        return CheckOutcome::fail("no risk assessment on record");
    };
    if !assessment.complete {
        return CheckOutcome::fail("risk assessment is marked incomplete");
    }
    let max = ctx.config.max_risk_assessment_age_days;
    match age(ctx.now, assessment.completed_at, max) {
        Age::Fresh(days) => {
            CheckOutcome::pass(format!("risk assessment is {days} days old (max {max})"))
        }
        Age::Stale(days) => {
            CheckOutcome::fail(format!("risk assessment is {days} days old (max {max})"))
        }
        Age::Future => CheckOutcome::fail("risk assessment is dated in the future"),
    }
}

fn lineage(ctx: &CheckContext<'_>) -> CheckOutcome {
    let LineageEvidence::Verified {
        dataset_id,
        verification,
    } = ctx.lineage
    else {
        return CheckOutcome::fail("no data lineage recorded for this model");
    };
    if let Some(first) = verification.first_break() {
        return CheckOutcome::fail(format!(
            "lineage chain {dataset_id} is broken ({} issues; {first})",
            verification.breaks.len()
        ));
    }
    match &verification.linked_model {
        Some(linked) if linked == ctx.model_id => CheckOutcome::pass(format!(
            "lineage chain {dataset_id} verified: {} records ending in a link to {linked}",
            verification.record_count
        )),
        Some(linked) => CheckOutcome::fail(format!(
            "lineage chain {dataset_id} is linked to {linked}, not {}",
            ctx.model_id
        )),
        None => CheckOutcome::fail(format!(
            "lineage chain {dataset_id} does not end in a model link"
        )),
    }
}

fn bias(ctx: &CheckContext<'_>) -> CheckOutcome {
    let threshold = ctx.config.bias_threshold;
    match ctx.bias {
        BiasEvidence::Measured(value) if value.is_nan() => {
            CheckOutcome::fail("bias metric is not a number")
        }
        BiasEvidence::Measured(value) if value.abs() <= threshold => CheckOutcome::pass(format!(
            "bias deviation {value:.4} within threshold {threshold:.4}"
        )),
        BiasEvidence::Measured(value) => CheckOutcome::fail(format!(
            "bias deviation {value:.4} exceeds threshold {threshold:.4}"
        )),
        BiasEvidence::NotReported => CheckOutcome::fail("no bias metric reported"),
        BiasEvidence::Unavailable(reason) => CheckOutcome::fail(reason.clone()),
    }
}

fn documentation(ctx: &CheckContext<'_>, meta: &ModelMetadata) -> CheckOutcome {
    let Some(card) = &meta.model_card else {
        return CheckOutcome::fail("no model card");
    };
    let missing = card.missing_fields(&ctx.config.required_model_card_fields);
    if missing.is_empty() {
        CheckOutcome::pass(format!(
            "model card documents all {} required fields",
            ctx.config.required_model_card_fields.len()
        ))
    } else {
        CheckOutcome::fail(format!("model card is missing: {}", missing.join(", ")))
    }
}

fn human_oversight(meta: &ModelMetadata) -> CheckOutcome {
    match &meta.human_oversight {
        Some(oversight) if oversight.enabled && !oversight.measures.is_empty() => {
            CheckOutcome::pass(format!(
                "human oversight enabled: {}",
                oversight.measures.join(", ")
            ))
        }
        Some(oversight) if oversight.enabled => {
            CheckOutcome::fail("human oversight enabled without any measures")
        }
        _ => CheckOutcome::fail("human oversight not configured"),
    }
}

fn security_assessment(ctx: &CheckContext<'_>, meta: &ModelMetadata) -> CheckOutcome {
    let Some(assessment) = &meta.security_assessment else {
        return CheckOutcome::fail("no security assessment on record");
    };
    let max = ctx.config.max_security_assessment_age_days;
    let id = &assessment.assessment_id;
    match age(ctx.now, assessment.completed_at, max) {
        Age::Fresh(days) => CheckOutcome::pass(format!(
            "security assessment {id} is {days} days old (max {max})"
        )),
        Age::Stale(days) => CheckOutcome::fail(format!(
            "security assessment {id} is {days} days old (max {max})"
        )),
        Age::Future => {
            CheckOutcome::fail(format!("security assessment {id} is dated in the future"))
        }
    }
}

fn performance(ctx: &CheckContext<'_>, meta: &ModelMetadata) -> CheckOutcome {
    let (min_accuracy, min_f1) = match ctx.risk_level {
        RiskLevel::Minimal => return CheckOutcome::pass("no performance gate at minimal risk"),
        RiskLevel::Limited => (
            ctx.config.min_accuracy_limited_risk,
            ctx.config.min_f1_limited_risk,
        ),
        High | Unacceptable => (ctx.config.min_accuracy_high_risk, ctx.config.min_f1_high_risk),
    };

    let mut problems = Vec::new();
    let mut notes = Vec::new();
    for (label, value, min) in [
        ("accuracy", meta.performance.accuracy, min_accuracy),
        ("f1", meta.performance.f1, min_f1),
    ] {
        match value {
            None => problems.push(format!("{label} not reported")),
            Some(v) if v.is_nan() || v < min => {
                problems.push(format!("{label} {v:.4} below {min:.4}"));
            }
            Some(v) => notes.push(format!("{label} {v:.4} >= {min:.4}")),
        }
    }

    if problems.is_empty() {
        CheckOutcome::pass(notes.join(", "))
    } else {
        CheckOutcome::fail(problems.join(", "))
    }
}

fn tier_permitted(ctx: &CheckContext<'_>) -> CheckOutcome {
    if ctx.risk_level == Unacceptable {
        CheckOutcome::fail("systems in the unacceptable risk tier may not be deployed")
    } else {
        CheckOutcome::pass(format!("{} risk tier is permitted", ctx.risk_level))
    }
}
