use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ModelId;
use crate::risk::RiskLevel;

/// Result of one compliance check within a gate evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub description: String,
    /// Whether failure blocks deployment at the evaluated risk level.
    pub required: bool,
    pub passed: bool,
    pub detail: String,
}

impl CheckResult {
    #[must_use]
    pub fn is_blocking_failure(&self) -> bool {
        self.required && !self.passed
    }
}

/// Write-once output of a gate evaluation.
///
/// Built only through [`ComplianceReport::new`], which derives `failures` and
/// `can_deploy` from the check list so the two can never disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub model_id: ModelId,
    pub risk_level: RiskLevel,
    pub timestamp: DateTime<Utc>,
    /// In evaluation order.
    pub checks: Vec<CheckResult>,
    pub can_deploy: bool,
    /// Names of required checks that failed, in evaluation order.
    pub failures: Vec<String>,
}

impl ComplianceReport {
    #[must_use]
    pub fn new(
        model_id: ModelId,
        risk_level: RiskLevel,
        timestamp: DateTime<Utc>,
        checks: Vec<CheckResult>,
    ) -> Self {
        let failures: Vec<String> = checks
            .iter()
            .filter(|c| c.is_blocking_failure())
            .map(|c| c.name.clone())
            .collect();
        Self {
            model_id,
            risk_level,
            timestamp,
            can_deploy: failures.is_empty(),
            checks,
            failures,
        }
    }

    #[must_use]
    pub fn checks_run(&self) -> usize {
        self.checks.len()
    }

    #[must_use]
    pub fn check(&self, name: &str) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.name == name)
    }

    pub fn passed(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| c.passed)
    }

    /// Failed checks that are advisory at this risk level.
    pub fn warnings(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| !c.passed && !c.required)
    }
}
