//! Model registry metadata consumed by the compliance gate.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{DatasetId, ModelId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub completed_at: DateTime<Utc>,
    /// An assessment without an explicit flag counts as incomplete.
    #[serde(default)]
    pub complete: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCard {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl ModelCard {
    /// Required fields that are absent or blank.
    #[must_use]
    pub fn missing_fields<'a>(&self, required: &'a [String]) -> Vec<&'a str> {
        required
            .iter()
            .filter(|name| {
                self.fields
                    .get(name.as_str())
                    .is_none_or(|value| value.trim().is_empty())
            })
            .map(String::as_str)
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OversightConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub measures: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityAssessment {
    pub assessment_id: String,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default, alias = "f1_score")]
    pub f1: Option<f64>,
}

/// Fairness results for one protected attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeBias {
    #[serde(default)]
    pub demographic_parity_difference: Option<f64>,
    #[serde(default)]
    pub disparate_impact: Option<f64>,
}

impl AttributeBias {
    #[must_use]
    pub fn deviation(&self) -> Option<f64> {
        self.demographic_parity_difference.or(self.disparate_impact)
    }
}

/// Everything the registry knows about a model that the gate looks at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_id: ModelId,
    #[serde(default)]
    pub data_lineage_id: Option<DatasetId>,
    #[serde(default)]
    pub risk_assessment: Option<RiskAssessment>,
    #[serde(default)]
    pub model_card: Option<ModelCard>,
    #[serde(default)]
    pub human_oversight: Option<OversightConfig>,
    #[serde(default)]
    pub security_assessment: Option<SecurityAssessment>,
    #[serde(default)]
    pub performance: PerformanceMetrics,
    #[serde(default)]
    pub bias_assessment: BTreeMap<String, AttributeBias>,
}

impl ModelMetadata {
    #[must_use]
    pub fn new(model_id: ModelId) -> Self {
        Self {
            model_id,
            data_lineage_id: None,
            risk_assessment: None,
            model_card: None,
            human_oversight: None,
            security_assessment: None,
            performance: PerformanceMetrics::default(),
            bias_assessment: BTreeMap::new(),
        }
    }

    /// Attribute with the largest absolute deviation, with its signed value.
    #[must_use]
    pub fn worst_bias(&self) -> Option<(&str, f64)> {
        self.bias_assessment
            .iter()
            .filter_map(|(attr, bias)| bias.deviation().map(|d| (attr.as_str(), d)))
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
    }
}
