//! Configuration for provgate.
//!
//! Two layers:
//!
//! - [`GateConfig`]: the thresholds the compliance gate evaluates against. It can
//!   be built from a loose key/value mapping ([`GateConfig::from_map`]) where
//!   unrecognized keys are ignored and missing keys take their defaults.
//! - [`ProvgateConfig`]: the TOML file (`~/.provgate/config.toml`, or
//!   `$PROVGATE_CONFIG`) holding the gate section plus storage, audit and
//!   logging settings for the CLI.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

pub const CONFIG_ENV_VAR: &str = "PROVGATE_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid gate configuration: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => Some(path),
            ConfigError::Malformed(_) | ConfigError::Invalid { .. } => None,
        }
    }
}

// ============================================================================
// Gate thresholds
// ============================================================================

const fn default_bias_threshold() -> f64 {
    0.10
}
const fn default_min_accuracy_high() -> f64 {
    0.85
}
const fn default_min_accuracy_limited() -> f64 {
    0.75
}
const fn default_min_f1_high() -> f64 {
    0.80
}
const fn default_min_f1_limited() -> f64 {
    0.70
}
const fn default_max_risk_assessment_age() -> u32 {
    180
}
const fn default_max_security_assessment_age() -> u32 {
    90
}
fn default_model_card_fields() -> Vec<String> {
    ["intended_use", "limitations", "training_data", "evaluation"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Thresholds for a gate evaluation.
///
/// ```toml
/// [gate]
/// bias_threshold = 0.10
/// min_accuracy_high_risk = 0.85
/// min_accuracy_limited_risk = 0.75
/// min_f1_high_risk = 0.80
/// min_f1_limited_risk = 0.70
/// max_risk_assessment_age_days = 180
/// max_security_assessment_age_days = 90
/// required_model_card_fields = ["intended_use", "limitations", "training_data", "evaluation"]
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GateConfig {
    /// Maximum tolerated bias deviation (e.g. demographic parity difference).
    #[serde(default = "default_bias_threshold")]
    pub bias_threshold: f64,
    #[serde(default = "default_min_accuracy_high")]
    pub min_accuracy_high_risk: f64,
    #[serde(default = "default_min_accuracy_limited")]
    pub min_accuracy_limited_risk: f64,
    #[serde(default = "default_min_f1_high")]
    pub min_f1_high_risk: f64,
    #[serde(default = "default_min_f1_limited")]
    pub min_f1_limited_risk: f64,
    #[serde(default = "default_max_risk_assessment_age")]
    pub max_risk_assessment_age_days: u32,
    #[serde(default = "default_max_security_assessment_age")]
    pub max_security_assessment_age_days: u32,
    #[serde(default = "default_model_card_fields")]
    pub required_model_card_fields: Vec<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            bias_threshold: default_bias_threshold(),
            min_accuracy_high_risk: default_min_accuracy_high(),
            min_accuracy_limited_risk: default_min_accuracy_limited(),
            min_f1_high_risk: default_min_f1_high(),
            min_f1_limited_risk: default_min_f1_limited(),
            max_risk_assessment_age_days: default_max_risk_assessment_age(),
            max_security_assessment_age_days: default_max_security_assessment_age(),
            required_model_card_fields: default_model_card_fields(),
        }
    }
}

impl GateConfig {
    /// Build from a key/value mapping. Unknown keys are ignored.
    pub fn from_map(map: &Map<String, Value>) -> Result<Self, ConfigError> {
        let config: GateConfig =
            serde_json::from_value(Value::Object(map.clone())).map_err(ConfigError::Malformed)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit_interval = [
            ("bias_threshold", self.bias_threshold),
            ("min_accuracy_high_risk", self.min_accuracy_high_risk),
            ("min_accuracy_limited_risk", self.min_accuracy_limited_risk),
            ("min_f1_high_risk", self.min_f1_high_risk),
            ("min_f1_limited_risk", self.min_f1_limited_risk),
        ];
        for (key, value) in unit_interval {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid {
                    key,
                    reason: format!("{value} is outside [0, 1]"),
                });
            }
        }
        if self.max_risk_assessment_age_days == 0 {
            return Err(ConfigError::Invalid {
                key: "max_risk_assessment_age_days",
                reason: "must be at least 1 day".to_string(),
            });
        }
        if self.max_security_assessment_age_days == 0 {
            return Err(ConfigError::Invalid {
                key: "max_security_assessment_age_days",
                reason: "must be at least 1 day".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// File configuration
// ============================================================================

const fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_actor() -> String {
    "provgate".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvgateConfig {
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path. `${VAR}` references are expanded.
    pub path: Option<String>,
    /// How long a writer waits on a locked database.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl StorageConfig {
    /// Configured path, else `~/.provgate/governance.db`, else `./.provgate/governance.db`.
    #[must_use]
    pub fn resolved_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return PathBuf::from(expand_env_vars(path));
        }
        provgate_dir()
            .unwrap_or_else(|| PathBuf::from(".provgate"))
            .join("governance.db")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Recorded as the actor on every audit event this process writes.
    #[serde(default = "default_actor")]
    pub actor: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            actor: default_actor(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub filter: Option<String>,
    /// Append logs here instead of stderr.
    pub file: Option<PathBuf>,
}

impl ProvgateConfig {
    /// Load from the default location. A missing file yields `Ok(None)`.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_path() else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        let config: ProvgateConfig = match toml::from_str(&content) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                return Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };
        config.gate.validate()?;
        Ok(config)
    }
}

fn provgate_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".provgate"))
}

/// `$PROVGATE_CONFIG` if set, else `~/.provgate/config.toml`.
#[must_use]
pub fn config_path() -> Option<PathBuf> {
    if let Ok(path) = env::var(CONFIG_ENV_VAR)
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }
    provgate_dir().map(|dir| dir.join("config.toml"))
}

/// Replace `${VAR}` references with environment values. Unset variables expand to "".
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let var = &after[..end];
                if var.is_empty() {
                    out.push_str("${}");
                } else {
                    out.push_str(&env::var(var).unwrap_or_default());
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
