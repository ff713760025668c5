use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::ContentHash;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditEventType {
    #[serde(rename = "lineage.extraction")]
    LineageExtraction,
    #[serde(rename = "lineage.transformation")]
    LineageTransformation,
    #[serde(rename = "lineage.model_link")]
    LineageModelLink,
    #[serde(rename = "gate.decision")]
    GateDecision,
}

impl AuditEventType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            AuditEventType::LineageExtraction => "lineage.extraction",
            AuditEventType::LineageTransformation => "lineage.transformation",
            AuditEventType::LineageModelLink => "lineage.model_link",
            AuditEventType::GateDecision => "gate.decision",
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown audit event type: {0}")]
pub struct UnknownEventType(pub String);

impl FromStr for AuditEventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lineage.extraction" => Ok(AuditEventType::LineageExtraction),
            "lineage.transformation" => Ok(AuditEventType::LineageTransformation),
            "lineage.model_link" => Ok(AuditEventType::LineageModelLink),
            "gate.decision" => Ok(AuditEventType::GateDecision),
            other => Err(UnknownEventType(other.to_string())),
        }
    }
}

/// An audit event before the store assigns its sequence number and time.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEvent {
    pub event_type: AuditEventType,
    /// Dataset id for lineage events, model id for gate decisions.
    pub subject: String,
    pub actor: String,
    pub payload_hash: ContentHash,
    pub payload: Value,
}

impl NewAuditEvent {
    /// The uniqueness key that makes retried writes no-ops.
    #[must_use]
    pub fn idempotency_key(&self) -> (AuditEventType, &str, &ContentHash) {
        (self.event_type, &self.subject, &self.payload_hash)
    }

    #[must_use]
    pub fn into_event(self, seq: u64, recorded_at: DateTime<Utc>) -> AuditEvent {
        AuditEvent {
            seq,
            event_type: self.event_type,
            subject: self.subject,
            actor: self.actor,
            payload_hash: self.payload_hash,
            payload: self.payload,
            recorded_at,
        }
    }
}

/// Immutable, append-only evidence of a lineage write or gate decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Store-assigned, strictly increasing.
    pub seq: u64,
    pub event_type: AuditEventType,
    pub subject: String,
    pub actor: String,
    pub payload_hash: ContentHash,
    pub payload: Value,
    pub recorded_at: DateTime<Utc>,
}

/// What an audit append did.
#[derive(Debug, Clone, PartialEq)]
pub enum AuditAppend {
    Inserted(AuditEvent),
    /// An event with the same key already existed; nothing was written.
    Duplicate(AuditEvent),
}

impl AuditAppend {
    #[must_use]
    pub fn event(&self) -> &AuditEvent {
        match self {
            AuditAppend::Inserted(event) | AuditAppend::Duplicate(event) => event,
        }
    }

    #[must_use]
    pub fn into_event(self) -> AuditEvent {
        match self {
            AuditAppend::Inserted(event) | AuditAppend::Duplicate(event) => event,
        }
    }

    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, AuditAppend::Duplicate(_))
    }
}
