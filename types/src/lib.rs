//! Core domain types for provgate.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer: the stores persist these types, the
//! core builds and evaluates them, and the CLI renders them.

mod audit;
mod deadline;
mod ids;
mod lineage;
mod model;
mod report;
mod risk;
mod table;

// ============================================================================
// Identifiers
// ============================================================================

pub use ids::{ContentHash, DatasetId, IdError, ModelId};

// ============================================================================
// Lineage
// ============================================================================

pub use lineage::{
    BreakKind, ChainBreak, ChainVerification, ExtractionMetadata, LineageRecord,
    ModelLinkMetadata, NewLineageRecord, RecordContent, ShapeDelta, StepMetadata, StepType,
    TransformationMetadata, UnknownStepType,
};
pub use table::{DataProfile, Representativeness, Table, TableError};

// ============================================================================
// Compliance
// ============================================================================

pub use model::{
    AttributeBias, ModelCard, ModelMetadata, OversightConfig, PerformanceMetrics,
    RiskAssessment, SecurityAssessment,
};
pub use report::{CheckResult, ComplianceReport};
pub use risk::{RiskLevel, RiskLevelParseError};

// ============================================================================
// Audit & operation control
// ============================================================================

pub use audit::{AuditAppend, AuditEvent, AuditEventType, NewAuditEvent, UnknownEventType};
pub use deadline::{Deadline, DeadlineExceeded};
