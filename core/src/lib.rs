//! Provenance tracking and deployment gating.
//!
//! [`LineageTracker`] maintains hash-linked chains of dataset records,
//! [`ComplianceGate`] evaluates a model against regulatory checks, and
//! [`AuditTrail`] records every decision either of them makes.

mod audit;
mod clock;
mod error;
mod gate;
mod profile;
#[cfg(test)]
mod testing;
mod tracker;

pub use audit::AuditTrail;
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::ProvenanceError;
pub use gate::{
    BiasEvidence, CheckContext, CheckOutcome, ComplianceCheck, ComplianceGate, GateDecision,
    LineageEvidence,
};
pub use profile::{MIN_CLASS_SHARE, TARGET_COLUMN, TrackedData, profile_table, shape_delta};
pub use tracker::{LineageTracker, verify_records};
