//! Audit Trail Writer.
//!
//! Append-only: there is no update or delete path. Retried writes of the same
//! logical event (same type, subject and payload hash) are absorbed by the
//! store's uniqueness constraint and come back as [`AuditAppend::Duplicate`].

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use provgate_store::GovernanceStore;
use provgate_types::{AuditAppend, AuditEvent, AuditEventType, ContentHash, Deadline, NewAuditEvent};

use crate::ProvenanceError;

#[derive(Clone)]
pub struct AuditTrail {
    store: Arc<dyn GovernanceStore>,
    actor: String,
}

impl AuditTrail {
    pub fn new(store: Arc<dyn GovernanceStore>, actor: impl Into<String>) -> Self {
        Self {
            store,
            actor: actor.into(),
        }
    }

    #[must_use]
    pub fn actor(&self) -> &str {
        &self.actor
    }

    /// Build an event attributed to this trail's actor.
    #[must_use]
    pub fn event(
        &self,
        event_type: AuditEventType,
        subject: impl Into<String>,
        payload_hash: ContentHash,
        payload: Value,
    ) -> NewAuditEvent {
        NewAuditEvent {
            event_type,
            subject: subject.into(),
            actor: self.actor.clone(),
            payload_hash,
            payload,
        }
    }

    /// Persist `event`. Any failure is an [`ProvenanceError::AuditWrite`].
    pub fn record(
        &self,
        event: NewAuditEvent,
        deadline: Deadline,
    ) -> Result<AuditAppend, ProvenanceError> {
        let subject = event.subject.clone();
        let appended = self
            .store
            .put_audit_event(event, deadline)
            .map_err(|source| ProvenanceError::AuditWrite {
                subject: subject.clone(),
                source,
            })?;

        let stored = appended.event();
        if appended.is_duplicate() {
            warn!(
                seq = stored.seq,
                event_type = %stored.event_type,
                subject = %subject,
                "Audit event already recorded; retry absorbed"
            );
        } else {
            info!(
                seq = stored.seq,
                event_type = %stored.event_type,
                subject = %subject,
                payload_hash = stored.payload_hash.short(),
                "Audit event recorded"
            );
        }
        Ok(appended)
    }

    /// Events in sequence order, optionally for one subject.
    pub fn events(
        &self,
        subject: Option<&str>,
        deadline: Deadline,
    ) -> Result<Vec<AuditEvent>, ProvenanceError> {
        Ok(self.store.list_audit_events(subject, deadline)?)
    }
}
