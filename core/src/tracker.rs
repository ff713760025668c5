//! Lineage Tracker.
//!
//! Each dataset gets one append-only chain: an EXTRACTION root, any number of
//! TRANSFORMATION records, and at most one terminal MODEL_LINK. Every append is
//! a compare-and-set against the head the tracker read, so of two writers racing
//! on the same head exactly one succeeds and the other gets
//! [`ProvenanceError::ConcurrentModification`].
//!
//! Every successful append (and every replay of the current head) writes an
//! audit event whose payload hash is the record's content hash.

use std::sync::Arc;

use tracing::{debug, info, warn};

use provgate_store::GovernanceStore;
use provgate_types::{
    AuditEventType, BreakKind, ChainBreak, ChainVerification, ContentHash, DatasetId, Deadline,
    ExtractionMetadata, LineageRecord, ModelId, ModelLinkMetadata, NewLineageRecord,
    RecordContent, StepMetadata, StepType, TransformationMetadata,
};
use provgate_utils::{HashError, fingerprint, record_hash};

use crate::audit::AuditTrail;
use crate::profile::{TrackedData, profile_table, shape_delta};
use crate::ProvenanceError;

#[derive(Clone)]
pub struct LineageTracker {
    store: Arc<dyn GovernanceStore>,
    audit: AuditTrail,
}

impl LineageTracker {
    pub fn new(store: Arc<dyn GovernanceStore>, audit: AuditTrail) -> Self {
        Self { store, audit }
    }

    /// Start a new chain. Returns the freshly minted dataset id.
    ///
    /// On error the dataset must be treated as untracked.
    pub fn track_extraction<D: TrackedData + ?Sized>(
        &self,
        source: &str,
        query: &str,
        data: &D,
        deadline: Deadline,
    ) -> Result<DatasetId, ProvenanceError> {
        let dataset_id = DatasetId::generate();
        let data_hash = fingerprint(data)?;
        let profile = data.as_table().map(|table| profile_table(&table));
        let metadata = StepMetadata::Extraction(ExtractionMetadata {
            source: source.to_string(),
            query: query.to_string(),
            profile,
        });

        let record = seal(dataset_id.clone(), data_hash, None, metadata)?;
        let stored = self.store.put_lineage_record(record, None, deadline)?;
        info!(
            dataset_id = %stored.dataset_id,
            content_hash = stored.content_hash.short(),
            source,
            "Tracked extraction"
        );
        self.audit_record(&stored, deadline)?;
        Ok(dataset_id)
    }

    /// Append a transformation of `input` into `output` to the chain.
    ///
    /// Re-submitting the step that is already the head returns that head.
    pub fn track_transformation<I, O>(
        &self,
        dataset_id: &DatasetId,
        step_name: &str,
        input: &I,
        output: &O,
        transformation_code: &str,
        deadline: Deadline,
    ) -> Result<LineageRecord, ProvenanceError>
    where
        I: TrackedData + ?Sized,
        O: TrackedData + ?Sized,
    {
        let head = self.require_head(dataset_id, deadline)?;
        if let Some(model_id) = head.metadata.linked_model() {
            return Err(ProvenanceError::AlreadyLinked {
                dataset_id: dataset_id.clone(),
                model_id: model_id.clone(),
            });
        }

        let input_hash = fingerprint(input)?;
        let data_hash = fingerprint(output)?;
        let shape = match (input.as_table(), output.as_table()) {
            (Some(before), Some(after)) => Some(shape_delta(&before, &after)),
            _ => None,
        };
        let metadata = StepMetadata::Transformation(TransformationMetadata {
            step_name: step_name.to_string(),
            transformation_code: transformation_code.to_string(),
            input_hash,
            shape,
        });

        if is_replay_of(&head, &data_hash, &metadata)? {
            return self.replay(head, deadline);
        }
        self.append(head, data_hash, metadata, deadline)
    }

    /// Close the chain with a link to `model_id`. A chain carries one link at most.
    pub fn link_to_model(
        &self,
        dataset_id: &DatasetId,
        model_id: &ModelId,
        training_run_id: Option<&str>,
        deadline: Deadline,
    ) -> Result<LineageRecord, ProvenanceError> {
        let head = self.require_head(dataset_id, deadline)?;
        let data_hash = fingerprint(model_id.as_str())?;
        let metadata = StepMetadata::ModelLink(ModelLinkMetadata {
            model_id: model_id.clone(),
            training_run_id: training_run_id.map(ToString::to_string),
        });

        if let Some(linked) = head.metadata.linked_model() {
            if is_replay_of(&head, &data_hash, &metadata)? {
                return self.replay(head, deadline);
            }
            warn!(
                dataset_id = %dataset_id,
                linked = %linked,
                requested = %model_id,
                "Rejected second model link"
            );
            return Err(ProvenanceError::AlreadyLinked {
                dataset_id: dataset_id.clone(),
                model_id: linked.clone(),
            });
        }
        self.append(head, data_hash, metadata, deadline)
    }

    /// Walk the whole chain and report every integrity break.
    ///
    /// A broken or missing chain is a value with `is_valid() == false`; only
    /// storage faults are errors.
    pub fn verify_chain(
        &self,
        dataset_id: &DatasetId,
        deadline: Deadline,
    ) -> Result<ChainVerification, ProvenanceError> {
        let chain = self.store.get_full_chain(dataset_id, deadline)?;
        let verification = verify_records(dataset_id, &chain)?;
        match verification.first_break() {
            None => debug!(
                dataset_id = %dataset_id,
                records = verification.record_count,
                "Chain verified"
            ),
            Some(first) => warn!(
                dataset_id = %dataset_id,
                breaks = verification.breaks.len(),
                first = %first,
                "Chain integrity check failed"
            ),
        }
        Ok(verification)
    }

    /// The stored chain, root first.
    pub fn chain(
        &self,
        dataset_id: &DatasetId,
        deadline: Deadline,
    ) -> Result<Vec<LineageRecord>, ProvenanceError> {
        let chain = self.store.get_full_chain(dataset_id, deadline)?;
        if chain.is_empty() {
            return Err(ProvenanceError::ChainNotFound(dataset_id.clone()));
        }
        Ok(chain)
    }

    fn require_head(
        &self,
        dataset_id: &DatasetId,
        deadline: Deadline,
    ) -> Result<LineageRecord, ProvenanceError> {
        self.store
            .get_chain_head(dataset_id, deadline)?
            .ok_or_else(|| ProvenanceError::ChainNotFound(dataset_id.clone()))
    }

    fn append(
        &self,
        head: LineageRecord,
        data_hash: ContentHash,
        metadata: StepMetadata,
        deadline: Deadline,
    ) -> Result<LineageRecord, ProvenanceError> {
        let step_type = metadata.step_type();
        let record = seal(
            head.dataset_id.clone(),
            data_hash,
            Some(head.content_hash.clone()),
            metadata,
        )?;
        let stored = match self
            .store
            .put_lineage_record(record, Some(&head.content_hash), deadline)
        {
            Ok(stored) => stored,
            Err(err) => {
                let err = ProvenanceError::from(err);
                if err.is_retriable() {
                    warn!(
                        dataset_id = %head.dataset_id,
                        step = %step_type,
                        "Lost race for chain head"
                    );
                }
                return Err(err);
            }
        };
        info!(
            dataset_id = %stored.dataset_id,
            seq = stored.seq,
            step = %step_type,
            content_hash = stored.content_hash.short(),
            "Extended lineage chain"
        );
        self.audit_record(&stored, deadline)?;
        Ok(stored)
    }

    fn replay(
        &self,
        head: LineageRecord,
        deadline: Deadline,
    ) -> Result<LineageRecord, ProvenanceError> {
        debug!(
            dataset_id = %head.dataset_id,
            seq = head.seq,
            "Step already recorded as chain head"
        );
        self.audit_record(&head, deadline)?;
        Ok(head)
    }

    fn audit_record(
        &self,
        record: &LineageRecord,
        deadline: Deadline,
    ) -> Result<(), ProvenanceError> {
        let event_type = match record.step_type {
            StepType::Extraction => AuditEventType::LineageExtraction,
            StepType::Transformation => AuditEventType::LineageTransformation,
            StepType::ModelLink => AuditEventType::LineageModelLink,
        };
        let payload = serde_json::to_value(record).map_err(HashError::from)?;
        let event = self.audit.event(
            event_type,
            record.dataset_id.as_str(),
            record.content_hash.clone(),
            payload,
        );
        self.audit.record(event, deadline)?;
        Ok(())
    }
}

fn seal(
    dataset_id: DatasetId,
    data_hash: ContentHash,
    parent_hash: Option<ContentHash>,
    metadata: StepMetadata,
) -> Result<NewLineageRecord, ProvenanceError> {
    let content_hash = record_hash(&RecordContent {
        dataset_id: &dataset_id,
        step_type: metadata.step_type(),
        data_hash: &data_hash,
        parent_hash: parent_hash.as_ref(),
        metadata: &metadata,
    })?;
    Ok(NewLineageRecord {
        dataset_id,
        data_hash,
        content_hash,
        parent_hash,
        metadata,
    })
}

/// True when `head` is exactly the step described, sealed on the same parent.
fn is_replay_of(
    head: &LineageRecord,
    data_hash: &ContentHash,
    metadata: &StepMetadata,
) -> Result<bool, ProvenanceError> {
    if head.is_root() || head.step_type != metadata.step_type() {
        return Ok(false);
    }
    let candidate = record_hash(&RecordContent {
        dataset_id: &head.dataset_id,
        step_type: metadata.step_type(),
        data_hash,
        parent_hash: head.parent_hash.as_ref(),
        metadata,
    })?;
    Ok(candidate == head.content_hash)
}

/// Check a chain as returned by the store, root first.
pub fn verify_records(
    dataset_id: &DatasetId,
    records: &[LineageRecord],
) -> Result<ChainVerification, ProvenanceError> {
    let mut breaks = Vec::new();
    let mut flag = |index: usize, kind: BreakKind| breaks.push(ChainBreak { index, kind });

    if records.is_empty() {
        flag(0, BreakKind::EmptyChain);
    }

    let last = records.len().saturating_sub(1);
    let mut previous: Option<&LineageRecord> = None;
    for (index, record) in records.iter().enumerate() {
        if &record.dataset_id != dataset_id {
            flag(
                index,
                BreakKind::ForeignRecord {
                    dataset_id: record.dataset_id.clone(),
                },
            );
        }
        if record.seq != index as u64 {
            flag(
                index,
                BreakKind::SequenceGap {
                    expected: index as u64,
                    found: record.seq,
                },
            );
        }
        if record.step_type != record.metadata.step_type() {
            flag(
                index,
                BreakKind::StepTypeMismatch {
                    declared: record.step_type,
                    metadata: record.metadata.step_type(),
                },
            );
        }

        let recomputed = record_hash(&record.content())?;
        if recomputed != record.content_hash {
            flag(
                index,
                BreakKind::ContentHashMismatch {
                    stored: record.content_hash.clone(),
                    recomputed,
                },
            );
        }

        let expected_parent = previous.map(|p| &p.content_hash);
        if record.parent_hash.as_ref() != expected_parent {
            flag(
                index,
                BreakKind::ParentMismatch {
                    expected: expected_parent.cloned(),
                    found: record.parent_hash.clone(),
                },
            );
        }

        match (index, record.step_type) {
            (0, StepType::Extraction) => {}
            (0, found) => flag(0, BreakKind::RootNotExtraction { found }),
            (_, StepType::Extraction) => flag(index, BreakKind::MisplacedExtraction),
            (i, StepType::ModelLink) if i != last => flag(index, BreakKind::ModelLinkNotTerminal),
            _ => {}
        }

        if let Some(prev) = previous
            && record.recorded_at < prev.recorded_at
        {
            flag(index, BreakKind::TimestampRegression);
        }
        previous = Some(record);
    }

    Ok(ChainVerification {
        dataset_id: dataset_id.clone(),
        record_count: records.len(),
        breaks,
        linked_model: records
            .last()
            .and_then(|head| head.metadata.linked_model().cloned()),
    })
}
