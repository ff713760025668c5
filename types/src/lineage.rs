//! Lineage records and chain verification results.
//!
//! A lineage chain is an append-only sequence of [`LineageRecord`]s sharing a
//! [`DatasetId`]. Each record points at its predecessor through `parent_hash`,
//! which must equal the predecessor's `content_hash`. The root is always an
//! EXTRACTION record with no parent; a MODEL_LINK, when present, is terminal.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ContentHash, DatasetId, ModelId};
use crate::table::DataProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepType {
    Extraction,
    Transformation,
    ModelLink,
}

impl StepType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            StepType::Extraction => "EXTRACTION",
            StepType::Transformation => "TRANSFORMATION",
            StepType::ModelLink => "MODEL_LINK",
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown step type: {0}")]
pub struct UnknownStepType(pub String);

impl FromStr for StepType {
    type Err = UnknownStepType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EXTRACTION" => Ok(StepType::Extraction),
            "TRANSFORMATION" => Ok(StepType::Transformation),
            "MODEL_LINK" => Ok(StepType::ModelLink),
            other => Err(UnknownStepType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionMetadata {
    pub source: String,
    pub query: String,
    /// Present when the extracted data was tabular.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<DataProfile>,
}

/// Row/column movement across one transformation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeDelta {
    pub rows_before: u64,
    pub rows_after: u64,
    /// Negative when the step added rows.
    pub rows_removed: i64,
    pub columns_added: Vec<String>,
    pub columns_removed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationMetadata {
    pub step_name: String,
    pub transformation_code: String,
    /// Fingerprint of the data the step consumed.
    pub input_hash: ContentHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<ShapeDelta>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelLinkMetadata {
    pub model_id: ModelId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_run_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepMetadata {
    Extraction(ExtractionMetadata),
    Transformation(TransformationMetadata),
    ModelLink(ModelLinkMetadata),
}

impl StepMetadata {
    #[must_use]
    pub const fn step_type(&self) -> StepType {
        match self {
            StepMetadata::Extraction(_) => StepType::Extraction,
            StepMetadata::Transformation(_) => StepType::Transformation,
            StepMetadata::ModelLink(_) => StepType::ModelLink,
        }
    }

    #[must_use]
    pub fn linked_model(&self) -> Option<&ModelId> {
        match self {
            StepMetadata::ModelLink(link) => Some(&link.model_id),
            _ => None,
        }
    }
}

/// The portion of a record covered by its `content_hash`.
///
/// Sequence numbers and timestamps are store-assigned and deliberately absent,
/// so two logically identical steps hash identically.
#[derive(Debug, Serialize)]
pub struct RecordContent<'a> {
    pub dataset_id: &'a DatasetId,
    pub step_type: StepType,
    pub data_hash: &'a ContentHash,
    pub parent_hash: Option<&'a ContentHash>,
    pub metadata: &'a StepMetadata,
}

/// A sealed record that has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLineageRecord {
    pub dataset_id: DatasetId,
    pub data_hash: ContentHash,
    pub content_hash: ContentHash,
    pub parent_hash: Option<ContentHash>,
    pub metadata: StepMetadata,
}

impl NewLineageRecord {
    #[must_use]
    pub fn step_type(&self) -> StepType {
        self.metadata.step_type()
    }

    /// Attach the store-assigned position and time.
    #[must_use]
    pub fn into_record(self, seq: u64, recorded_at: DateTime<Utc>) -> LineageRecord {
        LineageRecord {
            seq,
            dataset_id: self.dataset_id,
            step_type: self.metadata.step_type(),
            data_hash: self.data_hash,
            content_hash: self.content_hash,
            parent_hash: self.parent_hash,
            metadata: self.metadata,
            recorded_at,
        }
    }
}

/// One persisted node in a provenance chain. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageRecord {
    /// Zero-based position in the chain; the root is 0.
    pub seq: u64,
    pub dataset_id: DatasetId,
    pub step_type: StepType,
    /// Fingerprint of the step's output data (or of the model id for MODEL_LINK).
    pub data_hash: ContentHash,
    pub content_hash: ContentHash,
    /// `None` only for the EXTRACTION root.
    pub parent_hash: Option<ContentHash>,
    pub metadata: StepMetadata,
    pub recorded_at: DateTime<Utc>,
}

impl LineageRecord {
    #[must_use]
    pub fn content(&self) -> RecordContent<'_> {
        RecordContent {
            dataset_id: &self.dataset_id,
            step_type: self.step_type,
            data_hash: &self.data_hash,
            parent_hash: self.parent_hash.as_ref(),
            metadata: &self.metadata,
        }
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_hash.is_none()
    }
}

impl NewLineageRecord {
    #[must_use]
    pub fn content(&self) -> RecordContent<'_> {
        RecordContent {
            dataset_id: &self.dataset_id,
            step_type: self.metadata.step_type(),
            data_hash: &self.data_hash,
            parent_hash: self.parent_hash.as_ref(),
            metadata: &self.metadata,
        }
    }
}

// ============================================================================
// Chain verification
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BreakKind {
    /// The store returned no records for the dataset.
    EmptyChain,
    /// Recomputing the record's content hash does not reproduce the stored one.
    ContentHashMismatch {
        stored: ContentHash,
        recomputed: ContentHash,
    },
    /// `parent_hash` does not equal the predecessor's `content_hash`.
    ParentMismatch {
        expected: Option<ContentHash>,
        found: Option<ContentHash>,
    },
    RootNotExtraction { found: StepType },
    MisplacedExtraction,
    ModelLinkNotTerminal,
    StepTypeMismatch {
        declared: StepType,
        metadata: StepType,
    },
    ForeignRecord { dataset_id: DatasetId },
    SequenceGap { expected: u64, found: u64 },
    TimestampRegression,
}

impl fmt::Display for BreakKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakKind::EmptyChain => f.write_str("chain has no records"),
            BreakKind::ContentHashMismatch { stored, recomputed } => write!(
                f,
                "content hash {} does not match recomputed {}",
                stored.short(),
                recomputed.short()
            ),
            BreakKind::ParentMismatch { expected, found } => write!(
                f,
                "parent hash {} does not match predecessor {}",
                found.as_ref().map_or("<empty>", ContentHash::short),
                expected.as_ref().map_or("<empty>", ContentHash::short),
            ),
            BreakKind::RootNotExtraction { found } => {
                write!(f, "chain root is {found}, expected EXTRACTION")
            }
            BreakKind::MisplacedExtraction => f.write_str("EXTRACTION record after the root"),
            BreakKind::ModelLinkNotTerminal => {
                f.write_str("MODEL_LINK record is not the chain head")
            }
            BreakKind::StepTypeMismatch { declared, metadata } => write!(
                f,
                "step type {declared} disagrees with {metadata} metadata"
            ),
            BreakKind::ForeignRecord { dataset_id } => {
                write!(f, "record belongs to dataset {dataset_id}")
            }
            BreakKind::SequenceGap { expected, found } => {
                write!(f, "sequence {found} where {expected} was expected")
            }
            BreakKind::TimestampRegression => {
                f.write_str("recorded_at is earlier than the predecessor's")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainBreak {
    /// Index of the offending record, counted from the root.
    pub index: usize,
    #[serde(flatten)]
    pub kind: BreakKind,
}

impl fmt::Display for ChainBreak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record {}: {}", self.index, self.kind)
    }
}

/// Outcome of walking a chain. A broken chain is a value, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainVerification {
    pub dataset_id: DatasetId,
    pub record_count: usize,
    /// Sorted by index, root first.
    pub breaks: Vec<ChainBreak>,
    /// Model linked by the terminal MODEL_LINK, when the chain ends in one.
    pub linked_model: Option<ModelId>,
}

impl ChainVerification {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.breaks.is_empty()
    }

    #[must_use]
    pub fn first_break(&self) -> Option<&ChainBreak> {
        self.breaks.first()
    }

    /// Indices of records involved in at least one break, deduplicated.
    #[must_use]
    pub fn broken_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.breaks.iter().map(|b| b.index).collect();
        indices.dedup();
        indices
    }
}
