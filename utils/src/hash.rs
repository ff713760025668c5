//! Deterministic content fingerprinting.
//!
//! Values are rendered as canonical JSON (object keys sorted by byte order, no
//! insignificant whitespace, serde_json's shortest round-trip number form) and
//! hashed with SHA-256. Key ordering is done here rather than relying on
//! serde_json's map type, so enabling `preserve_order` anywhere in the
//! dependency graph cannot change a fingerprint.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

use provgate_types::{ContentHash, RecordContent};

/// Domain tag mixed into record hashes so a record hash can never collide
/// with a plain data fingerprint of the same bytes.
const RECORD_TAG: &[u8] = b"provgate/lineage-record/v1\n";

#[derive(Debug, Error)]
#[error("value cannot be fingerprinted: {0}")]
pub struct HashError(#[from] serde_json::Error);

/// Fingerprint raw bytes.
#[must_use]
pub fn fingerprint_bytes(bytes: &[u8]) -> ContentHash {
    ContentHash::from_digest(Sha256::digest(bytes).into())
}

/// Fingerprint any serializable value through its canonical JSON form.
pub fn fingerprint<T: Serialize + ?Sized>(value: &T) -> Result<ContentHash, HashError> {
    let canonical = canonical_json(value)?;
    Ok(fingerprint_bytes(canonical.as_bytes()))
}

/// Hash of the content-bearing fields of a lineage record.
pub fn record_hash(content: &RecordContent<'_>) -> Result<ContentHash, HashError> {
    let canonical = canonical_json(content)?;
    let mut hasher = Sha256::new();
    hasher.update(RECORD_TAG);
    hasher.update(canonical.as_bytes());
    Ok(ContentHash::from_digest(hasher.finalize().into()))
}

/// Render a value as canonical JSON.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String, HashError> {
    let value = serde_json::to_value(value)?;
    let mut out = String::new();
    write_canonical(&value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut String) -> Result<(), HashError> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => out.push_str(&serde_json::to_string(s)?),
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
            out.push('{');
            for (idx, (key, item)) in entries.into_iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_canonical(item, out)?;
            }
            out.push('}');
        }
    }
    Ok(())
}
