//! Shared infrastructure utilities for provgate.
//!
//! This crate provides cross-cutting utilities that several provgate crates need
//! but that don't belong in the domain-pure `provgate-types` crate:
//!
//! - **`hash`**: Deterministic content fingerprinting (canonical JSON + SHA-256)
//! - **`atomic_write`**: Crash-safe, write-once file export (temp + rename)

pub mod atomic_write;
pub mod hash;

pub use atomic_write::{AtomicWriteOptions, ExistingFile, atomic_write, atomic_write_with_options};
pub use hash::{HashError, canonical_json, fingerprint, fingerprint_bytes, record_hash};
