//! Atomic file write helpers for exported reports and chain dumps.
//!
//! Uses a temp file + rename pattern so readers never observe a half-written
//! report. Exports are write-once by default: an existing file is left alone
//! and the write fails with `AlreadyExists`.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExistingFile {
    /// Fail if the destination exists.
    #[default]
    Keep,
    /// Replace the destination.
    Replace,
}

#[derive(Debug, Clone, Copy)]
pub struct AtomicWriteOptions {
    pub existing: ExistingFile,
    /// Unix permission bits applied before the rename. Ignored elsewhere.
    pub mode: Option<u32>,
    /// fsync the parent directory after the rename (best-effort).
    pub sync_parent_dir: bool,
}

impl Default for AtomicWriteOptions {
    fn default() -> Self {
        Self {
            existing: ExistingFile::Keep,
            mode: Some(0o640),
            sync_parent_dir: true,
        }
    }
}

/// Write `bytes` to `path` atomically, refusing to overwrite.
pub fn atomic_write(path: impl AsRef<Path>, bytes: &[u8]) -> io::Result<()> {
    atomic_write_with_options(path, bytes, AtomicWriteOptions::default())
}

pub fn atomic_write_with_options(
    path: impl AsRef<Path>,
    bytes: &[u8],
    options: AtomicWriteOptions,
) -> io::Result<()> {
    let path = path.as_ref();
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(parent)?;
    #[cfg(unix)]
    if let Some(mode) = options.mode {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(tmp.path(), fs::Permissions::from_mode(mode))?;
    }

    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;

    match options.existing {
        ExistingFile::Keep => {
            tmp.persist_noclobber(path).map_err(|err| err.error)?;
        }
        ExistingFile::Replace => {
            tmp.persist(path).map_err(|err| err.error)?;
        }
    }

    if options.sync_parent_dir {
        best_effort_sync_parent_dir(parent);
    }
    Ok(())
}

fn best_effort_sync_parent_dir(parent: &Path) {
    // Directory handles can only be fsynced on Unix.
    if cfg!(unix)
        && let Err(e) = File::open(parent).and_then(|d| d.sync_all())
    {
        debug!(path = %parent.display(), "Parent directory sync_all failed (best-effort): {e}");
    }
}
