//! Owner-only permissions for the governance database and its directory.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use crate::StoreError;

fn io_error(action: &str, path: &Path, err: &io::Error) -> StoreError {
    StoreError::Backend(format!("{action} {}: {err}", path.display()))
}

fn ensure_secure_dir(path: &Path) -> Result<(), StoreError> {
    fs::create_dir_all(path).map_err(|e| io_error("failed to create directory", path, &e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::{MetadataExt, PermissionsExt};

        let metadata = fs::metadata(path)
            .map_err(|e| io_error("failed to read directory metadata", path, &e))?;

        // Shared directories (e.g. /tmp) belong to someone else; leave them alone.
        let our_uid = unsafe { libc::getuid() };
        if metadata.uid() != our_uid {
            return Ok(());
        }

        let current_mode = metadata.permissions().mode() & 0o777;
        if current_mode & 0o077 != 0 {
            fs::set_permissions(path, fs::Permissions::from_mode(0o700))
                .map_err(|e| io_error("failed to set directory permissions", path, &e))?;
        }
    }
    Ok(())
}

fn ensure_secure_db_files(path: &Path) -> Result<(), StoreError> {
    if !path.exists() {
        let mut options = OpenOptions::new();
        options.create(true).truncate(false).read(true).write(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        options
            .open(path)
            .map_err(|e| io_error("failed to create database file", path, &e))?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .map_err(|e| io_error("failed to set database permissions", path, &e))?;
        for suffix in ["-wal", "-shm"] {
            let sidecar = sqlite_sidecar_path(path, suffix);
            if sidecar.exists() {
                let _ = fs::set_permissions(&sidecar, fs::Permissions::from_mode(0o600));
            }
        }
    }

    Ok(())
}

/// Create the database file and its parent directory with owner-only access.
pub(crate) fn prepare_db_path(path: &Path) -> Result<(), StoreError> {
    if path.is_dir() {
        return Err(StoreError::Backend(format!(
            "database path {} is a directory",
            path.display()
        )));
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        ensure_secure_dir(parent)?;
    }
    ensure_secure_db_files(path)
}

#[cfg_attr(not(unix), allow(dead_code))]
fn sqlite_sidecar_path(path: &Path, suffix: &str) -> PathBuf {
    let file_name = path.file_name().map(|name| name.to_string_lossy());
    match file_name {
        Some(name) => path.with_file_name(format!("{name}{suffix}")),
        None => PathBuf::from(format!("{}{suffix}", path.display())),
    }
}
