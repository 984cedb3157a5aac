//! Advisory lock that keeps two reconciliation passes from racing on the
//! same nuvu directory.
//!
//! The lock file is never deleted; holding the OS lock on it is what counts.
//! Its contents (JSON) only describe the current holder for diagnostics.

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Who holds the lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockMetadata {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

impl LockMetadata {
    pub fn current() -> Self {
        Self {
            pid: std::process::id(),
            started_at: Utc::now(),
        }
    }
}

impl std::fmt::Display for LockMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pid {} since {}", self.pid, self.started_at.to_rfc3339())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("another reconciliation pass is running ({})", holder_text(.0))]
    Held(Option<LockMetadata>),

    #[error("lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn holder_text(holder: &Option<LockMetadata>) -> String {
    holder
        .as_ref()
        .map_or_else(|| "holder unknown".to_string(), ToString::to_string)
}

/// Exclusive hold on `reconcile.lock`, released on drop.
#[derive(Debug)]
pub struct PassLock {
    file: File,
    path: PathBuf,
}

impl PassLock {
    /// Take the lock without waiting.
    pub fn try_acquire(path: &Path) -> Result<Self, LockError> {
        let io_err = |source| LockError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(io_err)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(io_err)?;

        if let Err(e) = file.try_lock_exclusive() {
            if is_contended(&e) {
                return Err(LockError::Held(read_metadata(&mut file)));
            }
            return Err(io_err(e));
        }

        let json = serde_json::to_string(&LockMetadata::current())
            .map_err(|e| io_err(std::io::Error::other(e)))?;
        file.set_len(0)
            .and_then(|()| file.seek(SeekFrom::Start(0)).map(|_| ()))
            .and_then(|()| file.write_all(json.as_bytes()))
            .and_then(|()| file.sync_all())
            .map_err(io_err)?;

        log::debug!("Acquired {}", path.display());
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PassLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            log::warn!("Failed to release {}: {e}", self.path.display());
        }
    }
}

/// Whether a failed `try_lock_*` means someone else holds the lock, as
/// opposed to the filesystem not supporting locks at all.
fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::WouldBlock
        || (err.raw_os_error().is_some()
            && err.raw_os_error() == fs2::lock_contended_error().raw_os_error())
}

fn read_metadata(file: &mut File) -> Option<LockMetadata> {
    let mut content = String::new();
    file.read_to_string(&mut content).ok()?;
    serde_json::from_str(&content).ok()
}

/// The current holder, if the lock is taken.
pub fn holder(path: &Path) -> Option<LockMetadata> {
    match PassLock::try_acquire(path) {
        Err(LockError::Held(meta)) => meta,
        _ => None,
    }
}
