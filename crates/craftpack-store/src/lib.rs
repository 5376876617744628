//! Work-directory storage for craftpack.
//!
//! This crate owns everything the lifecycle writes to disk: the `WorkLayout`
//! of per-part source/install areas and the shared stage and prime trees,
//! the `StateStore` holding per-part lifecycle state with embedded blake3
//! checksums, content fingerprints, byte-exact copy operations, and the
//! deterministic archive builder.

pub mod archive;
pub mod fingerprint;
pub mod fsops;
pub mod layout;
pub mod state;
pub mod tree;

pub use archive::{build_archive, ArchiveFormat};
pub use fingerprint::{tree_digest, tree_digest_excluding, Fingerprint};
pub use fsops::{copy_entry, copy_into, copy_tree, remove_path, reset_dir};
pub use layout::{WorkLayout, WORK_FORMAT_VERSION};
pub use state::{LifecycleState, PartState, StateStore, StepFingerprints, TreeLedger, TreeState};
pub use tree::{collect_tree, collect_tree_excluding, EntryKind, TreeEntry};

use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Fsync a directory so a preceding `rename()` survives a crash.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

/// Write `content` to `dest` via a temp file in the same directory,
/// then rename and fsync the directory.
pub(crate) fn write_atomic(dest: &Path, content: &[u8]) -> Result<(), StoreError> {
    let dir = dest
        .parent()
        .ok_or_else(|| StoreError::Io(std::io::Error::other("destination has no parent")))?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(io_at(dir))?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest)
        .map_err(|e| StoreError::IoAt {
            path: dest.to_path_buf(),
            source: e.error,
        })?;
    fsync_dir(dir)?;
    Ok(())
}

/// Attach a path to an I/O error.
pub fn io_at(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::IoAt {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("work directory I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("I/O error on '{}': {source}", path.display())]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("integrity check failed for '{name}': expected {expected}, got {actual}")]
    IntegrityFailure {
        name: String,
        expected: String,
        actual: String,
    },
    #[error("lock acquisition failed: {0}")]
    LockFailed(String),
    #[error("work directory format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("failed to write archive '{}': {message}", path.display())]
    Archive { path: PathBuf, message: String },
    #[error("cannot place '{entry}': '{}' is not a directory", path.display())]
    PathConflict { path: PathBuf, entry: String },
}

impl StoreError {
    /// The filesystem path the error is about, when known.
    pub fn path(&self) -> Option<&Path> {
        match self {
            StoreError::IoAt { path, .. }
            | StoreError::Archive { path, .. }
            | StoreError::PathConflict { path, .. } => Some(path),
            _ => None,
        }
    }
}
