use crate::StoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Current work-directory format version. Incremented on incompatible layout changes.
pub const WORK_FORMAT_VERSION: u32 = 1;
const VERSION_FILE: &str = "version";

/// Directory layout of a craftpack work directory.
///
/// ```text
/// <root>/
///   version
///   .lock
///   parts/<part>/src       pulled sources
///   parts/<part>/install   build output
///   stage/                 shared staged tree
///   prime/                 shared primed tree
///   state/                 per-part lifecycle state
///   targets/<tag>/         nested layout per build target
/// ```
///
/// Directories are created on [`initialize`](Self::initialize).
#[derive(Debug, Clone)]
pub struct WorkLayout {
    root: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct WorkVersion {
    format_version: u32,
}

impl WorkLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn parts_dir(&self) -> PathBuf {
        self.root.join("parts")
    }

    #[inline]
    pub fn part_dir(&self, part: &str) -> PathBuf {
        self.parts_dir().join(part)
    }

    #[inline]
    pub fn part_src_dir(&self, part: &str) -> PathBuf {
        self.part_dir(part).join("src")
    }

    #[inline]
    pub fn part_install_dir(&self, part: &str) -> PathBuf {
        self.part_dir(part).join("install")
    }

    #[inline]
    pub fn stage_dir(&self) -> PathBuf {
        self.root.join("stage")
    }

    #[inline]
    pub fn prime_dir(&self) -> PathBuf {
        self.root.join("prime")
    }

    #[inline]
    pub fn state_dir(&self) -> PathBuf {
        self.root.join("state")
    }

    #[inline]
    pub fn lock_file(&self) -> PathBuf {
        self.root.join(".lock")
    }

    /// Layout for one build target, nested under `targets/<tag>`.
    pub fn target(&self, tag: &str) -> WorkLayout {
        WorkLayout::new(self.root.join("targets").join(tag))
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(self.parts_dir())?;
        fs::create_dir_all(self.stage_dir())?;
        fs::create_dir_all(self.prime_dir())?;
        fs::create_dir_all(self.state_dir())?;

        let version_path = self.root.join(VERSION_FILE);
        if version_path.exists() {
            self.verify_version()?;
        } else {
            let ver = WorkVersion {
                format_version: WORK_FORMAT_VERSION,
            };
            let content = serde_json::to_string_pretty(&ver)?;
            crate::write_atomic(&version_path, content.as_bytes())?;
        }

        Ok(())
    }

    pub fn verify_version(&self) -> Result<(), StoreError> {
        let version_path = self.root.join(VERSION_FILE);
        let content = fs::read_to_string(&version_path).map_err(crate::io_at(&version_path))?;
        let ver: WorkVersion = serde_json::from_str(&content)?;

        if ver.format_version != WORK_FORMAT_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: WORK_FORMAT_VERSION,
                found: ver.format_version,
            });
        }
        Ok(())
    }
}
