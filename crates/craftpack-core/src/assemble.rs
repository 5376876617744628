//! Final checks and archiving of the primed tree.

use crate::CoreError;
use chrono::{DateTime, Utc};
use craftpack_schema::BaseConfig;
use craftpack_store::{build_archive, io_at, remove_path, ArchiveFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the metadata file written at the root of every archive.
pub const MANIFEST_FILE: &str = "manifest.yaml";

/// Build metadata embedded in the archive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct Manifest {
    pub craftpack_version: String,
    pub craftpack_started_at: String,
    pub architecture: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bases: Option<Vec<ManifestBase>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestBase {
    pub name: String,
    pub channel: String,
    pub architectures: Vec<String>,
}

impl Manifest {
    pub fn new(started_at: DateTime<Utc>, architecture: &str) -> Self {
        Self {
            craftpack_version: env!("CARGO_PKG_VERSION").to_owned(),
            craftpack_started_at: started_at.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
            architecture: architecture.to_owned(),
            bases: None,
        }
    }

    /// Record the base this archive was built for.
    #[must_use]
    pub fn with_base(mut self, base: &BaseConfig, arch: &str) -> Self {
        self.bases = Some(vec![ManifestBase {
            name: base.name.clone(),
            channel: base.channel.clone(),
            architectures: vec![arch.to_owned()],
        }]);
        self
    }
}

/// Fail on the first file in `mandatory` that does not exist under `root`.
pub fn check_mandatory_files(root: &Path, mandatory: &[&str]) -> Result<(), CoreError> {
    for file in mandatory {
        let path = root.join(file);
        if fs::symlink_metadata(&path).is_err() {
            return Err(CoreError::MissingMandatoryFile(path));
        }
    }
    Ok(())
}

/// Verify the primed tree, write the manifest into it and pack it.
///
/// The manifest lives in the prime tree only while the archive is written.
/// Whatever a part primed as `manifest.yaml` (file or symlink) is moved aside
/// untouched and put back afterwards.
pub fn assemble(
    prime_root: &Path,
    mandatory: &[&str],
    manifest: &Manifest,
    format: ArchiveFormat,
    output: &Path,
) -> Result<PathBuf, CoreError> {
    check_mandatory_files(prime_root, mandatory)?;

    let manifest_path = prime_root.join(MANIFEST_FILE);
    let backup = backup_path(prime_root);
    let primed = match fs::symlink_metadata(&manifest_path) {
        Ok(_) => {
            remove_path(&backup)?;
            fs::rename(&manifest_path, &backup).map_err(io_at(&manifest_path))?;
            debug!("moved primed {} aside", manifest_path.display());
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => return Err(io_at(&manifest_path)(e).into()),
    };

    let result = write_manifest(&manifest_path, manifest)
        .and_then(|()| build_archive(format, output, prime_root).map_err(CoreError::from));

    let restored = remove_path(&manifest_path).and_then(|()| {
        if primed {
            fs::rename(&backup, &manifest_path).map_err(io_at(&backup))
        } else {
            Ok(())
        }
    });

    let path = result?;
    restored?;
    info!("packed {}", path.display());
    Ok(path)
}

fn write_manifest(path: &Path, manifest: &Manifest) -> Result<(), CoreError> {
    let content = serde_yaml::to_string(manifest)?;
    fs::write(path, content).map_err(io_at(path))?;
    debug!("wrote {}", path.display());
    Ok(())
}

/// Sibling of the prime tree, so the backup never ends up in the archive.
fn backup_path(prime_root: &Path) -> PathBuf {
    let name = prime_root
        .file_name()
        .map_or_else(|| "prime".to_owned(), |n| n.to_string_lossy().into_owned());
    prime_root.with_file_name(format!(".{name}-{MANIFEST_FILE}"))
}
