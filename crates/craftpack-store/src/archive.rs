//! Deterministic archive building from a primed tree.
//!
//! Entries are written in lexicographic order of their `/`-separated relative
//! path with fixed timestamps and ownership, so identical trees always yield
//! byte-identical archives. Symlinks are stored as symlink entries carrying
//! their original target.

use crate::tree::{collect_tree, EntryKind, TreeEntry};
use crate::{fsync_dir, io_at, StoreError};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fmt;
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::NamedTempFile;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchiveFormat {
    #[default]
    Zip,
    /// Zip container with the `.charm` extension.
    Charm,
    TarGz,
}

impl ArchiveFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Charm => "charm",
            ArchiveFormat::TarGz => "tar.gz",
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ArchiveFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "zip" => Ok(ArchiveFormat::Zip),
            "charm" => Ok(ArchiveFormat::Charm),
            "tar.gz" | "tgz" => Ok(ArchiveFormat::TarGz),
            other => Err(format!(
                "unknown archive format '{other}' (expected zip, charm or tar.gz)"
            )),
        }
    }
}

/// Package every file and symlink under `root` into `output`.
///
/// The archive is written to a temporary file next to `output` and renamed
/// into place, so a failed build never leaves a partial archive behind.
pub fn build_archive(
    format: ArchiveFormat,
    output: &Path,
    root: &Path,
) -> Result<PathBuf, StoreError> {
    let entries = collect_tree(root)?;
    let dir = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(io_at(&dir))?;

    let mut tmp = NamedTempFile::new_in(&dir).map_err(io_at(&dir))?;
    match format {
        ArchiveFormat::Zip | ArchiveFormat::Charm => write_zip(tmp.as_file_mut(), &entries, output)?,
        ArchiveFormat::TarGz => write_tar_gz(tmp.as_file_mut(), &entries)?,
    }
    tmp.as_file().sync_all().map_err(io_at(output))?;
    tmp.persist(output).map_err(|e| StoreError::IoAt {
        path: output.to_path_buf(),
        source: e.error,
    })?;
    fsync_dir(&dir).map_err(io_at(&dir))?;

    debug!(
        "wrote {format} archive '{}' with {} entries",
        output.display(),
        entries.len()
    );
    Ok(output.to_path_buf())
}

fn entry_mode(entry: &TreeEntry) -> Result<u32, StoreError> {
    let meta = entry.path.symlink_metadata().map_err(io_at(&entry.path))?;
    Ok(meta.permissions().mode() & 0o7777)
}

fn write_zip(file: &mut fs::File, entries: &[TreeEntry], output: &Path) -> Result<(), StoreError> {
    let zip_err = |e: zip::result::ZipError| StoreError::Archive {
        path: output.to_path_buf(),
        message: e.to_string(),
    };

    let mut zw = ZipWriter::new(file);
    for entry in entries {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default())
            .unix_permissions(entry_mode(entry)?);

        match entry.kind {
            EntryKind::File => {
                let data = fs::read(&entry.path).map_err(io_at(&entry.path))?;
                zw.start_file(entry.rel.clone(), options).map_err(zip_err)?;
                zw.write_all(&data).map_err(io_at(output))?;
            }
            EntryKind::Symlink => {
                let target = fs::read_link(&entry.path).map_err(io_at(&entry.path))?;
                zw.add_symlink(
                    entry.rel.clone(),
                    target.to_string_lossy().into_owned(),
                    options,
                )
                .map_err(zip_err)?;
            }
        }
    }
    zw.finish().map_err(zip_err)?;
    Ok(())
}

fn write_tar_gz(file: &mut fs::File, entries: &[TreeEntry]) -> Result<(), StoreError> {
    let encoder = GzEncoder::new(file, Compression::default());
    let mut ar = tar::Builder::new(encoder);
    ar.follow_symlinks(false);

    for entry in entries {
        let mut header = tar::Header::new_gnu();
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        header.set_mode(entry_mode(entry)?);

        match entry.kind {
            EntryKind::File => {
                let data = fs::read(&entry.path).map_err(io_at(&entry.path))?;
                header.set_entry_type(tar::EntryType::Regular);
                header.set_size(data.len() as u64);
                header.set_cksum();
                ar.append_data(&mut header, &entry.rel, data.as_slice())
                    .map_err(io_at(&entry.path))?;
            }
            EntryKind::Symlink => {
                let target = fs::read_link(&entry.path).map_err(io_at(&entry.path))?;
                header.set_entry_type(tar::EntryType::Symlink);
                header.set_size(0);
                ar.append_link(&mut header, &entry.rel, &target)
                    .map_err(io_at(&entry.path))?;
            }
        }
    }

    let encoder = ar.into_inner()?;
    encoder.finish()?;
    Ok(())
}
