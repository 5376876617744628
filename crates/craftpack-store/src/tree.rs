use crate::StoreError;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Symlink,
}

/// A regular file or symlink found under a tree root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Path relative to the root, `/`-separated.
    pub rel: String,
    pub path: PathBuf,
    pub kind: EntryKind,
}

/// List regular files and symlinks under `root`, sorted by relative path.
///
/// Symlinks are reported as entries and never followed. Directories are not
/// listed; they are implied by the entries below them. A missing root yields
/// an empty list.
pub fn collect_tree(root: &Path) -> Result<Vec<TreeEntry>, StoreError> {
    collect_tree_excluding(root, &[])
}

/// Like [`collect_tree`], but prunes top-level names listed in `ignore`
/// without descending into them.
pub fn collect_tree_excluding(
    root: &Path,
    ignore: &[String],
) -> Result<Vec<TreeEntry>, StoreError> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let walker = WalkDir::new(root)
        .follow_links(false)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| {
            e.depth() != 1
                || !e
                    .file_name()
                    .to_str()
                    .is_some_and(|name| ignore.iter().any(|i| i == name))
        });

    let mut entries = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            StoreError::IoAt {
                path,
                source: e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
            }
        })?;

        let ft = entry.file_type();
        let kind = if ft.is_symlink() {
            EntryKind::Symlink
        } else if ft.is_file() {
            EntryKind::File
        } else if ft.is_dir() {
            continue;
        } else {
            tracing::warn!("skipping unsupported file type: {}", entry.path().display());
            continue;
        };

        let rel = relative_path(root, entry.path())?;
        entries.push(TreeEntry {
            rel,
            path: entry.into_path(),
            kind,
        });
    }

    entries.sort_by(|a, b| a.rel.cmp(&b.rel));
    Ok(entries)
}

fn relative_path(root: &Path, path: &Path) -> Result<String, StoreError> {
    let rel = path.strip_prefix(root).map_err(|e| StoreError::IoAt {
        path: path.to_path_buf(),
        source: std::io::Error::other(format!("path strip: {e}")),
    })?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}
