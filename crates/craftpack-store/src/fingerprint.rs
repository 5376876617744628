//! Content fingerprints for lifecycle step caching.
//!
//! A fingerprint is a blake3 digest over the inputs of a step. File trees are
//! hashed by relative path, kind, permission bits and content (or link
//! target), never by mtime.

use crate::tree::{collect_tree_excluding, EntryKind};
use crate::StoreError;
use serde::Serialize;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Incremental fingerprint builder.
///
/// Every field is length-prefixed so adjacent inputs cannot run together.
pub struct Fingerprint {
    hasher: blake3::Hasher,
}

impl Fingerprint {
    pub fn new(domain: &str) -> Self {
        let mut fp = Self {
            hasher: blake3::Hasher::new(),
        };
        fp.push_str(domain);
        fp
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.hasher.update(&(bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
        self
    }

    pub fn push_str(&mut self, s: &str) -> &mut Self {
        self.push_bytes(s.as_bytes())
    }

    /// Hash the canonical JSON form of `value`.
    pub fn push_json<T: Serialize>(&mut self, value: &T) -> Result<&mut Self, StoreError> {
        let json = serde_json::to_vec(value)?;
        Ok(self.push_bytes(&json))
    }

    /// Hash the tree under `root`, skipping top-level names in `ignore`.
    pub fn push_tree(&mut self, root: &Path, ignore: &[String]) -> Result<&mut Self, StoreError> {
        let digest = tree_digest_excluding(root, ignore)?;
        Ok(self.push_str(&digest))
    }

    pub fn finish(&self) -> String {
        self.hasher.finalize().to_hex().to_string()
    }
}

/// blake3 digest of every file and symlink under `root`.
///
/// A missing root hashes like an empty one.
pub fn tree_digest(root: &Path) -> Result<String, StoreError> {
    tree_digest_excluding(root, &[])
}

pub fn tree_digest_excluding(root: &Path, ignore: &[String]) -> Result<String, StoreError> {
    let mut fp = Fingerprint::new("tree");
    for entry in collect_tree_excluding(root, ignore)? {
        fp.push_str(&entry.rel);
        match entry.kind {
            EntryKind::File => {
                let meta = fs::symlink_metadata(&entry.path).map_err(crate::io_at(&entry.path))?;
                let mode = meta.permissions().mode() & 0o7777;
                let data = fs::read(&entry.path).map_err(crate::io_at(&entry.path))?;
                fp.push_str("f")
                    .push_bytes(&mode.to_le_bytes())
                    .push_bytes(&data);
            }
            EntryKind::Symlink => {
                let target = fs::read_link(&entry.path).map_err(crate::io_at(&entry.path))?;
                fp.push_str("l").push_str(&target.to_string_lossy());
            }
        }
    }
    Ok(fp.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_trees_have_identical_digests() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        for root in [a.path(), b.path()] {
            fs::create_dir_all(root.join("lib")).unwrap();
            fs::write(root.join("lib/f.txt"), "hello").unwrap();
        }
        assert_eq!(tree_digest(a.path()).unwrap(), tree_digest(b.path()).unwrap());
    }

    #[test]
    fn content_change_changes_digest() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("f"), "one").unwrap();
        let before = tree_digest(dir.path()).unwrap();
        fs::write(dir.path().join("f"), "two").unwrap();
        assert_ne!(before, tree_digest(dir.path()).unwrap());
    }

    #[test]
    fn permission_change_changes_digest() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("run.sh");
        fs::write(&file, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o644)).unwrap();
        let before = tree_digest(dir.path()).unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o755)).unwrap();
        assert_ne!(before, tree_digest(dir.path()).unwrap());
    }

    #[test]
    fn rename_changes_digest() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("f"), "same").unwrap();
        let before = tree_digest(dir.path()).unwrap();
        fs::rename(dir.path().join("f"), dir.path().join("g")).unwrap();
        assert_ne!(before, tree_digest(dir.path()).unwrap());
    }

    #[test]
    fn symlink_target_is_hashed() {
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink("a", dir.path().join("l")).unwrap();
        let before = tree_digest(dir.path()).unwrap();
        fs::remove_file(dir.path().join("l")).unwrap();
        std::os::unix::fs::symlink("b", dir.path().join("l")).unwrap();
        assert_ne!(before, tree_digest(dir.path()).unwrap());
    }

    #[test]
    fn fields_do_not_run_together() {
        let mut a = Fingerprint::new("t");
        a.push_str("ab").push_str("c");
        let mut b = Fingerprint::new("t");
        b.push_str("a").push_str("bc");
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn ignored_top_level_names_do_not_affect_digest() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("f"), "one").unwrap();
        let ignore = vec![".work".to_owned(), "out.zip".to_owned()];
        let before = tree_digest_excluding(dir.path(), &ignore).unwrap();

        fs::create_dir_all(dir.path().join(".work/parts")).unwrap();
        fs::write(dir.path().join(".work/parts/x"), "noise").unwrap();
        fs::write(dir.path().join("out.zip"), "zip").unwrap();
        assert_eq!(before, tree_digest_excluding(dir.path(), &ignore).unwrap());

        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/out.zip"), "nested").unwrap();
        assert_ne!(before, tree_digest_excluding(dir.path(), &ignore).unwrap());
    }

    #[test]
    fn missing_tree_matches_empty_tree() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            tree_digest(&dir.path().join("missing")).unwrap(),
            tree_digest(dir.path()).unwrap()
        );
    }
}
