//! Filesystem copy primitives shared by plugins and the assembler.

use crate::tree::collect_tree_excluding;
use crate::{io_at, StoreError};
use std::fs;
use std::path::Path;

/// Copy one file or symlink from `src` to `dst`.
///
/// Regular files are copied byte for byte with their permissions; symlinks
/// are recreated with the same target. Whatever already exists at `dst` is
/// replaced, and missing parent directories are created.
pub fn copy_entry(src: &Path, dst: &Path) -> Result<(), StoreError> {
    let meta = fs::symlink_metadata(src).map_err(io_at(src))?;

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(io_at(parent))?;
    }
    remove_path(dst)?;

    if meta.file_type().is_symlink() {
        let target = fs::read_link(src).map_err(io_at(src))?;
        std::os::unix::fs::symlink(&target, dst).map_err(io_at(dst))?;
    } else {
        fs::copy(src, dst).map_err(io_at(dst))?;
    }
    Ok(())
}

/// Copy `src` to the relative path `rel` under `dst_root`.
///
/// Every directory between `dst_root` and the destination must be a real
/// directory inside the tree; a symlink or file in the way is a conflict and
/// nothing is written.
pub fn copy_into(src: &Path, dst_root: &Path, rel: &str) -> Result<(), StoreError> {
    check_parents(dst_root, rel)?;
    copy_entry(src, &dst_root.join(rel))
}

fn check_parents(root: &Path, rel: &str) -> Result<(), StoreError> {
    let Some(parent) = Path::new(rel).parent() else {
        return Ok(());
    };
    let mut current = root.to_path_buf();
    for component in parent.components() {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(StoreError::PathConflict {
                    path: current,
                    entry: rel.to_owned(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(io_at(&current)(e)),
        }
    }
    Ok(())
}

/// Copy every file and symlink under `src_root` into `dst_root`.
///
/// Top-level names listed in `ignore` are skipped. Returns the copied
/// relative paths in sorted order.
pub fn copy_tree(
    src_root: &Path,
    dst_root: &Path,
    ignore: &[String],
) -> Result<Vec<String>, StoreError> {
    fs::create_dir_all(dst_root).map_err(io_at(dst_root))?;

    let mut copied = Vec::new();
    for entry in collect_tree_excluding(src_root, ignore)? {
        copy_into(&entry.path, dst_root, &entry.rel)?;
        copied.push(entry.rel);
    }
    Ok(copied)
}

/// Remove a file, symlink or directory tree. Missing paths are not an error.
pub fn remove_path(path: &Path) -> Result<(), StoreError> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path).map_err(io_at(path)),
        Ok(_) => fs::remove_file(path).map_err(io_at(path)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_at(path)(e)),
    }
}

/// Empty `dir`, leaving it in place.
pub fn reset_dir(dir: &Path) -> Result<(), StoreError> {
    remove_path(dir)?;
    fs::create_dir_all(dir).map_err(io_at(dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn copy_entry_is_byte_exact_and_keeps_mode() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("run.sh");
        let data: Vec<u8> = (0..=255).collect();
        fs::write(&src, &data).unwrap();
        fs::set_permissions(&src, fs::Permissions::from_mode(0o755)).unwrap();

        let dst = dir.path().join("out/bin/run.sh");
        copy_entry(&src, &dst).unwrap();

        assert_eq!(fs::read(&dst).unwrap(), data);
        assert_eq!(fs::metadata(&dst).unwrap().permissions().mode() & 0o777, 0o755);
    }

    #[test]
    fn copy_entry_recreates_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("link");
        std::os::unix::fs::symlink("../elsewhere/target", &src).unwrap();

        let dst = dir.path().join("copy/link");
        copy_entry(&src, &dst).unwrap();

        assert!(fs::symlink_metadata(&dst).unwrap().file_type().is_symlink());
        assert_eq!(
            fs::read_link(&dst).unwrap(),
            Path::new("../elsewhere/target")
        );
    }

    #[test]
    fn copy_entry_replaces_existing_destination() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("new");
        fs::write(&src, "new").unwrap();
        let dst = dir.path().join("dst");
        std::os::unix::fs::symlink("somewhere", &dst).unwrap();

        copy_entry(&src, &dst).unwrap();
        assert!(fs::symlink_metadata(&dst).unwrap().is_file());
        assert_eq!(fs::read_to_string(&dst).unwrap(), "new");
    }

    #[test]
    fn copy_entry_missing_source_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("absent");
        let err = copy_entry(&src, &dir.path().join("dst")).unwrap_err();
        assert_eq!(err.path(), Some(src.as_path()));
    }

    #[test]
    fn copy_into_refuses_symlinked_parent() {
        let dir = tempfile::tempdir().unwrap();
        let outside = dir.path().join("outside");
        let tree = dir.path().join("stage");
        fs::create_dir_all(&outside).unwrap();
        fs::create_dir_all(&tree).unwrap();
        std::os::unix::fs::symlink(&outside, tree.join("lib")).unwrap();
        let src = dir.path().join("x.txt");
        fs::write(&src, "x").unwrap();

        let err = copy_into(&src, &tree, "lib/x.txt").unwrap_err();
        assert!(matches!(err, StoreError::PathConflict { .. }));
        assert_eq!(err.path(), Some(tree.join("lib").as_path()));
        assert!(!outside.join("x.txt").exists());
    }

    #[test]
    fn copy_into_refuses_file_parent() {
        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("stage");
        fs::create_dir_all(&tree).unwrap();
        fs::write(tree.join("lib"), "file").unwrap();
        let src = dir.path().join("x.txt");
        fs::write(&src, "x").unwrap();

        let err = copy_into(&src, &tree, "lib/x.txt").unwrap_err();
        assert!(err.to_string().contains("lib/x.txt"));
        assert_eq!(fs::read_to_string(tree.join("lib")).unwrap(), "file");
    }

    #[test]
    fn copy_into_creates_missing_parents() {
        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("stage");
        let src = dir.path().join("x.txt");
        fs::write(&src, "x").unwrap();

        copy_into(&src, &tree, "a/b/x.txt").unwrap();
        assert_eq!(fs::read_to_string(tree.join("a/b/x.txt")).unwrap(), "x");
    }

    #[test]
    fn copy_tree_skips_ignored_top_level_names() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("lib")).unwrap();
        fs::create_dir_all(src.join("work")).unwrap();
        fs::write(src.join("lib/a"), "a").unwrap();
        fs::write(src.join("work/junk"), "j").unwrap();
        fs::write(src.join("out.zip"), "z").unwrap();

        let dst = dir.path().join("dst");
        let copied = copy_tree(&src, &dst, &["work".to_owned(), "out.zip".to_owned()]).unwrap();
        assert_eq!(copied, ["lib/a"]);
        assert!(!dst.join("work").exists());
        assert!(!dst.join("out.zip").exists());
    }

    #[test]
    fn remove_path_handles_all_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let d = dir.path().join("d");
        fs::create_dir_all(d.join("x")).unwrap();
        remove_path(&d).unwrap();
        assert!(!d.exists());
        remove_path(&d).unwrap();
    }
}
