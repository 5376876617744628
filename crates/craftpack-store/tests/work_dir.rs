//! Work-directory round trips: stage a tree, fingerprint it, archive it.

use craftpack_schema::PartName;
use craftpack_store::{
    build_archive, collect_tree, copy_tree, tree_digest, ArchiveFormat, LifecycleState, PartState,
    StateStore, WorkLayout,
};
use std::fs;
use std::path::Path;

fn write_files(root: &Path, files: &[(&str, &str)]) {
    for (rel, content) in files {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
}

#[test]
fn staged_tree_archives_identically_across_work_dirs() {
    let src = tempfile::tempdir().unwrap();
    write_files(
        src.path(),
        &[("lib/foo/f1.txt", "1"), ("lib/f3.txt", "3"), ("README.md", "r")],
    );

    let mut archives = Vec::new();
    let out = tempfile::tempdir().unwrap();
    for i in 0..2 {
        let work = tempfile::tempdir().unwrap();
        let layout = WorkLayout::new(work.path());
        layout.initialize().unwrap();
        copy_tree(src.path(), &layout.prime_dir(), &[]).unwrap();
        let path = build_archive(
            ArchiveFormat::Zip,
            &out.path().join(format!("run{i}.zip")),
            &layout.prime_dir(),
        )
        .unwrap();
        archives.push(fs::read(path).unwrap());
    }
    assert_eq!(archives[0], archives[1]);
}

#[test]
fn copy_preserves_digest() {
    let src = tempfile::tempdir().unwrap();
    write_files(src.path(), &[("a/b/c.txt", "deep"), ("top", "t")]);
    std::os::unix::fs::symlink("a/b/c.txt", src.path().join("alias")).unwrap();

    let dst = tempfile::tempdir().unwrap();
    copy_tree(src.path(), dst.path(), &[]).unwrap();

    assert_eq!(
        tree_digest(src.path()).unwrap(),
        tree_digest(dst.path()).unwrap()
    );
    let rels: Vec<String> = collect_tree(dst.path())
        .unwrap()
        .into_iter()
        .map(|e| e.rel)
        .collect();
    assert_eq!(rels, ["a/b/c.txt", "alias", "top"]);
}

#[test]
fn state_survives_reopen() {
    let work = tempfile::tempdir().unwrap();
    {
        let layout = WorkLayout::new(work.path());
        layout.initialize().unwrap();
        let store = StateStore::new(layout);
        let mut state = PartState::new(PartName::from("app"));
        state.state = LifecycleState::Primed;
        state.primed_files = vec!["bin/app".to_owned()];
        store.put(&state).unwrap();
    }

    let layout = WorkLayout::new(work.path());
    layout.initialize().unwrap();
    let store = StateStore::new(layout);
    let state = store.get("app").unwrap().unwrap();
    assert_eq!(state.state, LifecycleState::Primed);
    assert_eq!(state.primed_files, ["bin/app"]);
}
