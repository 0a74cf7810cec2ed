//! Shared fixtures for rule tests: build small on-disk trees and
//! materialize them through the real acquirer.

use std::fs;
use std::path::Path;

use acquire::{AcquireConfig, Acquirer, MaterializedTree, SourceLocator};
use tempfile::TempDir;

fn materialize(dir: &TempDir) -> MaterializedTree {
    let acquirer = Acquirer::new(AcquireConfig {
        local_root: Some(dir.path().to_path_buf()),
        ..Default::default()
    })
    .unwrap();
    acquirer
        .acquire(&SourceLocator::LocalPath {
            path: dir.path().to_path_buf(),
        })
        .unwrap()
}

fn write_file(root: &Path, rel_path: &str, content: &[u8]) {
    let path = root.join(rel_path);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// A tree with the given files, each holding a short placeholder body.
pub fn tree_with(files: &[&str]) -> (TempDir, MaterializedTree) {
    let dir = tempfile::tempdir().unwrap();
    for file in files {
        write_file(dir.path(), file, b"content\n");
    }
    let tree = materialize(&dir);
    (dir, tree)
}

/// A tree with files of specific sizes.
pub fn tree_with_sizes(files: &[(&str, usize)]) -> (TempDir, MaterializedTree) {
    let dir = tempfile::tempdir().unwrap();
    for (file, size) in files {
        write_file(dir.path(), file, &vec![b'x'; *size]);
    }
    let tree = materialize(&dir);
    (dir, tree)
}

/// A tree with files plus additional empty directories.
pub fn tree_with_dirs(files: &[&str], empty_dirs: &[&str]) -> (TempDir, MaterializedTree) {
    let dir = tempfile::tempdir().unwrap();
    for file in files {
        write_file(dir.path(), file, b"content\n");
    }
    for empty in empty_dirs {
        fs::create_dir_all(dir.path().join(empty)).unwrap();
    }
    let tree = materialize(&dir);
    (dir, tree)
}
