//! Property tests for the snapshot round-trip law

use proptest::collection::{btree_map, vec};
use proptest::prelude::*;
use rpl::{Rpl, TreeScanner};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// File names that are safe on every filesystem
fn file_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,8}\\.(txt|rs|md)"
}

/// A small tree: map of file name to content bytes
fn tree() -> impl Strategy<Value = BTreeMap<String, Vec<u8>>> {
    btree_map(file_name(), vec(any::<u8>(), 0..256), 0..8)
}

fn write_tree(root: &Path, files: &BTreeMap<String, Vec<u8>>) {
    for entry in fs::read_dir(root).unwrap() {
        let path = entry.unwrap().path();
        if path.file_name().map(|n| n == ".rpl").unwrap_or(false) {
            continue;
        }
        if path.is_dir() {
            fs::remove_dir_all(&path).unwrap();
        } else {
            fs::remove_file(&path).unwrap();
        }
    }
    for (name, content) in files {
        fs::write(root.join(name), content).unwrap();
    }
}

fn read_tree(root: &Path) -> BTreeMap<String, Vec<u8>> {
    let manifest = TreeScanner::new(root).scan().unwrap();
    manifest
        .entries
        .iter()
        .map(|e| {
            (
                e.path.to_string_lossy().into_owned(),
                fs::read(root.join(&e.path)).unwrap(),
            )
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Restoring a version reproduces exactly the tree it captured, no
    /// matter what happened to the tree in between
    #[test]
    fn round_trip_restores_captured_tree(original in tree(), mutated in tree()) {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let rpl = Rpl::init(root).unwrap();

        write_tree(root, &original);
        rpl.create("captured").unwrap();

        write_tree(root, &mutated);

        let report = rpl.restore("captured").unwrap();
        prop_assert!(report.is_complete());
        prop_assert_eq!(read_tree(root), original);
    }

    /// Scanning an unchanged tree twice yields identical manifests
    #[test]
    fn scan_is_deterministic(files in tree()) {
        let dir = TempDir::new().unwrap();
        write_tree(dir.path(), &files);

        let scanner = TreeScanner::new(dir.path());
        let first = scanner.scan().unwrap();
        let second = scanner.scan().unwrap();

        prop_assert_eq!(first.entries, second.entries);
        prop_assert_eq!(first.total_size, second.total_size);
    }

    /// Snapshot creation never changes the tree it captures
    #[test]
    fn create_does_not_modify_tree(files in tree()) {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let rpl = Rpl::init(root).unwrap();

        write_tree(root, &files);
        let before = read_tree(root);
        rpl.create("probe").unwrap();

        prop_assert_eq!(read_tree(root), before);
    }
}
