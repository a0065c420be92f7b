//! Property-based testing for sitediff
//!
//! Uses proptest to verify invariants of comparisons, projections, discards
//! and packages across randomly generated inputs.

use ::sitediff::interchange::{self, PackageImporter};
use ::sitediff::tree::{build_tree, sorted_records};
use ::sitediff::*;
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Generate random relative POSIX paths
///
/// Folder segments never carry an extension and file names always do, so a
/// generated path never collides with another path's folder.
fn path_strategy() -> impl Strategy<Value = String> {
    let dirs = prop::collection::vec("[a-cA-C]{1,2}", 0..=3);
    let file = "[a-zA-Z0-9]{1,6}\\.(txt|md|html)";
    (dirs, file).prop_map(|(dirs, file)| {
        let mut segments = dirs;
        segments.push(file);
        segments.join("/")
    })
}

fn status_strategy() -> impl Strategy<Value = FileStatus> {
    prop_oneof![
        Just(FileStatus::Modified),
        Just(FileStatus::AddedLocally),
        Just(FileStatus::DeletedLocally),
    ]
}

fn record(rel: &str, status: FileStatus) -> FileComparisonRecord {
    let local = PathBuf::from("/local").join(rel);
    let remote = PathBuf::from("/remote").join(rel);
    match status {
        FileStatus::Modified => FileComparisonRecord::modified(rel, local, remote, false),
        FileStatus::AddedLocally => FileComparisonRecord::added_locally(rel, local, false),
        FileStatus::DeletedLocally => FileComparisonRecord::deleted_locally(rel, remote, false),
    }
}

/// Unique records with random statuses
fn records_strategy(max: usize) -> impl Strategy<Value = Vec<FileComparisonRecord>> {
    prop::collection::btree_map(path_strategy(), status_strategy(), 0..max)
        .prop_map(|map| map.iter().map(|(rel, status)| record(rel, *status)).collect())
}

fn sort_strategy() -> impl Strategy<Value = SortMode> {
    prop_oneof![Just(SortMode::Name), Just(SortMode::Path), Just(SortMode::Status)]
}

fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

fn leaf_paths(folder: &FolderNode) -> Vec<String> {
    folder
        .get_all_file_items()
        .iter()
        .map(|r| r.relative_path.clone())
        .collect()
}

fn assert_folders_first(folder: &FolderNode) -> bool {
    let mut seen_file = false;
    for node in folder.children() {
        match node {
            TreeNode::Folder(child) => {
                if seen_file || !assert_folders_first(child) {
                    return false;
                }
            }
            TreeNode::File(_) => seen_file = true,
        }
    }
    true
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Relative paths stay unique and a later duplicate wins
    #[test]
    fn relative_paths_unique(
        entries in prop::collection::vec((path_strategy(), status_strategy()), 0..40)
    ) {
        let records: Vec<FileComparisonRecord> =
            entries.iter().map(|(rel, status)| record(rel, *status)).collect();
        let comparison = SiteComparison::new(
            ComparisonKey::live("w", "e"), records, "R", "L", "E", Origin::Live,
        );

        let mut last: BTreeMap<&str, FileStatus> = BTreeMap::new();
        for (rel, status) in &entries {
            last.insert(rel.as_str(), *status);
        }
        prop_assert_eq!(comparison.records.len(), last.len());
        for record in &comparison.records {
            prop_assert_eq!(last.get(record.relative_path.as_str()), Some(&record.status));
            prop_assert!(record.is_consistent());
        }
    }

    /// Tree leaves are exactly the record set, with folders before files
    #[test]
    fn tree_leaves_match_records(records in records_strategy(60), sort in sort_strategy()) {
        let root = build_tree(&records, sort);

        let leaves = leaf_paths(&root);
        prop_assert_eq!(leaves.len(), records.len());
        let leaves: BTreeSet<String> = leaves.into_iter().collect();
        let expected: BTreeSet<String> = records.iter().map(|r| r.relative_path.clone()).collect();
        prop_assert_eq!(leaves, expected);
        prop_assert!(assert_folders_first(&root));
        prop_assert_eq!(root.file_count(), records.len());
    }

    /// Sorting is a total order independent of input order
    #[test]
    fn sort_is_deterministic(records in records_strategy(40), sort in sort_strategy(), seed in any::<u64>()) {
        let mut shuffled = records.clone();
        // Deterministic rotation and reversal driven by the seed
        if !shuffled.is_empty() {
            let mid = (seed as usize) % shuffled.len();
            shuffled.rotate_left(mid);
        }
        if seed % 2 == 0 {
            shuffled.reverse();
        }

        prop_assert_eq!(sorted_records(&records, sort), sorted_records(&shuffled, sort));
        prop_assert_eq!(build_tree(&records, sort), build_tree(&shuffled, sort));
    }

    /// Status ordering ranks by status before path
    #[test]
    fn status_sort_groups_statuses(records in records_strategy(40)) {
        let sorted = sorted_records(&records, SortMode::Status);
        for pair in sorted.windows(2) {
            prop_assert!(pair[0].status.rank() <= pair[1].status.rank());
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// A folder discard over N files with K failures leaves exactly K records
    #[test]
    fn discard_partial_failure_accounting(total in 1usize..20, failing_mask in any::<u32>()) {
        let dir = TempDir::new().unwrap();
        let local_root = dir.path().join("local");
        let remote_root = dir.path().join("remote");

        let mut records = Vec::new();
        let mut failing = BTreeSet::new();
        for i in 0..total {
            let rel = format!("f/p{}.txt", i);
            let local = write(&local_root, &rel, "local");
            let remote = remote_root.join(&rel);
            if failing_mask & (1 << i) != 0 {
                failing.insert(rel.clone());
            } else {
                write(&remote_root, &rel, "remote");
            }
            records.push(FileComparisonRecord::modified(rel, local, remote, false));
        }

        let key = ComparisonKey::live("w", "e");
        let mut registry = ComparisonRegistry::new(Box::new(MemoryStore::new()));
        registry.insert_comparison(
            SiteComparison::new(key.clone(), records.clone(), "R", "L", "E", Origin::Live)
                .with_local_root(local_root.clone()),
        );
        let folder = build_tree(&records, SortMode::Path);

        let summary = discard::DiscardEngine::new(4)
            .discard_folder(&mut registry, &key, &folder)
            .unwrap();

        prop_assert_eq!(summary.total_count, total);
        prop_assert_eq!(summary.errors.len(), failing.len());
        prop_assert_eq!(summary.success_count, total - failing.len());

        let remaining: BTreeSet<String> = registry
            .get_comparison(&key)
            .unwrap()
            .records
            .iter()
            .map(|r| r.relative_path.clone())
            .collect();
        prop_assert_eq!(remaining, failing);
    }

    /// Export then import preserves the record set and metadata
    #[test]
    fn export_import_round_trip(
        entries in prop::collection::btree_map(path_strategy(), (status_strategy(), "[ -~]{0,40}"), 0..20)
    ) {
        let dir = TempDir::new().unwrap();
        let local_root = dir.path().join("local");
        let remote_root = dir.path().join("remote");

        let records: Vec<FileComparisonRecord> = entries
            .iter()
            .map(|(rel, (status, text))| {
                let local = local_root.join(rel);
                let remote = remote_root.join(rel);
                if *status != FileStatus::DeletedLocally {
                    write(&local_root, rel, &format!("local {}", text));
                }
                if *status != FileStatus::AddedLocally {
                    write(&remote_root, rel, text);
                }
                match status {
                    FileStatus::Modified => FileComparisonRecord::modified(rel, local, remote, false),
                    FileStatus::AddedLocally => FileComparisonRecord::added_locally(rel, local, false),
                    FileStatus::DeletedLocally => FileComparisonRecord::deleted_locally(rel, remote, false),
                }
            })
            .collect();
        let original = SiteComparison::new(
            ComparisonKey::live("w", "e"), records, "Remote Site", "Local Site", "Prod", Origin::Live,
        );

        let package_path = dir.path().join("pkg.json");
        interchange::export_to_file(&original, &package_path).unwrap();
        let package = interchange::read_package_file(&package_path).unwrap();

        let config = SiteDiffConfig::new(dir.path().join("state"));
        let mut registry = ComparisonRegistry::new(Box::new(MemoryStore::new()));
        let outcome = PackageImporter::new(&config)
            .import(&mut registry, &package, |_| ConflictDecision::Replace)
            .unwrap();
        let ImportOutcome::Imported(key) = outcome else {
            return Err(TestCaseError::fail("import was not applied"));
        };

        let imported = registry.get_comparison(&key).unwrap();
        prop_assert_eq!(&imported.remote_site_name, &original.remote_site_name);
        prop_assert_eq!(&imported.local_site_name, &original.local_site_name);
        prop_assert_eq!(&imported.environment_name, &original.environment_name);
        prop_assert_eq!(imported.origin, Origin::Imported);

        let as_set = |c: &SiteComparison| -> BTreeMap<String, FileStatus> {
            c.records.iter().map(|r| (r.relative_path.clone(), r.status)).collect()
        };
        prop_assert_eq!(as_set(imported), as_set(&original));

        for record in &imported.records {
            prop_assert!(record.is_consistent());
            prop_assert!(!record.content_unavailable);
            let (_, text) = &entries[&record.relative_path];
            if let Some(remote) = &record.remote_path {
                prop_assert_eq!(&fs::read_to_string(remote).unwrap(), text);
            }
        }
    }
}
