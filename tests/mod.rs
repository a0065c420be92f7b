//! Main test module for sitediff
//!
//! This module includes all test suites:
//! - Integration tests for end-to-end scenarios
//! - Property-based tests for invariants

pub mod integration;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use ::sitediff::*;
    use serde_json::json;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn setup(dir: &TempDir, builder: SiteDiffBuilder) -> (SiteDiff, SiteId) {
        let remote = dir.path().join("remote");
        let local = dir.path().join("local");
        fs::create_dir_all(&remote).unwrap();
        fs::create_dir_all(&local).unwrap();
        let site = SiteId::new("web", "prod");
        let provider = DirectorySnapshotProvider::new().with_site(site.clone(), remote);
        let sitediff = builder.build(dir.path().join("state"), provider).unwrap();
        (sitediff, site)
    }

    #[test]
    fn test_empty_trees() {
        let dir = TempDir::new().unwrap();
        let (mut sitediff, site) = setup(&dir, SiteDiffBuilder::new());

        let key = sitediff
            .compare_with_local(site, dir.path().join("local"), SiteNames::default())
            .unwrap();
        let comparison = sitediff.get_comparison(&key).unwrap();
        assert!(comparison.is_empty());
        assert_eq!(comparison.counts().total(), 0);

        let summary = sitediff.discard_folder_path(&key, "").unwrap();
        assert_eq!(summary.total_count, 0);
        assert!(!summary.is_partial_failure());
        assert!(sitediff.report(&key).unwrap().contains("<strong>0</strong>"));
    }

    #[test]
    fn test_special_filenames() {
        let dir = TempDir::new().unwrap();
        let (mut sitediff, site) = setup(&dir, SiteDiffBuilder::new());
        let local = dir.path().join("local");

        let names = [
            "file with spaces.txt",
            "file-with-dashes.txt",
            "文件.txt",
            "émoji 🎉.html",
            "dir with space/inner.txt",
        ];
        for name in names {
            write(&dir.path().join("remote"), name, "remote");
            write(&local, name, "local");
        }

        let key = sitediff
            .compare_with_local(site, local.clone(), SiteNames::default())
            .unwrap();
        assert_eq!(sitediff.get_comparison(&key).unwrap().records.len(), names.len());

        for name in names {
            sitediff.discard_path(&key, name).unwrap();
            assert_eq!(fs::read_to_string(local.join(name)).unwrap(), "remote");
        }
        assert!(sitediff.get_comparison(&key).unwrap().is_empty());
    }

    #[test]
    fn test_ignore_patterns_apply_to_both_sides() {
        let dir = TempDir::new().unwrap();
        let builder = SiteDiffBuilder::new().ignore_patterns(vec!["**/*.log".to_string(), "cache/**".to_string()]);
        let (mut sitediff, site) = setup(&dir, builder);
        let local = dir.path().join("local");

        write(&local, "debug.log", "x");
        write(&local, "cache/page.html", "x");
        write(&dir.path().join("remote"), "logs/server.log", "y");
        write(&local, "kept.txt", "x");

        let key = sitediff.compare_with_local(site, local, SiteNames::default()).unwrap();
        let paths: Vec<String> = sitediff
            .get_comparison(&key)
            .unwrap()
            .records
            .iter()
            .map(|r| r.relative_path.clone())
            .collect();
        assert_eq!(paths, vec!["kept.txt"]);
    }

    #[test]
    fn test_rejected_import_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let (mut sitediff, _) = setup(&dir, SiteDiffBuilder::new());

        let package = json!({
            "formatVersion": FORMAT_VERSION + 1,
            "remoteSiteName": "Web",
            "environmentName": "Prod",
            "records": [{ "relativePath": "a.txt", "status": "modified", "content": "x" }]
        });
        let path = dir.path().join("future.json");
        fs::write(&path, package.to_string()).unwrap();

        let err = sitediff.import(&path, |_| ConflictDecision::Replace).unwrap_err();
        assert!(matches!(
            err,
            SiteDiffError::ImportValidation(ImportValidationError::UnsupportedVersion { .. })
        ));
        assert!(sitediff.registry().is_empty());
        assert_eq!(fs::read_dir(&sitediff.config().import_root).unwrap().count(), 0);
    }

    #[test]
    fn test_discard_after_external_change_still_succeeds() {
        let dir = TempDir::new().unwrap();
        let (mut sitediff, site) = setup(&dir, SiteDiffBuilder::new());
        let local = dir.path().join("local");
        write(&local, "extra.txt", "x");

        let key = sitediff
            .compare_with_local(site, local.clone(), SiteNames::default())
            .unwrap();
        fs::remove_file(local.join("extra.txt")).unwrap();

        sitediff.discard_path(&key, "extra.txt").unwrap();
        assert!(sitediff.get_comparison(&key).unwrap().is_empty());
    }

    #[test]
    fn test_lookalike_site_ids_keep_separate_snapshots() {
        let dir = TempDir::new().unwrap();
        let one = SiteId::new("a-b", "c");
        let two = SiteId::new("a", "b-c");
        let one_remote = dir.path().join("one-remote");
        let two_remote = dir.path().join("two-remote");
        let one_local = dir.path().join("one-local");
        let two_local = dir.path().join("two-local");
        write(&one_remote, "index.html", "SITE ONE REMOTE");
        write(&two_remote, "index.html", "SITE TWO REMOTE");
        write(&one_local, "index.html", "site one edit");
        write(&two_local, "index.html", "site two edit");

        let provider = DirectorySnapshotProvider::new()
            .with_site(one.clone(), one_remote)
            .with_site(two.clone(), two_remote);
        let mut sitediff = SiteDiff::open(dir.path().join("state"), provider).unwrap();

        let k1 = sitediff
            .compare_with_local(one, one_local.clone(), SiteNames::default())
            .unwrap();
        let k2 = sitediff
            .compare_with_local(two, two_local.clone(), SiteNames::default())
            .unwrap();
        assert_ne!(k1.slug(), k2.slug());

        sitediff.discard_path(&k1, "index.html").unwrap();
        assert_eq!(fs::read_to_string(one_local.join("index.html")).unwrap(), "SITE ONE REMOTE");

        sitediff.remove_comparison(&k1);
        sitediff.discard_path(&k2, "index.html").unwrap();
        assert_eq!(fs::read_to_string(two_local.join("index.html")).unwrap(), "SITE TWO REMOTE");
    }

    #[test]
    fn test_lookalike_imported_names_keep_separate_content() {
        let dir = TempDir::new().unwrap();
        let (mut sitediff, _) = setup(&dir, SiteDiffBuilder::new());

        let mut keys = Vec::new();
        for (name, content) in [("My Site", "first"), ("My_Site", "second")] {
            let package = json!({
                "formatVersion": FORMAT_VERSION,
                "remoteSiteName": name,
                "environmentName": "p",
                "records": [{ "relativePath": "a.txt", "status": "deletedLocally", "content": content }]
            });
            let path = dir.path().join(format!("{}.json", content));
            fs::write(&path, package.to_string()).unwrap();
            match sitediff.import(&path, |_| ConflictDecision::Replace).unwrap() {
                ImportOutcome::Imported(key) => keys.push(key),
                other => panic!("expected import, got {:?}", other),
            }
        }

        sitediff.remove_comparison(&keys[1]);
        let remaining = sitediff.get_comparison(&keys[0]).unwrap();
        let remote = remaining.record("a.txt").unwrap().remote_path.clone().unwrap();
        assert_eq!(fs::read_to_string(remote).unwrap(), "first");
        assert!(!sitediff.report(&keys[0]).unwrap().contains(report::UNREADABLE_PLACEHOLDER));
    }

    #[test]
    fn test_binary_classification_by_extension() {
        let dir = TempDir::new().unwrap();
        let builder = SiteDiffBuilder::new().binary_extensions(vec!["dat".to_string()]);
        let (mut sitediff, site) = setup(&dir, builder);
        let local = dir.path().join("local");
        write(&local, "blob.DAT", "x");
        write(&local, "image.png", "x");

        let key = sitediff.compare_with_local(site, local, SiteNames::default()).unwrap();
        let comparison = sitediff.get_comparison(&key).unwrap();
        assert!(comparison.record("blob.DAT").unwrap().is_binary);
        assert!(!comparison.record("image.png").unwrap().is_binary);
    }
}
