//! Integration tests for sitediff
//!
//! Realistic scenarios over generated site trees: compare, revert, share,
//! resync and report across instances.

use ::sitediff::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::info;

/// Test harness owning a remote mirror, a local copy and an engine
pub struct SiteHarness {
    pub dir: TempDir,
    pub remote: PathBuf,
    pub local: PathBuf,
    pub site: SiteId,
    pub sitediff: SiteDiff,
}

/// Shape of a generated site
#[derive(Debug, Clone, Copy)]
pub struct SiteShape {
    pub folders: usize,
    pub files_per_folder: usize,
}

impl SiteHarness {
    pub fn new() -> Self {
        Self::with_builder(SiteDiffBuilder::new())
    }

    pub fn with_builder(builder: SiteDiffBuilder) -> Self {
        let dir = TempDir::new().unwrap();
        let remote = dir.path().join("remote");
        let local = dir.path().join("local");
        fs::create_dir_all(&remote).unwrap();
        fs::create_dir_all(&local).unwrap();

        let site = SiteId::new("contoso", "prod");
        let provider = DirectorySnapshotProvider::new().with_site(site.clone(), remote.clone());
        let sitediff = builder.build(dir.path().join("state"), provider).unwrap();
        Self {
            dir,
            remote,
            local,
            site,
            sitediff,
        }
    }

    /// Write the same generated site to both sides
    pub fn generate_site(&self, shape: SiteShape) -> Vec<String> {
        let mut paths = Vec::new();
        for f in 0..shape.folders {
            for i in 0..shape.files_per_folder {
                let rel = format!("section{}/page{}.html", f, i);
                let content = format!("<h1>Section {} page {}</h1>\n<p>body</p>\n", f, i);
                write(&self.remote, &rel, &content);
                write(&self.local, &rel, &content);
                paths.push(rel);
            }
        }
        paths
    }

    /// Apply random local edits and return the expected status per path
    pub fn mutate_local(&self, paths: &[String], seed: u64, mutations: usize) -> BTreeMap<String, FileStatus> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut expected = BTreeMap::new();

        for n in 0..mutations {
            match rng.random_range(0..3) {
                0 => {
                    let rel = &paths[rng.random_range(0..paths.len())];
                    if expected.contains_key(rel) {
                        continue;
                    }
                    write(&self.local, rel, &format!("edited {}\n", n));
                    expected.insert(rel.clone(), FileStatus::Modified);
                }
                1 => {
                    let rel = format!("added/new{}.txt", n);
                    write(&self.local, &rel, "new\n");
                    expected.insert(rel, FileStatus::AddedLocally);
                }
                _ => {
                    let rel = &paths[rng.random_range(0..paths.len())];
                    if expected.contains_key(rel) {
                        continue;
                    }
                    fs::remove_file(self.local.join(rel)).unwrap();
                    expected.insert(rel.clone(), FileStatus::DeletedLocally);
                }
            }
        }
        expected
    }

    pub fn compare(&mut self) -> ComparisonKey {
        self.sitediff
            .compare_with_local(
                self.site.clone(),
                self.local.clone(),
                SiteNames::new("Contoso", "contoso-local", "Production"),
            )
            .unwrap()
    }

    pub fn statuses(&self, key: &ComparisonKey) -> BTreeMap<String, FileStatus> {
        self.sitediff
            .get_comparison(key)
            .unwrap()
            .records
            .iter()
            .map(|r| (r.relative_path.clone(), r.status))
            .collect()
    }
}

impl Default for SiteHarness {
    fn default() -> Self {
        Self::new()
    }
}

pub fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Records of a comparison keyed by path, for equality checks across instances
pub fn record_set(comparison: &SiteComparison) -> BTreeMap<String, FileStatus> {
    comparison
        .records
        .iter()
        .map(|r| (r.relative_path.clone(), r.status))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tracing_test::traced_test;

    struct CountingListener(Arc<AtomicUsize>);

    impl ChangeListener for CountingListener {
        fn on_change(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    #[traced_test]
    fn test_random_edits_are_classified_and_reverted() {
        let mut harness = SiteHarness::new();
        let paths = harness.generate_site(SiteShape {
            folders: 6,
            files_per_folder: 8,
        });
        let expected = harness.mutate_local(&paths, 42, 30);

        let key = harness.compare();
        assert_eq!(harness.statuses(&key), expected);
        info!("Classified {} differences", expected.len());

        let summary = harness.sitediff.discard_folder_path(&key, "").unwrap();
        assert_eq!(summary.success_count, expected.len());
        assert!(!summary.is_partial_failure());

        harness.sitediff.resync(&key).unwrap();
        assert!(harness.sitediff.get_comparison(&key).unwrap().is_empty());
        assert!(logs_contain("Compared contoso/prod"));
    }

    #[test]
    #[traced_test]
    fn test_folder_discard_with_failures() {
        let mut harness = SiteHarness::new();
        let paths = harness.generate_site(SiteShape {
            folders: 2,
            files_per_folder: 10,
        });
        for rel in paths.iter().filter(|p| p.starts_with("section0/")) {
            write(&harness.local, rel, "local edit\n");
        }
        let key = harness.compare();

        // Pull the snapshot copies of two records out from under the engine
        let comparison = harness.sitediff.get_comparison(&key).unwrap();
        let broken: Vec<String> = comparison.records[..2].iter().map(|r| r.relative_path.clone()).collect();
        for rel in &broken {
            let remote_path = comparison.record(rel).unwrap().remote_path.clone().unwrap();
            fs::remove_file(remote_path).unwrap();
        }

        let summary = harness.sitediff.discard_folder_path(&key, "section0").unwrap();
        assert_eq!(summary.total_count, 10);
        assert_eq!(summary.success_count, 8);
        let mut failed: Vec<String> = summary.errors.iter().map(|f| f.relative_path.clone()).collect();
        failed.sort();
        let mut broken_sorted = broken.clone();
        broken_sorted.sort();
        assert_eq!(failed, broken_sorted);
        assert!(summary.errors.iter().all(|f| f.error.relative_path().is_some()));

        let remaining: Vec<String> = harness.statuses(&key).into_keys().collect();
        assert_eq!(remaining, broken_sorted);
        assert!(logs_contain("Discarded 8/10 files"));
    }

    #[test]
    #[traced_test]
    fn test_share_between_instances() {
        let mut origin = SiteHarness::new();
        let paths = origin.generate_site(SiteShape {
            folders: 3,
            files_per_folder: 4,
        });
        write(&origin.local, &paths[0], "changed\n");
        write(&origin.local, "assets/logo.png", "png bytes");
        fs::remove_file(origin.local.join(&paths[5])).unwrap();
        let key = origin.compare();

        let package_path = origin.dir.path().join("share/contoso.json");
        let package = origin.sitediff.export(&key, &package_path).unwrap();
        assert_eq!(package.format_version, FORMAT_VERSION);

        let mut other = SiteHarness::new();
        let outcome = other
            .sitediff
            .import(&package_path, |_| ConflictDecision::Replace)
            .unwrap();
        let ImportOutcome::Imported(imported_key) = outcome else {
            panic!("expected import");
        };

        let source = origin.sitediff.get_comparison(&key).unwrap();
        let imported = other.sitediff.get_comparison(&imported_key).unwrap();
        assert_eq!(record_set(source), record_set(imported));
        assert_eq!(imported.remote_site_name, "Contoso");
        assert_eq!(imported.local_site_name, "contoso-local");
        assert_eq!(imported.environment_name, "Production");
        assert!(imported.record("assets/logo.png").unwrap().content_unavailable);

        // The imported copy renders without the original trees
        let html = other.sitediff.report(&imported_key).unwrap();
        assert!(html.contains("+changed"));
        assert!(html.contains(report::BINARY_PLACEHOLDER));

        // Second import asks and keeps
        let outcome = other
            .sitediff
            .import(&package_path, |_| ConflictDecision::Keep)
            .unwrap();
        assert_eq!(outcome, ImportOutcome::Kept(imported_key));
    }

    #[test]
    #[traced_test]
    fn test_failed_resync_keeps_state() {
        let mut harness = SiteHarness::new();
        let paths = harness.generate_site(SiteShape {
            folders: 1,
            files_per_folder: 3,
        });
        write(&harness.local, &paths[1], "edit\n");
        let key = harness.compare();
        let before = harness.statuses(&key);

        fs::remove_dir_all(&harness.remote).unwrap();
        let err = harness.sitediff.resync(&key).unwrap_err();
        assert!(matches!(err, SiteDiffError::SnapshotFetch { .. }));
        assert!(err.is_recoverable());
        assert_eq!(harness.statuses(&key), before);
        assert!(logs_contain("Snapshot fetch for contoso/prod failed"));

        // The previous snapshot is still usable for discards
        harness.sitediff.discard_path(&key, &paths[1]).unwrap();
        assert!(fs::read_to_string(harness.local.join(&paths[1])).unwrap().contains("page 1"));
    }

    #[test]
    fn test_every_mutation_notifies_once() {
        let mut harness = SiteHarness::new();
        let counter = Arc::new(AtomicUsize::new(0));
        harness
            .sitediff
            .add_listener(Box::new(CountingListener(Arc::clone(&counter))));
        let changes = harness.sitediff.subscribe();

        write(&harness.local, "a.txt", "a");
        write(&harness.local, "b/c.txt", "c");
        let key = harness.compare();
        harness.sitediff.set_sort_mode(SortMode::Status);
        harness.sitediff.set_view_mode(ViewMode::Tree);
        harness.sitediff.discard_path(&key, "a.txt").unwrap();
        harness.sitediff.discard_folder_path(&key, "b").unwrap();
        harness.sitediff.remove_comparison(&key);
        harness.sitediff.clear_all();

        assert_eq!(counter.load(Ordering::SeqCst), 7);
        assert_eq!(changes.try_iter().count(), 7);
    }

    #[test]
    fn test_environment_comparison_and_report_file() {
        let dir = TempDir::new().unwrap();
        let prod_dir = dir.path().join("prod");
        let staging_dir = dir.path().join("staging");
        write(&prod_dir, "index.html", "<h1>prod</h1>\n");
        write(&staging_dir, "index.html", "<h1>staging</h1>\n");
        write(&staging_dir, "beta/feature.html", "new\n");

        let prod = SiteId::new("contoso", "prod");
        let staging = SiteId::new("contoso", "staging");
        let provider = DirectorySnapshotProvider::new()
            .with_site(prod.clone(), prod_dir)
            .with_site(staging.clone(), staging_dir);
        let mut sitediff = SiteDiff::open(dir.path().join("state"), provider).unwrap();

        let key = sitediff
            .compare_with_environment(prod, staging, SiteNames::new("Contoso", "Staging", "Prod"))
            .unwrap();
        let comparison = sitediff.get_comparison(&key).unwrap();
        assert_eq!(comparison.counts().modified, 1);
        assert_eq!(comparison.counts().added_locally, 1);

        sitediff.set_sort_mode(SortMode::Status);
        let out = dir.path().join("reports/contoso.html");
        sitediff.write_report(&key, &out).unwrap();
        let html = fs::read_to_string(out).unwrap();
        let index = html.find("index.html").unwrap();
        let feature = html.find("beta/feature.html").unwrap();
        assert!(index < feature);
        assert!(html.contains("&lt;h1&gt;staging&lt;/h1&gt;"));
    }
}
