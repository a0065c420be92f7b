//! Discarding local changes
//!
//! Discarding makes the local tree match the remote snapshot for one or
//! more records and then removes those records from their comparison:
//!
//! | status | file system action |
//! |--------|--------------------|
//! | `Modified` | copy remote content over the local file |
//! | `AddedLocally` | delete the local file |
//! | `DeletedLocally` | copy the remote file to its local location, creating parents |
//!
//! Each file's discard is atomic (content is staged beside the destination
//! and renamed into place); a folder discard as a whole is not. One file's
//! failure never aborts a folder discard: failures are collected with their
//! relative path, successes are removed from the comparison, failures stay.
//!
//! No confirmation happens here. Callers confirm with the operator before
//! invoking these operations.

use crate::error::{Result, SiteDiffError};
use crate::registry::ComparisonRegistry;
use crate::tree::FolderNode;
use crate::types::{ComparisonKey, DiscardFailure, DiscardSummary, FileComparisonRecord, FileStatus};
use crate::utils;
use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Revert one record on the file system without touching any registry
///
/// `local_root` is used to locate the destination of `DeletedLocally`
/// records, which have no local path of their own.
///
/// # Errors
///
/// [`SiteDiffError::Discard`] carrying the record's relative path when the
/// remote source is missing or the destination cannot be written.
pub fn revert_record(record: &FileComparisonRecord, local_root: Option<&Path>) -> Result<()> {
    let rel = record.relative_path.as_str();
    match record.status {
        FileStatus::Modified => {
            let remote = required(record.remote_path.as_deref(), rel, "remote path")?;
            let local = required(record.local_path.as_deref(), rel, "local path")?;
            utils::atomic_copy(remote, local).map_err(|e| SiteDiffError::discard(rel, e))
        }
        FileStatus::AddedLocally => {
            let local = required(record.local_path.as_deref(), rel, "local path")?;
            match fs::remove_file(local) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("{} already absent locally", rel);
                    Ok(())
                }
                Err(e) => Err(SiteDiffError::discard(rel, e)),
            }
        }
        FileStatus::DeletedLocally => {
            let remote = required(record.remote_path.as_deref(), rel, "remote path")?;
            let destination = restore_destination(record, local_root)?;
            utils::atomic_copy(remote, &destination).map_err(|e| SiteDiffError::discard(rel, e))
        }
    }
}

fn required<'a>(path: Option<&'a Path>, rel: &str, what: &str) -> Result<&'a Path> {
    path.ok_or_else(|| {
        SiteDiffError::discard(
            rel,
            io::Error::new(io::ErrorKind::NotFound, format!("record has no {}", what)),
        )
    })
}

fn restore_destination(record: &FileComparisonRecord, local_root: Option<&Path>) -> Result<PathBuf> {
    let rel = record.relative_path.as_str();
    if let Some(local) = &record.local_path {
        return Ok(local.clone());
    }
    let root = local_root.ok_or_else(|| {
        SiteDiffError::discard(
            rel,
            io::Error::new(io::ErrorKind::NotFound, "comparison has no local root"),
        )
    })?;
    utils::join_relative(root, rel).map_err(|_| {
        SiteDiffError::discard(
            rel,
            io::Error::new(io::ErrorKind::InvalidInput, "relative path escapes the local root"),
        )
    })
}

/// Applies discards and commits the resulting registry mutations
#[derive(Debug, Clone)]
pub struct DiscardEngine {
    parallel_workers: usize,
}

impl DiscardEngine {
    /// Create an engine running at most `parallel_workers` file operations at once
    pub fn new(parallel_workers: usize) -> Self {
        Self {
            parallel_workers: parallel_workers.max(1),
        }
    }

    /// Revert one file and remove its record
    ///
    /// On failure the record stays in the comparison.
    pub fn discard_file(
        &self,
        registry: &mut ComparisonRegistry,
        key: &ComparisonKey,
        relative_path: &str,
    ) -> Result<()> {
        let (record, local_root) = lookup(registry, key, relative_path)?;
        revert_record(&record, local_root.as_deref())?;
        registry.remove_file(key, relative_path);
        info!("Discarded {} in {}", relative_path, key);
        Ok(())
    }

    /// Revert every file beneath `folder`
    ///
    /// Returns `Err` only when the comparison itself does not exist; per-file
    /// failures are reported in the summary.
    pub fn discard_folder(
        &self,
        registry: &mut ComparisonRegistry,
        key: &ComparisonKey,
        folder: &FolderNode,
    ) -> Result<DiscardSummary> {
        let comparison = registry
            .get_comparison(key)
            .ok_or_else(|| SiteDiffError::ComparisonNotFound(key.to_string()))?;
        let local_root = comparison.local_root.clone();

        // Records are re-read from the registry so a stale projection cannot
        // resurrect a record that was already discarded.
        let items: Vec<(String, Option<FileComparisonRecord>)> = folder
            .get_all_file_items()
            .into_iter()
            .map(|item| {
                (
                    item.relative_path.clone(),
                    comparison.record(&item.relative_path).cloned(),
                )
            })
            .collect();

        let total_count = items.len();
        debug!("Discarding {} files under '{}' in {}", total_count, folder.path, key);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.parallel_workers)
            .build()
            .map_err(|e| SiteDiffError::internal(format!("failed to build discard pool: {}", e)))?;

        let outcomes: Vec<(String, Result<()>)> = pool.install(|| {
            items
                .par_iter()
                .map(|(rel, record)| {
                    let outcome = match record {
                        Some(record) => revert_record(record, local_root.as_deref()),
                        None => Err(SiteDiffError::RecordNotFound {
                            key: key.to_string(),
                            relative_path: rel.clone(),
                        }),
                    };
                    (rel.clone(), outcome)
                })
                .collect()
        });

        let mut succeeded = Vec::new();
        let mut errors = Vec::new();
        for (relative_path, outcome) in outcomes {
            match outcome {
                Ok(()) => succeeded.push(relative_path),
                Err(error) => {
                    warn!("Failed to discard {}: {}", relative_path, error);
                    errors.push(DiscardFailure { relative_path, error });
                }
            }
        }

        let success_count = registry.remove_files(key, &succeeded);
        info!(
            "Discarded {}/{} files under '{}' in {}",
            success_count, total_count, folder.path, key
        );

        Ok(DiscardSummary {
            success_count,
            total_count,
            errors,
        })
    }
}

impl Default for DiscardEngine {
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}

fn lookup(
    registry: &ComparisonRegistry,
    key: &ComparisonKey,
    relative_path: &str,
) -> Result<(FileComparisonRecord, Option<PathBuf>)> {
    let comparison = registry
        .get_comparison(key)
        .ok_or_else(|| SiteDiffError::ComparisonNotFound(key.to_string()))?;
    let record = comparison
        .record(relative_path)
        .cloned()
        .ok_or_else(|| SiteDiffError::RecordNotFound {
            key: key.to_string(),
            relative_path: relative_path.to_string(),
        })?;
    Ok((record, comparison.local_root.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::tree::build_tree;
    use crate::types::{Origin, SiteComparison, SortMode};
    use tempfile::TempDir;

    struct Sites {
        _dir: TempDir,
        local: PathBuf,
        remote: PathBuf,
    }

    impl Sites {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let local = dir.path().join("local");
            let remote = dir.path().join("remote");
            fs::create_dir_all(&local).unwrap();
            fs::create_dir_all(&remote).unwrap();
            Self { _dir: dir, local, remote }
        }

        fn write_local(&self, rel: &str, content: &str) -> PathBuf {
            write(&self.local, rel, content)
        }

        fn write_remote(&self, rel: &str, content: &str) -> PathBuf {
            write(&self.remote, rel, content)
        }
    }

    fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    fn registry_for(sites: &Sites, records: Vec<FileComparisonRecord>) -> (ComparisonRegistry, ComparisonKey) {
        let key = ComparisonKey::live("w", "e");
        let mut registry = ComparisonRegistry::new(Box::new(MemoryStore::new()));
        let comparison = SiteComparison::new(key.clone(), records, "R", "L", "E", Origin::Live)
            .with_local_root(sites.local.clone());
        registry.insert_comparison(comparison);
        (registry, key)
    }

    #[test]
    fn test_revert_modified_copies_remote() {
        let sites = Sites::new();
        let local = sites.write_local("a/b.txt", "local");
        let remote = sites.write_remote("a/b.txt", "remote");
        let record = FileComparisonRecord::modified("a/b.txt", local.clone(), remote, false);

        revert_record(&record, None).unwrap();
        assert_eq!(fs::read_to_string(local).unwrap(), "remote");
    }

    #[test]
    fn test_revert_added_deletes_local() {
        let sites = Sites::new();
        let local = sites.write_local("new.txt", "x");
        let record = FileComparisonRecord::added_locally("new.txt", local.clone(), false);

        revert_record(&record, None).unwrap();
        assert!(!local.exists());
        revert_record(&record, None).unwrap();
    }

    #[test]
    fn test_revert_deleted_restores_with_parents() {
        let sites = Sites::new();
        let remote = sites.write_remote("x/y/z.html", "<p>");
        let record = FileComparisonRecord::deleted_locally("x/y/z.html", remote, false);

        revert_record(&record, Some(&sites.local)).unwrap();
        assert_eq!(fs::read_to_string(sites.local.join("x/y/z.html")).unwrap(), "<p>");
    }

    #[test]
    fn test_missing_source_reports_path() {
        let sites = Sites::new();
        let local = sites.write_local("a.txt", "local");
        let record = FileComparisonRecord::modified("a.txt", local.clone(), sites.remote.join("a.txt"), false);

        let err = revert_record(&record, None).unwrap_err();
        assert_eq!(err.relative_path(), Some("a.txt"));
        assert_eq!(fs::read_to_string(local).unwrap(), "local");
    }

    #[test]
    fn test_discard_file_removes_record_only_on_success() {
        let sites = Sites::new();
        let ok_local = sites.write_local("ok.txt", "x");
        let bad_local = sites.write_local("bad.txt", "x");
        let records = vec![
            FileComparisonRecord::added_locally("ok.txt", ok_local, false),
            FileComparisonRecord::modified("bad.txt", bad_local, sites.remote.join("bad.txt"), false),
        ];
        let (mut registry, key) = registry_for(&sites, records);
        let engine = DiscardEngine::new(2);

        engine.discard_file(&mut registry, &key, "ok.txt").unwrap();
        assert!(engine.discard_file(&mut registry, &key, "bad.txt").is_err());
        assert!(matches!(
            engine.discard_file(&mut registry, &key, "ok.txt"),
            Err(SiteDiffError::RecordNotFound { .. })
        ));

        let remaining: Vec<&str> = registry
            .get_comparison(&key)
            .unwrap()
            .records
            .iter()
            .map(|r| r.relative_path.as_str())
            .collect();
        assert_eq!(remaining, vec!["bad.txt"]);
    }

    #[test]
    fn test_discard_folder_partial_failure() {
        let sites = Sites::new();
        let mut records = Vec::new();
        for i in 0..5 {
            let rel = format!("pages/p{}.html", i);
            let local = sites.write_local(&rel, "local");
            let remote = sites.write_remote(&rel, "remote");
            records.push(FileComparisonRecord::modified(rel, local, remote, false));
        }
        // Two records whose remote source has vanished.
        for i in 5..7 {
            let rel = format!("pages/p{}.html", i);
            let local = sites.write_local(&rel, "local");
            records.push(FileComparisonRecord::modified(rel.clone(), local, sites.remote.join(&rel), false));
        }
        let outside = sites.write_local("index.html", "x");
        records.push(FileComparisonRecord::added_locally("index.html", outside.clone(), false));

        let (mut registry, key) = registry_for(&sites, records.clone());
        let folder = build_tree(&records, SortMode::Path).find_folder("pages").unwrap().clone();

        let summary = DiscardEngine::new(3).discard_folder(&mut registry, &key, &folder).unwrap();
        assert_eq!(summary.total_count, 7);
        assert_eq!(summary.success_count, 5);
        assert_eq!(summary.failed_count(), 2);
        assert!(summary.is_partial_failure());

        let comparison = registry.get_comparison(&key).unwrap();
        let mut remaining: Vec<&str> = comparison.records.iter().map(|r| r.relative_path.as_str()).collect();
        remaining.sort();
        assert_eq!(remaining, vec!["index.html", "pages/p5.html", "pages/p6.html"]);
        assert!(outside.exists());
        assert_eq!(fs::read_to_string(sites.local.join("pages/p0.html")).unwrap(), "remote");
    }

    #[test]
    fn test_discard_folder_unknown_comparison() {
        let mut registry = ComparisonRegistry::new(Box::new(MemoryStore::new()));
        let result = DiscardEngine::new(1).discard_folder(
            &mut registry,
            &ComparisonKey::live("none", "none"),
            &FolderNode::default(),
        );
        assert!(matches!(result, Err(SiteDiffError::ComparisonNotFound(_))));
    }
}
