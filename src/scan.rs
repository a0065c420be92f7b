//! Tree scanning and difference classification
//!
//! This module provides the comparison routine shared by the initial
//! compare and by resync: both trees are walked, every relative path is
//! classified by presence on each side, and paths present on both sides are
//! compared by content hash.
//!
//! ## Classification
//!
//! | local | remote | content | result |
//! |-------|--------|---------|--------|
//! | yes   | yes    | equal   | no record |
//! | yes   | yes    | differs | `Modified` |
//! | yes   | no     |         | `AddedLocally` |
//! | no    | yes    |         | `DeletedLocally` |
//!
//! Records come back ordered by relative path. Content hashing of paths
//! present on both sides runs on a bounded rayon pool.
//!
//! ## Example
//!
//! ```rust,ignore
//! use sitediff::scan::SiteScanner;
//! use sitediff::config::SiteDiffConfig;
//!
//! let scanner = SiteScanner::new(&SiteDiffConfig::new("/state".into()))?;
//! let records = scanner.compare("/work/site".as_ref(), "/state/snapshots/site".as_ref())?;
//! ```

use crate::config::SiteDiffConfig;
use crate::error::{Result, SiteDiffError};
use crate::types::FileComparisonRecord;
use crate::utils;
use globset::GlobSet;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Walks a local and a remote tree and classifies their differences
pub struct SiteScanner {
    ignore: GlobSet,
    binary_extensions: Vec<String>,
    parallel_workers: usize,
}

impl std::fmt::Debug for SiteScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteScanner")
            .field("ignore_patterns", &self.ignore.len())
            .field("binary_extensions", &self.binary_extensions.len())
            .field("parallel_workers", &self.parallel_workers)
            .finish()
    }
}

impl SiteScanner {
    /// Create a scanner from the engine configuration
    pub fn new(config: &SiteDiffConfig) -> Result<Self> {
        Ok(Self {
            ignore: utils::build_glob_set(&config.ignore_patterns)?,
            binary_extensions: config.binary_extensions.clone(),
            parallel_workers: config.parallel_workers.max(1),
        })
    }

    /// List every regular file under `root`, keyed by relative POSIX path
    ///
    /// Symbolic links are not followed and ignored paths are skipped.
    pub fn list_files(&self, root: &Path) -> Result<BTreeMap<String, PathBuf>> {
        if !root.is_dir() {
            return Err(SiteDiffError::InvalidPath(root.to_path_buf()));
        }

        let mut files = BTreeMap::new();
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = utils::to_posix_relative(entry.path(), root)?;
            if self.ignore.is_match(&relative) {
                trace!("Ignoring {}", relative);
                continue;
            }
            files.insert(relative, entry.path().to_path_buf());
        }
        Ok(files)
    }

    /// Compare two trees and return one record per differing path
    pub fn compare(&self, local_root: &Path, remote_root: &Path) -> Result<Vec<FileComparisonRecord>> {
        let start = Instant::now();
        let local = self.list_files(local_root)?;
        let remote = self.list_files(remote_root)?;

        let shared: Vec<(&String, &PathBuf, &PathBuf)> = local
            .iter()
            .filter_map(|(rel, local_path)| remote.get(rel).map(|remote_path| (rel, local_path, remote_path)))
            .collect();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.parallel_workers)
            .build()
            .map_err(|e| SiteDiffError::internal(format!("failed to build scan pool: {}", e)))?;

        let changed: BTreeSet<&String> = pool.install(|| {
            shared
                .par_iter()
                .map(|(rel, local_path, remote_path)| {
                    utils::files_equal(local_path, remote_path).map(|equal| (!equal).then_some(*rel))
                })
                .collect::<Result<Vec<_>>>()
        })?
        .into_iter()
        .flatten()
        .collect();

        let all_paths: BTreeSet<&String> = local.keys().chain(remote.keys()).collect();
        let mut records = Vec::new();
        for rel in all_paths {
            let is_binary = utils::has_extension_in(rel, &self.binary_extensions);
            let record = match (local.get(rel), remote.get(rel)) {
                (Some(local_path), Some(remote_path)) => {
                    if !changed.contains(rel) {
                        continue;
                    }
                    FileComparisonRecord::modified(rel.clone(), local_path.clone(), remote_path.clone(), is_binary)
                }
                (Some(local_path), None) => {
                    FileComparisonRecord::added_locally(rel.clone(), local_path.clone(), is_binary)
                }
                (None, Some(remote_path)) => {
                    FileComparisonRecord::deleted_locally(rel.clone(), remote_path.clone(), is_binary)
                }
                (None, None) => continue,
            };
            records.push(record);
        }

        debug!(
            "Compared {} local and {} remote files in {:?}: {} differences",
            local.len(),
            remote.len(),
            start.elapsed(),
            records.len()
        );
        Ok(records)
    }
}
