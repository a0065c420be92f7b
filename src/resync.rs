//! Live comparisons and resync
//!
//! A live comparison is computed from two trees: the remote environment's
//! snapshot, and either an operator owned directory or a second environment's
//! snapshot. Snapshots live under `<snapshot_root>/<key-slug>/`.
//!
//! Every fetch goes into a `*.staging` sibling first. The staged trees are
//! scanned, and only when every fetch and the scan have succeeded are the
//! snapshots swapped into place. A failed fetch or scan therefore leaves both
//! the previous snapshot and the registered comparison untouched.

use crate::error::{Result, SiteDiffError};
use crate::provider::SnapshotProvider;
use crate::registry::ComparisonRegistry;
use crate::scan::SiteScanner;
use crate::types::{ComparisonKey, FileComparisonRecord, LiveSource, LocalSide, Origin, SiteComparison, SiteId};
use crate::utils;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Display names attached to a comparison
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteNames {
    /// Display name of the remote site
    pub remote_site_name: String,
    /// Display name of the local site or second environment
    pub local_site_name: String,
    /// Display name of the environment being compared
    pub environment_name: String,
}

impl SiteNames {
    /// Bundle the three display names
    pub fn new(
        remote_site_name: impl Into<String>,
        local_site_name: impl Into<String>,
        environment_name: impl Into<String>,
    ) -> Self {
        Self {
            remote_site_name: remote_site_name.into(),
            local_site_name: local_site_name.into(),
            environment_name: environment_name.into(),
        }
    }

    fn of(comparison: &SiteComparison) -> Self {
        Self::new(
            comparison.remote_site_name.clone(),
            comparison.local_site_name.clone(),
            comparison.environment_name.clone(),
        )
    }
}

/// Runs live comparisons against a snapshot provider
pub struct ResyncWorkflow<'a> {
    provider: &'a dyn SnapshotProvider,
    scanner: &'a SiteScanner,
    snapshot_root: &'a Path,
}

impl<'a> ResyncWorkflow<'a> {
    /// Create a workflow storing snapshots under `snapshot_root`
    pub fn new(provider: &'a dyn SnapshotProvider, scanner: &'a SiteScanner, snapshot_root: &'a Path) -> Self {
        Self {
            provider,
            scanner,
            snapshot_root,
        }
    }

    /// Compare a local directory against the current content of `remote`
    pub fn compare_with_local(
        &self,
        registry: &mut ComparisonRegistry,
        remote: SiteId,
        local_root: PathBuf,
        names: SiteNames,
    ) -> Result<ComparisonKey> {
        let key = ComparisonKey::Live(remote.clone());
        let source = LiveSource {
            remote_root: self.snapshot_dir(&key).join("remote"),
            remote,
            local: LocalSide::Directory { root: local_root },
        };
        self.run(registry, key, source, names)
    }

    /// Compare two environments of a site, both fetched from the provider
    pub fn compare_with_environment(
        &self,
        registry: &mut ComparisonRegistry,
        remote: SiteId,
        local: SiteId,
        names: SiteNames,
    ) -> Result<ComparisonKey> {
        let key = ComparisonKey::Live(remote.clone());
        let dir = self.snapshot_dir(&key);
        let source = LiveSource {
            remote_root: dir.join("remote"),
            remote,
            local: LocalSide::Environment {
                site: local,
                root: dir.join("local"),
            },
        };
        self.run(registry, key, source, names)
    }

    /// Recompute an existing live comparison from fresh snapshots
    ///
    /// Imported comparisons are rejected before any I/O. When the fetch or
    /// the scan fails the existing comparison and its snapshot stay as they were.
    pub fn resync(&self, registry: &mut ComparisonRegistry, key: &ComparisonKey) -> Result<()> {
        let comparison = registry
            .get_comparison(key)
            .ok_or_else(|| SiteDiffError::ComparisonNotFound(key.to_string()))?;

        let source = match (&comparison.origin, &comparison.source) {
            (Origin::Live, Some(source)) => source.clone(),
            _ => {
                return Err(SiteDiffError::ResyncNotSupported {
                    key: key.to_string(),
                })
            }
        };
        let names = SiteNames::of(comparison);

        self.run(registry, key.clone(), source, names).map(|_| ())
    }

    fn snapshot_dir(&self, key: &ComparisonKey) -> PathBuf {
        self.snapshot_root.join(key.slug())
    }

    fn run(
        &self,
        registry: &mut ComparisonRegistry,
        key: ComparisonKey,
        source: LiveSource,
        names: SiteNames,
    ) -> Result<ComparisonKey> {
        let start = Instant::now();

        let mut fetches = vec![(&source.remote, source.remote_root.as_path())];
        if let LocalSide::Environment { site, root } = &source.local {
            fetches.push((site, root.as_path()));
        }
        let staged = stage_snapshots(self.provider, &fetches)?;

        // Targets change only on commit
        let records = self
            .scanner
            .compare(&staged.scan_root(source.local.root()), &staged.scan_root(&source.remote_root))?;
        let records = records
            .into_iter()
            .map(|record| staged.rebase_record(record))
            .collect();
        staged.commit()?;

        let comparison = SiteComparison::new(
            key.clone(),
            records,
            names.remote_site_name,
            names.local_site_name,
            names.environment_name,
            Origin::Live,
        )
        .with_source(source);

        info!(
            "Compared {}: {} differences in {:?}",
            key,
            comparison.records.len(),
            start.elapsed()
        );
        registry.insert_comparison(comparison);
        Ok(key)
    }
}

/// Snapshots fetched into `*.staging` siblings of their targets
///
/// Dropping the value without calling [`StagedSnapshots::commit`] removes the
/// staging directories and leaves the targets untouched.
#[derive(Debug)]
pub struct StagedSnapshots {
    /// `(staging, target)` pairs
    entries: Vec<(PathBuf, PathBuf)>,
    committed: bool,
}

impl StagedSnapshots {
    /// Directory to read for `target` until the snapshots are committed
    ///
    /// Paths that are not a staged target (an operator's local directory)
    /// are returned as they are.
    pub fn scan_root(&self, target: &Path) -> PathBuf {
        self.entries
            .iter()
            .find(|(_, t)| t == target)
            .map(|(staging, _)| staging.clone())
            .unwrap_or_else(|| target.to_path_buf())
    }

    fn rebase(&self, path: PathBuf) -> PathBuf {
        for (staging, target) in &self.entries {
            if let Ok(rest) = path.strip_prefix(staging) {
                return target.join(rest);
            }
        }
        path
    }

    /// Point a record scanned from staging at the committed locations
    pub fn rebase_record(&self, mut record: FileComparisonRecord) -> FileComparisonRecord {
        record.local_path = record.local_path.map(|p| self.rebase(p));
        record.remote_path = record.remote_path.map(|p| self.rebase(p));
        record
    }

    /// Swap every staged snapshot into place
    pub fn commit(mut self) -> Result<()> {
        for (staging, target) in &self.entries {
            if target.exists() {
                fs::remove_dir_all(target)?;
            }
            fs::rename(staging, target)?;
        }
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedSnapshots {
    fn drop(&mut self) {
        if !self.committed {
            let staged: Vec<PathBuf> = self.entries.iter().map(|(staging, _)| staging.clone()).collect();
            discard_staging(&staged);
        }
    }
}

/// Fetch every `(site, target)` pair into staging without touching the targets
pub fn stage_snapshots(provider: &dyn SnapshotProvider, fetches: &[(&SiteId, &Path)]) -> Result<StagedSnapshots> {
    let mut staged = StagedSnapshots {
        entries: Vec::with_capacity(fetches.len()),
        committed: false,
    };
    for (site, target) in fetches {
        let staging = staging_path(target)?;
        let fetched = utils::reset_dir(&staging).and_then(|_| provider.fetch_snapshot(site, &staging));
        staged.entries.push((staging, target.to_path_buf()));
        if let Err(e) = fetched {
            warn!("Snapshot fetch for {} failed: {}", site, e);
            return Err(e);
        }
        debug!("Staged snapshot for {} in {:?}", site, staged.entries.last());
    }
    Ok(staged)
}

fn staging_path(target: &Path) -> Result<PathBuf> {
    let name = target
        .file_name()
        .ok_or_else(|| SiteDiffError::InvalidPath(target.to_path_buf()))?;
    let mut staging_name = name.to_os_string();
    staging_name.push(".staging");
    Ok(target.with_file_name(staging_name))
}

fn discard_staging(staged: &[PathBuf]) {
    for dir in staged {
        if dir.exists() {
            if let Err(e) = fs::remove_dir_all(dir) {
                warn!("Failed to remove staging dir {:?}: {}", dir, e);
            }
        }
    }
}
