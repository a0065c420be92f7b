//! Main SiteDiff implementation
//!
//! This module provides the [`SiteDiff`] struct, the entry point that ties
//! the comparison registry, the snapshot provider and the configuration
//! together.
//!
//! ## Overview
//!
//! `SiteDiff` coordinates several subsystems:
//!
//! - **Scanner**: walks local and remote trees and classifies differences
//! - **Registry**: owns the active comparisons and the display modes
//! - **Discard Engine**: reverts local files to their remote state
//! - **Interchange**: exports and imports portable packages
//! - **Report Generator**: renders comparisons as static HTML
//!
//! ## Examples
//!
//! ```rust,no_run
//! use sitediff::{DirectorySnapshotProvider, SiteDiffBuilder, SiteId, SiteNames};
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let site = SiteId::new("contoso", "prod");
//! let provider = DirectorySnapshotProvider::new().with_site(site.clone(), "/mnt/mirror/contoso");
//!
//! let mut sitediff = SiteDiffBuilder::new()
//!     .ignore_patterns(vec!["*.log".to_string()])
//!     .build(PathBuf::from("./.sitediff"), provider)?;
//!
//! let key = sitediff.compare_with_local(
//!     site,
//!     PathBuf::from("./contoso"),
//!     SiteNames::new("Contoso", "contoso-local", "Production"),
//! )?;
//! sitediff.write_report(&key, &PathBuf::from("report.html"))?;
//! # Ok(())
//! # }
//! ```

use crate::config::{SiteDiffConfig, CONFIG_FILE};
use crate::diff::DiffOptions;
use crate::discard::DiscardEngine;
use crate::error::{Result, SiteDiffError};
use crate::interchange::{self, ConflictDecision, ImportOutcome, InterchangePackage, PackageImporter};
use crate::provider::SnapshotProvider;
use crate::registry::{ChangeListener, ChangeNotice, ComparisonRegistry};
use crate::report::{self, ReportOptions};
use crate::resync::{ResyncWorkflow, SiteNames};
use crate::scan::SiteScanner;
use crate::store::{JsonFileStore, StateStore};
use crate::tree::{self, FolderNode, Projection};
use crate::types::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// File holding persisted registry state inside the state directory
pub const STATE_FILE: &str = "state.json";

/// Main entry point for comparison operations
pub struct SiteDiff {
    config: SiteDiffConfig,
    registry: ComparisonRegistry,
    provider: Box<dyn SnapshotProvider>,
    scanner: SiteScanner,
    discard: DiscardEngine,
    importer: PackageImporter,
}

impl std::fmt::Debug for SiteDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteDiff")
            .field("config", &self.config)
            .field("comparisons", &self.registry.len())
            .field("scanner", &self.scanner)
            .field("discard", &self.discard)
            .finish()
    }
}

impl SiteDiff {
    /// Open the state directory, reusing a saved config when present
    ///
    /// A missing `config.json` yields the default configuration, which is
    /// then saved.
    #[instrument(skip(provider))]
    pub fn open(state_dir: PathBuf, provider: impl SnapshotProvider + 'static) -> Result<Self> {
        let config_path = state_dir.join(CONFIG_FILE);
        let mut config = if config_path.exists() {
            SiteDiffConfig::load(&config_path)?
        } else {
            SiteDiffConfig::new(state_dir.clone())
        };
        // The directory may have moved since the config was written
        config.state_dir = state_dir;
        Self::init(config, provider)
    }

    /// Create an instance from a complete configuration
    ///
    /// Creates the state directories, saves the config and restores state
    /// from `state.json`.
    pub fn init(config: SiteDiffConfig, provider: impl SnapshotProvider + 'static) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.state_dir)?;
        fs::create_dir_all(&config.snapshot_root)?;
        fs::create_dir_all(&config.import_root)?;
        config.save(&config.state_dir.join(CONFIG_FILE))?;

        let store = JsonFileStore::open(config.state_dir.join(STATE_FILE))?;
        let instance = Self::with_store(config, Box::new(store), provider)?;
        info!(
            "Opened sitediff state at {:?} ({} comparisons)",
            instance.config.state_dir,
            instance.registry.len()
        );
        Ok(instance)
    }

    /// Create an instance over an arbitrary state store
    pub fn with_store(
        config: SiteDiffConfig,
        store: Box<dyn StateStore>,
        provider: impl SnapshotProvider + 'static,
    ) -> Result<Self> {
        config.validate()?;
        let scanner = SiteScanner::new(&config)?;
        let registry = ComparisonRegistry::with_persistence(store, config.persist_comparisons);
        Ok(Self {
            discard: DiscardEngine::new(config.parallel_workers),
            importer: PackageImporter::new(&config),
            provider: Box::new(provider),
            scanner,
            registry,
            config,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &SiteDiffConfig {
        &self.config
    }

    /// Read access to the registry
    pub fn registry(&self) -> &ComparisonRegistry {
        &self.registry
    }

    /// Subscribe to change notices through a channel
    pub fn subscribe(&mut self) -> mpsc::Receiver<ChangeNotice> {
        self.registry.subscribe()
    }

    /// Register a change listener
    pub fn add_listener(&mut self, listener: Box<dyn ChangeListener>) {
        self.registry.add_listener(listener);
    }

    fn comparison(&self, key: &ComparisonKey) -> Result<&SiteComparison> {
        self.registry
            .get_comparison(key)
            .ok_or_else(|| SiteDiffError::ComparisonNotFound(key.to_string()))
    }

    /// Compare a local directory against the remote site's current content
    #[instrument(skip(self, names))]
    pub fn compare_with_local(&mut self, remote: SiteId, local_root: PathBuf, names: SiteNames) -> Result<ComparisonKey> {
        let workflow = ResyncWorkflow::new(self.provider.as_ref(), &self.scanner, &self.config.snapshot_root);
        workflow.compare_with_local(&mut self.registry, remote, local_root, names)
    }

    /// Compare two environments of a site
    #[instrument(skip(self, names))]
    pub fn compare_with_environment(&mut self, remote: SiteId, local: SiteId, names: SiteNames) -> Result<ComparisonKey> {
        let workflow = ResyncWorkflow::new(self.provider.as_ref(), &self.scanner, &self.config.snapshot_root);
        workflow.compare_with_environment(&mut self.registry, remote, local, names)
    }

    /// Recompute a live comparison from fresh snapshots
    #[instrument(skip(self))]
    pub fn resync(&mut self, key: &ComparisonKey) -> Result<()> {
        let workflow = ResyncWorkflow::new(self.provider.as_ref(), &self.scanner, &self.config.snapshot_root);
        workflow.resync(&mut self.registry, key)
    }

    /// Look up a comparison
    pub fn get_comparison(&self, key: &ComparisonKey) -> Option<&SiteComparison> {
        self.registry.get_comparison(key)
    }

    /// All comparisons in display order
    pub fn comparisons(&self) -> impl Iterator<Item = &SiteComparison> {
        self.registry.comparisons()
    }

    /// Project a comparison with the current sort and view modes
    #[instrument(skip(self))]
    pub fn projection(&self, key: &ComparisonKey) -> Result<Projection> {
        let comparison = self.comparison(key)?;
        Ok(tree::project(
            &comparison.records,
            self.registry.sort_mode(),
            self.registry.view_mode(),
        ))
    }

    /// Folder hierarchy of a comparison with the current sort mode
    pub fn tree(&self, key: &ComparisonKey) -> Result<FolderNode> {
        let comparison = self.comparison(key)?;
        Ok(tree::build_tree(&comparison.records, self.registry.sort_mode()))
    }

    /// Current sort mode
    pub fn sort_mode(&self) -> SortMode {
        self.registry.sort_mode()
    }

    /// Current view mode
    pub fn view_mode(&self) -> ViewMode {
        self.registry.view_mode()
    }

    #[instrument(skip(self))]
    pub fn set_sort_mode(&mut self, mode: SortMode) {
        self.registry.set_sort_mode(mode);
    }

    #[instrument(skip(self))]
    pub fn set_view_mode(&mut self, mode: ViewMode) {
        self.registry.set_view_mode(mode);
    }

    /// Revert one record to its remote state and remove it
    pub fn discard_file(&mut self, key: &ComparisonKey, record: &FileComparisonRecord) -> Result<()> {
        self.discard_path(key, &record.relative_path)
    }

    /// Revert the record at `relative_path` and remove it
    #[instrument(skip(self))]
    pub fn discard_path(&mut self, key: &ComparisonKey, relative_path: &str) -> Result<()> {
        self.discard.discard_file(&mut self.registry, key, relative_path)
    }

    /// Revert every record beneath `folder`
    #[instrument(skip(self, folder), fields(folder = %folder.path))]
    pub fn discard_folder(&mut self, key: &ComparisonKey, folder: &FolderNode) -> Result<DiscardSummary> {
        let summary = self.discard.discard_folder(&mut self.registry, key, folder)?;
        if summary.is_partial_failure() {
            warn!(
                "Discarded {}/{} files under {:?}",
                summary.success_count, summary.total_count, folder.path
            );
        }
        Ok(summary)
    }

    /// Revert every record beneath the folder at `folder_path` (`""` is the root)
    pub fn discard_folder_path(&mut self, key: &ComparisonKey, folder_path: &str) -> Result<DiscardSummary> {
        let root = self.tree(key)?;
        let folder = root
            .find_folder(folder_path)
            .ok_or_else(|| SiteDiffError::InvalidPath(PathBuf::from(folder_path)))?;
        let folder = folder.clone();
        self.discard_folder(key, &folder)
    }

    /// Build the interchange package of a comparison
    pub fn export_package(&self, key: &ComparisonKey) -> Result<InterchangePackage> {
        Ok(interchange::export(self.comparison(key)?))
    }

    /// Write a comparison's package to `path`
    #[instrument(skip(self))]
    pub fn export(&self, key: &ComparisonKey, path: &Path) -> Result<InterchangePackage> {
        interchange::export_to_file(self.comparison(key)?, path)
    }

    /// Read, validate and register a package file
    #[instrument(skip(self, decide))]
    pub fn import<F>(&mut self, path: &Path, decide: F) -> Result<ImportOutcome>
    where
        F: FnOnce(&SiteComparison) -> ConflictDecision,
    {
        let package = interchange::read_package_file(path)?;
        self.import_package(&package, decide)
    }

    /// Register an already validated package
    pub fn import_package<F>(&mut self, package: &InterchangePackage, decide: F) -> Result<ImportOutcome>
    where
        F: FnOnce(&SiteComparison) -> ConflictDecision,
    {
        self.importer.import(&mut self.registry, package, decide)
    }

    fn report_options(&self) -> ReportOptions {
        ReportOptions {
            max_file_size: self.config.max_report_file_size,
            diff: DiffOptions::default(),
        }
    }

    /// Render a comparison as HTML in the current sort order
    #[instrument(skip(self))]
    pub fn report(&self, key: &ComparisonKey) -> Result<String> {
        let comparison = self.comparison(key)?;
        Ok(report::generate_report(comparison, self.registry.sort_mode(), &self.report_options()))
    }

    /// Render a comparison and write it to `path`
    #[instrument(skip(self))]
    pub fn write_report(&self, key: &ComparisonKey, path: &Path) -> Result<()> {
        let comparison = self.comparison(key)?;
        report::write_report(comparison, self.registry.sort_mode(), &self.report_options(), path)
    }

    /// Remove a comparison and the snapshot or import data it owns
    ///
    /// Operator owned local directories are never touched.
    #[instrument(skip(self))]
    pub fn remove_comparison(&mut self, key: &ComparisonKey) {
        self.remove_owned_data(key);
        self.registry.remove_comparison(key);
    }

    /// Remove every comparison
    #[instrument(skip(self))]
    pub fn clear_all(&mut self) {
        let keys: Vec<ComparisonKey> = self.registry.comparisons().map(|c| c.key.clone()).collect();
        for key in &keys {
            self.remove_owned_data(key);
        }
        self.registry.clear_all();
    }

    fn remove_owned_data(&self, key: &ComparisonKey) {
        let dir = match key {
            ComparisonKey::Live(_) => self.config.snapshot_root.join(key.slug()),
            ComparisonKey::Imported { .. } => self.config.import_root.join(key.slug()),
        };
        if dir.exists() {
            match fs::remove_dir_all(&dir) {
                Ok(()) => debug!("Removed {:?}", dir),
                Err(e) => warn!("Failed to remove {:?}: {}", dir, e),
            }
        }
    }
}

/// Builder for [`SiteDiff`] with custom configuration
///
/// # Examples
///
/// ```rust,no_run
/// use sitediff::{DirectorySnapshotProvider, SiteDiffBuilder};
/// use std::path::PathBuf;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let sitediff = SiteDiffBuilder::new()
///     .parallel_workers(4)
///     .max_report_file_size(256 * 1024)
///     .build(PathBuf::from("./.sitediff"), DirectorySnapshotProvider::new())?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct SiteDiffBuilder {
    ignore_patterns: Option<Vec<String>>,
    binary_extensions: Option<Vec<String>>,
    persist_comparisons: Option<bool>,
    parallel_workers: Option<usize>,
    max_report_file_size: Option<u64>,
    snapshot_root: Option<PathBuf>,
    import_root: Option<PathBuf>,
}

impl SiteDiffBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Glob patterns excluded from both trees
    ///
    /// ```rust
    /// use sitediff::SiteDiffBuilder;
    ///
    /// let builder = SiteDiffBuilder::new()
    ///     .ignore_patterns(vec!["*.log".to_string(), "cache/**".to_string()]);
    /// ```
    pub fn ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = Some(patterns);
        self
    }

    /// Extensions classified as binary, replacing the defaults
    pub fn binary_extensions(mut self, extensions: Vec<String>) -> Self {
        self.binary_extensions = Some(extensions);
        self
    }

    /// Keep the comparison set across restarts (default on)
    pub fn persist_comparisons(mut self, persist: bool) -> Self {
        self.persist_comparisons = Some(persist);
        self
    }

    /// Worker threads for hashing and folder discards
    pub fn parallel_workers(mut self, workers: usize) -> Self {
        self.parallel_workers = Some(workers);
        self
    }

    /// Files above this size render a placeholder in reports
    pub fn max_report_file_size(mut self, size: u64) -> Self {
        self.max_report_file_size = Some(size);
        self
    }

    pub fn snapshot_root(mut self, root: PathBuf) -> Self {
        self.snapshot_root = Some(root);
        self
    }

    pub fn import_root(mut self, root: PathBuf) -> Self {
        self.import_root = Some(root);
        self
    }

    /// Configuration for `state_dir` with the builder's overrides applied
    pub fn config(self, state_dir: PathBuf) -> SiteDiffConfig {
        let mut config = SiteDiffConfig::new(state_dir);
        if let Some(patterns) = self.ignore_patterns {
            config.ignore_patterns = patterns;
        }
        if let Some(extensions) = self.binary_extensions {
            config.binary_extensions = extensions.into_iter().map(|e| e.to_lowercase()).collect();
        }
        if let Some(persist) = self.persist_comparisons {
            config.persist_comparisons = persist;
        }
        if let Some(workers) = self.parallel_workers {
            config.parallel_workers = workers;
        }
        if let Some(size) = self.max_report_file_size {
            config.max_report_file_size = size;
        }
        if let Some(root) = self.snapshot_root {
            config.snapshot_root = root;
        }
        if let Some(root) = self.import_root {
            config.import_root = root;
        }
        config
    }

    /// Build the instance, saving its config in `state_dir`
    pub fn build(self, state_dir: PathBuf, provider: impl SnapshotProvider + 'static) -> Result<SiteDiff> {
        SiteDiff::init(self.config(state_dir), provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::DirectorySnapshotProvider;

    #[test]
    fn test_builder_overrides() {
        let config = SiteDiffBuilder::new()
            .ignore_patterns(vec!["*.log".to_string()])
            .binary_extensions(vec!["PNG".to_string()])
            .parallel_workers(2)
            .persist_comparisons(false)
            .max_report_file_size(10)
            .config(PathBuf::from("/state"));

        assert_eq!(config.ignore_patterns, vec!["*.log"]);
        assert_eq!(config.binary_extensions, vec!["png"]);
        assert_eq!(config.parallel_workers, 2);
        assert!(!config.persist_comparisons);
        assert_eq!(config.max_report_file_size, 10);
        assert_eq!(config.snapshot_root, PathBuf::from("/state/snapshots"));
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = SiteDiffBuilder::new()
            .parallel_workers(0)
            .build(dir.path().to_path_buf(), DirectorySnapshotProvider::new())
            .unwrap_err();
        assert!(matches!(err, SiteDiffError::InvalidConfiguration(_)));

        let err = SiteDiffBuilder::new()
            .ignore_patterns(vec!["[".to_string()])
            .build(dir.path().to_path_buf(), DirectorySnapshotProvider::new())
            .unwrap_err();
        assert!(matches!(err, SiteDiffError::InvalidPattern(_)));
    }

    #[test]
    fn test_open_reuses_saved_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let state = dir.path().join("state");
        SiteDiffBuilder::new()
            .max_report_file_size(42)
            .build(state.clone(), DirectorySnapshotProvider::new())
            .unwrap();

        let reopened = SiteDiff::open(state, DirectorySnapshotProvider::new()).unwrap();
        assert_eq!(reopened.config().max_report_file_size, 42);
    }

    #[test]
    fn test_unknown_comparison_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut sitediff =
            SiteDiff::open(dir.path().to_path_buf(), DirectorySnapshotProvider::new()).unwrap();
        let key = ComparisonKey::live("none", "none");

        assert!(matches!(sitediff.projection(&key), Err(SiteDiffError::ComparisonNotFound(_))));
        assert!(matches!(sitediff.report(&key), Err(SiteDiffError::ComparisonNotFound(_))));
        assert!(matches!(sitediff.resync(&key), Err(SiteDiffError::ComparisonNotFound(_))));
        assert!(matches!(
            sitediff.discard_path(&key, "a.txt"),
            Err(SiteDiffError::ComparisonNotFound(_))
        ));
    }
}
