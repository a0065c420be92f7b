//! Site snapshot providers
//!
//! Fetching a remote site's content is environment specific. The engine only
//! needs a provider that can write a site's current tree into a directory.

use crate::error::{Result, SiteDiffError};
use crate::types::SiteId;
use crate::utils;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Writes the current content of a site into a local directory
pub trait SnapshotProvider: Send + Sync {
    /// Fetch `site` into `destination`
    ///
    /// `destination` exists and is empty when this is called. On error the
    /// caller discards whatever was written.
    fn fetch_snapshot(&self, site: &SiteId, destination: &Path) -> Result<()>;
}

/// Provider backed by local directories, one per site
///
/// Useful for mirrors, mounted shares and tests.
#[derive(Debug, Clone, Default)]
pub struct DirectorySnapshotProvider {
    sources: HashMap<SiteId, PathBuf>,
}

impl DirectorySnapshotProvider {
    /// Create a provider with no sites registered
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `site` from `directory`
    pub fn with_site(mut self, site: SiteId, directory: impl Into<PathBuf>) -> Self {
        self.add_site(site, directory);
        self
    }

    /// Serve `site` from `directory`, replacing any earlier mapping
    pub fn add_site(&mut self, site: SiteId, directory: impl Into<PathBuf>) {
        self.sources.insert(site, directory.into());
    }

    /// Directory serving `site`, if registered
    pub fn source_for(&self, site: &SiteId) -> Option<&Path> {
        self.sources.get(site).map(PathBuf::as_path)
    }
}

impl SnapshotProvider for DirectorySnapshotProvider {
    fn fetch_snapshot(&self, site: &SiteId, destination: &Path) -> Result<()> {
        let source = self
            .sources
            .get(site)
            .ok_or_else(|| SiteDiffError::snapshot_fetch(site.to_string(), "no source registered"))?;
        if !source.is_dir() {
            return Err(SiteDiffError::snapshot_fetch(
                site.to_string(),
                format!("source {:?} is not a directory", source),
            ));
        }
        let copied = utils::copy_dir_all(source, destination)
            .map_err(|e| SiteDiffError::snapshot_fetch(site.to_string(), e.to_string()))?;
        debug!("Fetched {} files for {} from {:?}", copied, site, source);
        Ok(())
    }
}
