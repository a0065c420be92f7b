//! Core data types used throughout the sitediff library
//!
//! This module contains the comparison record model shared by every other
//! component.
//!
//! ## Overview
//!
//! The types in this module represent:
//! - **Compared files**: `FileComparisonRecord`, `FileStatus` - one classified difference
//! - **Comparison runs**: `SiteComparison`, `ComparisonKey`, `Origin`, `LiveSource`
//! - **Display policy**: `SortMode`, `ViewMode` - persisted operator preferences
//! - **Operation results**: `StatusCounts`, `DiscardSummary`, `DiscardFailure`
//!
//! ## Examples
//!
//! ```rust
//! use sitediff::types::{FileComparisonRecord, FileStatus};
//! use std::path::PathBuf;
//!
//! let record = FileComparisonRecord::added_locally(
//!     "assets/logo.png",
//!     PathBuf::from("/work/site/assets/logo.png"),
//!     true,
//! );
//! assert_eq!(record.status, FileStatus::AddedLocally);
//! assert!(record.remote_path.is_none());
//! assert_eq!(record.file_name(), "logo.png");
//! ```

use crate::error::SiteDiffError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// How a file differs between the local copy and the remote snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FileStatus {
    /// Present on both sides with different content
    Modified,
    /// Present only locally
    AddedLocally,
    /// Present only remotely
    DeletedLocally,
}

impl FileStatus {
    /// Fixed ordering used by [`SortMode::Status`]
    pub fn rank(self) -> u8 {
        match self {
            FileStatus::Modified => 0,
            FileStatus::AddedLocally => 1,
            FileStatus::DeletedLocally => 2,
        }
    }

    /// Wire name used in interchange packages
    pub fn as_str(self) -> &'static str {
        match self {
            FileStatus::Modified => "modified",
            FileStatus::AddedLocally => "addedLocally",
            FileStatus::DeletedLocally => "deletedLocally",
        }
    }

    /// Human label for reports and the CLI
    pub fn label(self) -> &'static str {
        match self {
            FileStatus::Modified => "Modified",
            FileStatus::AddedLocally => "Added locally",
            FileStatus::DeletedLocally => "Deleted locally",
        }
    }
}

impl FromStr for FileStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "modified" => Ok(FileStatus::Modified),
            "addedLocally" => Ok(FileStatus::AddedLocally),
            "deletedLocally" => Ok(FileStatus::DeletedLocally),
            other => Err(format!("unknown status `{}`", other)),
        }
    }
}

/// One compared file
///
/// `relative_path` is POSIX-style and unique within a comparison; it is the
/// key for every lookup and mutation. A record with status `AddedLocally`
/// has no `remote_path`, `DeletedLocally` has no `local_path`, and
/// `Modified` has both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileComparisonRecord {
    /// POSIX relative path from the site root
    pub relative_path: String,
    /// Absolute location of the local side
    pub local_path: Option<PathBuf>,
    /// Absolute location of the remote side
    pub remote_path: Option<PathBuf>,
    /// Classified difference
    pub status: FileStatus,
    /// Extension based binary classification
    pub is_binary: bool,
    /// Content was not captured (binary entries of imported comparisons)
    #[serde(default)]
    pub content_unavailable: bool,
}

impl FileComparisonRecord {
    /// Record for a file present on both sides with different content
    pub fn modified(
        relative_path: impl Into<String>,
        local_path: PathBuf,
        remote_path: PathBuf,
        is_binary: bool,
    ) -> Self {
        Self {
            relative_path: relative_path.into(),
            local_path: Some(local_path),
            remote_path: Some(remote_path),
            status: FileStatus::Modified,
            is_binary,
            content_unavailable: false,
        }
    }

    /// Record for a file that only exists locally
    pub fn added_locally(relative_path: impl Into<String>, local_path: PathBuf, is_binary: bool) -> Self {
        Self {
            relative_path: relative_path.into(),
            local_path: Some(local_path),
            remote_path: None,
            status: FileStatus::AddedLocally,
            is_binary,
            content_unavailable: false,
        }
    }

    /// Record for a file that only exists remotely
    pub fn deleted_locally(relative_path: impl Into<String>, remote_path: PathBuf, is_binary: bool) -> Self {
        Self {
            relative_path: relative_path.into(),
            local_path: None,
            remote_path: Some(remote_path),
            status: FileStatus::DeletedLocally,
            is_binary,
            content_unavailable: false,
        }
    }

    /// Final path segment
    pub fn file_name(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
    }

    /// Folder segments leading to the file (empty for root-level files)
    pub fn folder_segments(&self) -> Vec<&str> {
        let mut segments: Vec<&str> = self.relative_path.split('/').collect();
        segments.pop();
        segments
    }

    /// Whether the presence of both paths agrees with the status
    pub fn is_consistent(&self) -> bool {
        match self.status {
            FileStatus::Modified => self.local_path.is_some() && self.remote_path.is_some(),
            FileStatus::AddedLocally => self.local_path.is_some() && self.remote_path.is_none(),
            FileStatus::DeletedLocally => self.local_path.is_none() && self.remote_path.is_some(),
        }
    }
}

/// Identity of one environment of one remote site
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SiteId {
    /// Website identifier
    pub website_id: String,
    /// Environment identifier
    pub environment_id: String,
}

impl SiteId {
    /// Create a new site id
    pub fn new(website_id: impl Into<String>, environment_id: impl Into<String>) -> Self {
        Self {
            website_id: website_id.into(),
            environment_id: environment_id.into(),
        }
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.website_id, self.environment_id)
    }
}

const SLUG_PREFIX_CHARS: usize = 48;
const SLUG_DIGEST_CHARS: usize = 32;

/// Key a comparison is registered under
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ComparisonKey {
    /// Comparison produced by a live compare against a site
    Live(SiteId),
    /// Synthetic key of an imported package
    Imported {
        /// Remote site name recorded in the package
        remote_site_name: String,
        /// Environment name recorded in the package
        environment_name: String,
    },
}

impl ComparisonKey {
    /// Key for a live comparison
    pub fn live(website_id: impl Into<String>, environment_id: impl Into<String>) -> Self {
        ComparisonKey::Live(SiteId::new(website_id, environment_id))
    }

    /// File system safe form of the key, used for snapshot and import directories
    ///
    /// A readable prefix is followed by a digest of the exact key fields, so
    /// keys that sanitize to the same prefix still get distinct directories.
    pub fn slug(&self) -> String {
        let (kind, first, second) = match self {
            ComparisonKey::Live(site) => ("live", &site.website_id, &site.environment_id),
            ComparisonKey::Imported {
                remote_site_name,
                environment_name,
            } => ("imported", remote_site_name, environment_name),
        };

        let mut hasher = Sha256::new();
        for part in [kind, first.as_str(), second.as_str()] {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        let digest = hex::encode(hasher.finalize());

        let readable: String = format!("{}-{}", first, second)
            .chars()
            .take(SLUG_PREFIX_CHARS)
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        format!("{}-{}-{}", kind, readable, &digest[..SLUG_DIGEST_CHARS])
    }
}

impl fmt::Display for ComparisonKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparisonKey::Live(site) => write!(f, "{}", site),
            ComparisonKey::Imported {
                remote_site_name,
                environment_name,
            } => write!(f, "imported:{}/{}", remote_site_name, environment_name),
        }
    }
}

/// Where a comparison came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Origin {
    /// Computed from a local tree and a fetched snapshot
    Live,
    /// Reconstructed from an interchange package
    Imported,
}

/// Local side of a live comparison
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LocalSide {
    /// An operator owned working directory
    Directory {
        /// Root of the local copy
        root: PathBuf,
    },
    /// Snapshot of another environment of the same site
    Environment {
        /// Environment the snapshot is fetched from
        site: SiteId,
        /// Where the snapshot is stored
        root: PathBuf,
    },
}

impl LocalSide {
    /// Root directory of the local tree
    pub fn root(&self) -> &PathBuf {
        match self {
            LocalSide::Directory { root } | LocalSide::Environment { root, .. } => root,
        }
    }
}

/// Everything needed to recompute a live comparison
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveSource {
    /// Remote environment
    pub remote: SiteId,
    /// Snapshot directory of the remote environment
    pub remote_root: PathBuf,
    /// Local side
    pub local: LocalSide,
}

/// One comparison run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteComparison {
    /// Key the comparison is registered under
    pub key: ComparisonKey,
    /// Display name of the remote site
    pub remote_site_name: String,
    /// Display name of the local site
    pub local_site_name: String,
    /// Display name of the environment
    pub environment_name: String,
    /// Records in insertion order, unique by relative path
    pub records: Vec<FileComparisonRecord>,
    /// Live or imported
    pub origin: Origin,
    /// Import timestamp (imported comparisons only)
    pub imported_at: Option<DateTime<Utc>>,
    /// Source trees (live comparisons only)
    pub source: Option<LiveSource>,
    /// Root of the local tree discards write into
    pub local_root: Option<PathBuf>,
    /// When this record set was computed or imported
    pub created_at: DateTime<Utc>,
}

impl SiteComparison {
    /// Create a comparison, collapsing duplicate relative paths
    ///
    /// A later record with an already seen path replaces the earlier one in
    /// its original position.
    pub fn new(
        key: ComparisonKey,
        records: Vec<FileComparisonRecord>,
        remote_site_name: impl Into<String>,
        local_site_name: impl Into<String>,
        environment_name: impl Into<String>,
        origin: Origin,
    ) -> Self {
        let mut unique: Vec<FileComparisonRecord> = Vec::with_capacity(records.len());
        for record in records {
            match unique.iter_mut().find(|r| r.relative_path == record.relative_path) {
                Some(existing) => *existing = record,
                None => unique.push(record),
            }
        }

        let now = Utc::now();
        Self {
            key,
            remote_site_name: remote_site_name.into(),
            local_site_name: local_site_name.into(),
            environment_name: environment_name.into(),
            records: unique,
            origin,
            imported_at: (origin == Origin::Imported).then_some(now),
            source: None,
            local_root: None,
            created_at: now,
        }
    }

    /// Attach the live source trees
    pub fn with_source(mut self, source: LiveSource) -> Self {
        self.local_root = Some(source.local.root().clone());
        self.source = Some(source);
        self
    }

    /// Set the local root without a live source
    pub fn with_local_root(mut self, root: PathBuf) -> Self {
        self.local_root = Some(root);
        self
    }

    /// Look up a record by relative path
    pub fn record(&self, relative_path: &str) -> Option<&FileComparisonRecord> {
        self.records.iter().find(|r| r.relative_path == relative_path)
    }

    /// Remove a record by relative path, returning it if present
    pub fn remove_record(&mut self, relative_path: &str) -> Option<FileComparisonRecord> {
        let idx = self.records.iter().position(|r| r.relative_path == relative_path)?;
        Some(self.records.remove(idx))
    }

    /// No differences remain
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Count records by status
    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for record in &self.records {
            match record.status {
                FileStatus::Modified => counts.modified += 1,
                FileStatus::AddedLocally => counts.added_locally += 1,
                FileStatus::DeletedLocally => counts.deleted_locally += 1,
            }
        }
        counts
    }

    /// Whether resync is possible
    pub fn can_resync(&self) -> bool {
        self.origin == Origin::Live && self.source.is_some()
    }
}

/// Record counts by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    /// Number of modified files
    pub modified: usize,
    /// Number of files only present locally
    pub added_locally: usize,
    /// Number of files only present remotely
    pub deleted_locally: usize,
}

impl StatusCounts {
    /// Total number of differences
    pub fn total(&self) -> usize {
        self.modified + self.added_locally + self.deleted_locally
    }
}

/// Sort policy for projections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortMode {
    /// Case-insensitive final path segment
    Name,
    /// Case-insensitive full relative path
    #[default]
    Path,
    /// Modified, then added, then deleted; ties by path
    Status,
}

impl SortMode {
    /// Value stored in the persistent store
    pub fn as_str(self) -> &'static str {
        match self {
            SortMode::Name => "name",
            SortMode::Path => "path",
            SortMode::Status => "status",
        }
    }
}

impl FromStr for SortMode {
    type Err = SiteDiffError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "name" => Ok(SortMode::Name),
            "path" => Ok(SortMode::Path),
            "status" => Ok(SortMode::Status),
            other => Err(SiteDiffError::custom(format!("unknown sort mode `{}`", other))),
        }
    }
}

/// Presentation shape of a comparison
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ViewMode {
    /// Folder hierarchy
    Tree,
    /// Flat record list
    #[default]
    List,
}

impl ViewMode {
    /// Value stored in the persistent store
    pub fn as_str(self) -> &'static str {
        match self {
            ViewMode::Tree => "tree",
            ViewMode::List => "list",
        }
    }
}

impl FromStr for ViewMode {
    type Err = SiteDiffError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tree" => Ok(ViewMode::Tree),
            "list" => Ok(ViewMode::List),
            other => Err(SiteDiffError::custom(format!("unknown view mode `{}`", other))),
        }
    }
}

/// A file that could not be reverted during a batch discard
#[derive(Debug)]
pub struct DiscardFailure {
    /// Relative path of the failed record
    pub relative_path: String,
    /// Why it failed
    pub error: SiteDiffError,
}

/// Result of a folder discard
///
/// A non-empty `errors` list is a partial failure, not a fatal one: every
/// successful file has already been reverted and removed from the comparison.
#[derive(Debug, Default)]
pub struct DiscardSummary {
    /// Files reverted and removed from the comparison
    pub success_count: usize,
    /// Files attempted
    pub total_count: usize,
    /// One entry per failed file
    pub errors: Vec<DiscardFailure>,
}

impl DiscardSummary {
    /// Some but not necessarily all files failed
    pub fn is_partial_failure(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Number of failed files
    pub fn failed_count(&self) -> usize {
        self.errors.len()
    }
}
