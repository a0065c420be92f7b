//! # sitediff - Compare a local site copy against its remote snapshot
//!
//! A library for comparing a locally held copy of a content site against a
//! snapshot of the remote site, navigating the differences, and acting on
//! them.
//!
//! ## Overview
//!
//! sitediff turns two directory trees into a structured result set that you
//! can:
//! - Browse as a folder tree or a flat list, sorted by name, path or status
//! - Revert file by file or folder by folder to the remote state
//! - Export to a portable package and import on another machine
//! - Re-synchronize against the remote site
//! - Render as a single self-contained HTML report
//!
//! ## Architecture
//!
//! - **Comparison Registry**: owns every active comparison keyed by site and
//!   environment, persists the sort and view modes, and notifies listeners
//!   after every mutation
//! - **Tree Projection**: derives a folder hierarchy or a sorted list from a
//!   comparison on demand
//! - **Discard Engine**: applies reverts with per-file error accounting, so
//!   one locked file never blocks the rest of a folder
//! - **Interchange Codec**: a versioned JSON package with explicit schema
//!   validation on import
//! - **Resync Workflow**: fetches fresh snapshots through a
//!   [`SnapshotProvider`] and recomputes the comparison
//! - **Report Generator**: static HTML with unified diffs for text files
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sitediff::{ConflictDecision, DirectorySnapshotProvider, SiteDiff, SiteId, SiteNames, SortMode};
//! use std::path::{Path, PathBuf};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let site = SiteId::new("contoso", "prod");
//! let provider = DirectorySnapshotProvider::new().with_site(site.clone(), "/mnt/mirror/contoso");
//! let mut sitediff = SiteDiff::open(PathBuf::from("./.sitediff"), provider)?;
//!
//! // Compare the working copy against the remote site
//! let key = sitediff.compare_with_local(
//!     site,
//!     PathBuf::from("./contoso"),
//!     SiteNames::new("Contoso", "contoso-local", "Production"),
//! )?;
//!
//! // Sort by status and revert one folder
//! sitediff.set_sort_mode(SortMode::Status);
//! let summary = sitediff.discard_folder_path(&key, "web/css")?;
//! println!("Reverted {}/{} files", summary.success_count, summary.total_count);
//!
//! // Share the remaining differences
//! sitediff.export(&key, Path::new("contoso.json"))?;
//! sitediff.import(Path::new("colleague.json"), |_| ConflictDecision::Replace)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All operations return `Result<T, SiteDiffError>`. Batch operations
//! (folder discards, reports) never abort on a single file; their per-file
//! failures carry the offending relative path.
//!
//! ## Module Organization
//!
//! - [`types`]: records, comparisons, keys and modes
//! - [`registry`]: the comparison registry and change notification
//! - [`tree`]: tree and list projections
//! - [`discard`]: reverting local files
//! - [`interchange`]: package export, validation and import
//! - [`resync`]: live comparisons and resync
//! - [`report`]: HTML reports
//! - [`provider`]: snapshot providers
//! - [`store`]: persisted key-value state
//! - [`error`]: error types and handling

// Public API modules
pub mod config;
pub mod diff;
pub mod discard;
pub mod error;
pub mod interchange;
pub mod provider;
pub mod registry;
pub mod report;
pub mod resync;
pub mod scan;
pub mod sitediff;
pub mod store;
pub mod tree;
pub mod types;
pub mod utils;

// Re-export main types for convenience
pub use config::SiteDiffConfig;
pub use error::{ImportValidationError, Result, SiteDiffError};
pub use interchange::{ConflictDecision, ImportOutcome, InterchangePackage, FORMAT_VERSION};
pub use provider::{DirectorySnapshotProvider, SnapshotProvider};
pub use registry::{ChangeListener, ChangeNotice, ComparisonRegistry};
pub use resync::SiteNames;
pub use sitediff::{SiteDiff, SiteDiffBuilder};
pub use store::{JsonFileStore, MemoryStore, StateStore};
pub use tree::{FolderNode, Projection, TreeNode};
pub use types::*;
