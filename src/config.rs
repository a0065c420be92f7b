//! Engine configuration
//!
//! [`SiteDiffConfig`] collects every tunable the engine reads. It is plain
//! serde data so it can be persisted next to the registry state and loaded
//! again by the command-line front end.

use crate::error::{Result, SiteDiffError};
use crate::utils;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the persisted configuration inside the state directory
pub const CONFIG_FILE: &str = "config.json";

/// Extensions treated as binary unless overridden
pub const DEFAULT_BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "tif", "tiff", "psd",
    "woff", "woff2", "ttf", "otf", "eot",
    "zip", "gz", "tgz", "bz2", "7z", "rar", "tar",
    "mp3", "mp4", "wav", "ogg", "webm", "avi", "mov",
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx",
    "exe", "dll", "so", "dylib", "bin", "wasm",
];

/// Default upper bound for files rendered inline in a report (1 MiB)
pub const DEFAULT_MAX_REPORT_FILE_SIZE: u64 = 1024 * 1024;

/// Configuration for a [`SiteDiff`](crate::SiteDiff) instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteDiffConfig {
    /// Directory holding persisted state
    pub state_dir: PathBuf,
    /// Root under which one snapshot directory per site is kept
    pub snapshot_root: PathBuf,
    /// Root under which imported package content is materialized
    pub import_root: PathBuf,
    /// Glob patterns excluded from both trees when scanning
    pub ignore_patterns: Vec<String>,
    /// Extensions (without dot, lower case) classified as binary
    pub binary_extensions: Vec<String>,
    /// Persist the comparison set across restarts
    pub persist_comparisons: bool,
    /// Files larger than this render a placeholder in reports (0 = unlimited)
    pub max_report_file_size: u64,
    /// Worker threads for hashing and bulk file work
    pub parallel_workers: usize,
    /// sitediff version that wrote this config
    pub version: String,
}

impl SiteDiffConfig {
    /// Default configuration rooted at `state_dir`
    pub fn new(state_dir: PathBuf) -> Self {
        Self {
            snapshot_root: state_dir.join("snapshots"),
            import_root: state_dir.join("imports"),
            state_dir,
            ignore_patterns: Vec::new(),
            binary_extensions: DEFAULT_BINARY_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            persist_comparisons: true,
            max_report_file_size: DEFAULT_MAX_REPORT_FILE_SIZE,
            parallel_workers: num_cpus::get(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Check the configuration for values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.parallel_workers == 0 {
            return Err(SiteDiffError::InvalidConfiguration(
                "parallel_workers must be at least 1".to_string(),
            ));
        }
        if self.snapshot_root == self.import_root {
            return Err(SiteDiffError::InvalidConfiguration(
                "snapshot_root and import_root must differ".to_string(),
            ));
        }
        utils::build_glob_set(&self.ignore_patterns)?;
        Ok(())
    }

    /// Whether `path` is classified as binary by extension
    pub fn is_binary(&self, path: &str) -> bool {
        utils::has_extension_in(path, &self.binary_extensions)
    }

    /// Load a config previously written with [`SiteDiffConfig::save`]
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(self)?;
        utils::atomic_write(path, &json)
    }
}
