//! Interchange packages
//!
//! A comparison can be exported to a portable, versioned JSON package and
//! imported on another machine that has no access to the original trees.
//!
//! ## Package format
//!
//! ```text
//! {
//!   "formatVersion": 1,
//!   "remoteSiteName": "Contoso",
//!   "localSiteName": "contoso-local",
//!   "environmentName": "Production",
//!   "exportedAt": "2026-10-14T09:30:00Z",
//!   "records": [
//!     { "relativePath": "a/b.txt", "status": "modified",
//!       "contentUnavailable": false, "content": "...", "localContent": "..." },
//!     { "relativePath": "a/c.png", "status": "addedLocally",
//!       "contentUnavailable": true }
//!   ]
//! }
//! ```
//!
//! `content` is the remote-side text and `localContent` the local-side
//! text. Binary records carry neither and are flagged `contentUnavailable`.
//! Unknown fields are ignored on read and optional fields may be absent, so
//! packages written by older versions stay readable.
//!
//! ## Validation
//!
//! Imports are validated before any field is trusted: required fields first
//! (`formatVersion`, `remoteSiteName`, `records`, in that order), then the
//! format version, then each record, then the record paths as a set (no
//! duplicates, no path that is also another record's folder). A rejected
//! package creates no state.

use crate::config::SiteDiffConfig;
use crate::error::{ImportValidationError, Result};
use crate::registry::ComparisonRegistry;
use crate::types::{ComparisonKey, FileComparisonRecord, FileStatus, Origin, SiteComparison};
use crate::utils;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Package format written by this version
pub const FORMAT_VERSION: u32 = 1;

/// Oldest package format this version reads
pub const MIN_FORMAT_VERSION: u32 = 1;

const REQUIRED_FIELDS: &[&str] = &["formatVersion", "remoteSiteName", "records"];

/// Portable serialized form of a comparison
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterchangePackage {
    /// Package format version
    pub format_version: u32,
    /// Display name of the remote site
    pub remote_site_name: String,
    /// Display name of the local site
    #[serde(default)]
    pub local_site_name: String,
    /// Display name of the environment
    #[serde(default)]
    pub environment_name: String,
    /// When the package was written
    #[serde(default)]
    pub exported_at: Option<DateTime<Utc>>,
    /// One entry per compared file
    pub records: Vec<PackageRecord>,
}

/// One record inside a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRecord {
    /// POSIX relative path
    pub relative_path: String,
    /// Classified difference
    pub status: FileStatus,
    /// Content was not captured
    #[serde(default)]
    pub content_unavailable: bool,
    /// Remote-side text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Local-side text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_content: Option<String>,
}

impl InterchangePackage {
    /// Key an imported package is registered under
    pub fn key(&self) -> ComparisonKey {
        ComparisonKey::Imported {
            remote_site_name: self.remote_site_name.clone(),
            environment_name: self.environment_name.clone(),
        }
    }
}

/// What to do when an import would replace an existing comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictDecision {
    /// Replace the existing comparison
    Replace,
    /// Keep the existing comparison and abandon the import
    Keep,
}

/// Result of an import
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    /// The package is now registered under the key
    Imported(ComparisonKey),
    /// An existing comparison was kept; nothing changed
    Kept(ComparisonKey),
}

/// Build a package from a comparison
///
/// Text content is read from the comparison's files now, because the
/// original files may not be reachable later. A text file that cannot be read
/// (missing, or not UTF-8) is exported as `contentUnavailable`.
pub fn export(comparison: &SiteComparison) -> InterchangePackage {
    let records = comparison
        .records
        .iter()
        .map(|record| {
            if record.is_binary || record.content_unavailable {
                return PackageRecord {
                    relative_path: record.relative_path.clone(),
                    status: record.status,
                    content_unavailable: true,
                    content: None,
                    local_content: None,
                };
            }

            let content = read_side(record.remote_path.as_deref(), &record.relative_path);
            let local_content = read_side(record.local_path.as_deref(), &record.relative_path);
            let content_unavailable =
                matches!(content, Some(None)) || matches!(local_content, Some(None));

            PackageRecord {
                relative_path: record.relative_path.clone(),
                status: record.status,
                content_unavailable,
                content: content.flatten(),
                local_content: local_content.flatten(),
            }
        })
        .collect();

    InterchangePackage {
        format_version: FORMAT_VERSION,
        remote_site_name: comparison.remote_site_name.clone(),
        local_site_name: comparison.local_site_name.clone(),
        environment_name: comparison.environment_name.clone(),
        exported_at: Some(Utc::now()),
        records,
    }
}

/// `None` when the side does not exist, `Some(None)` when it could not be read
fn read_side(path: Option<&Path>, relative_path: &str) -> Option<Option<String>> {
    let path = path?;
    match fs::read_to_string(path) {
        Ok(text) => Some(Some(text)),
        Err(e) => {
            warn!("Exporting {} without content: {}", relative_path, e);
            Some(None)
        }
    }
}

/// Write a comparison's package to `path` as pretty JSON
pub fn export_to_file(comparison: &SiteComparison, path: &Path) -> Result<InterchangePackage> {
    let package = export(comparison);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec_pretty(&package)?;
    utils::atomic_write(path, &json)?;
    info!(
        "Exported {} records of {} to {:?}",
        package.records.len(),
        comparison.key,
        path
    );
    Ok(package)
}

/// Read and validate a package file
pub fn read_package_file(path: &Path) -> Result<InterchangePackage> {
    let content = fs::read_to_string(path)?;
    parse_package(&content)
}

/// Validate and decode a package document
pub fn parse_package(json: &str) -> Result<InterchangePackage> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| ImportValidationError::Malformed(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| ImportValidationError::Malformed("package is not a JSON object".to_string()))?;

    for field in REQUIRED_FIELDS {
        if !object.contains_key(*field) {
            return Err(ImportValidationError::MissingField {
                field: (*field).to_string(),
            }
            .into());
        }
    }

    let version = object["formatVersion"]
        .as_i64()
        .ok_or_else(|| wrong_type("formatVersion", "an integer"))?;
    if version > i64::from(FORMAT_VERSION) || version < i64::from(MIN_FORMAT_VERSION) {
        return Err(ImportValidationError::UnsupportedVersion {
            found: version,
            max_supported: FORMAT_VERSION,
        }
        .into());
    }

    if !object["remoteSiteName"].is_string() {
        return Err(wrong_type("remoteSiteName", "a string").into());
    }
    let records = object["records"]
        .as_array()
        .ok_or_else(|| wrong_type("records", "an array"))?;

    let mut seen = HashSet::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        let relative_path = validate_record(index, record)?;
        if !seen.insert(relative_path) {
            return Err(ImportValidationError::DuplicatePath {
                relative_path: relative_path.to_string(),
            }
            .into());
        }
    }
    check_folder_conflicts(&seen)?;

    let package: InterchangePackage = serde_json::from_value(value.clone())
        .map_err(|e| ImportValidationError::Malformed(e.to_string()))?;
    debug!(
        "Validated package v{} for {} with {} records",
        package.format_version,
        package.remote_site_name,
        package.records.len()
    );
    Ok(package)
}

/// Reject a record path that is also an ancestor folder of another record
fn check_folder_conflicts(paths: &HashSet<&str>) -> std::result::Result<(), ImportValidationError> {
    let mut nested: Vec<&str> = paths.iter().copied().collect();
    nested.sort_unstable();
    for path in nested {
        let mut folders = path.match_indices('/').map(|(at, _)| &path[..at]);
        if let Some(folder) = folders.find(|folder| paths.contains(folder)) {
            return Err(ImportValidationError::PathConflict {
                relative_path: folder.to_string(),
                nested_path: path.to_string(),
            });
        }
    }
    Ok(())
}

fn wrong_type(field: &str, expected: &'static str) -> ImportValidationError {
    ImportValidationError::WrongType {
        field: field.to_string(),
        expected,
    }
}

fn validate_record(index: usize, record: &Value) -> std::result::Result<&str, ImportValidationError> {
    let invalid = |reason: String| ImportValidationError::InvalidRecord { index, reason };
    let object: &Map<String, Value> = record
        .as_object()
        .ok_or_else(|| invalid("not an object".to_string()))?;

    let relative_path = object
        .get("relativePath")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("missing string field `relativePath`".to_string()))?;
    utils::join_relative(Path::new(""), relative_path)
        .map_err(|_| invalid(format!("unsafe relative path `{}`", relative_path)))?;

    let status = object
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("missing string field `status`".to_string()))?;
    status.parse::<FileStatus>().map_err(invalid)?;

    Ok(relative_path)
}

/// Turns validated packages into imported comparisons
#[derive(Debug, Clone)]
pub struct PackageImporter {
    import_root: PathBuf,
    binary_extensions: Vec<String>,
}

impl PackageImporter {
    /// Create an importer writing materialized content under the config's import root
    pub fn new(config: &SiteDiffConfig) -> Self {
        Self {
            import_root: config.import_root.clone(),
            binary_extensions: config.binary_extensions.clone(),
        }
    }

    /// Register `package` as an imported comparison
    ///
    /// When a comparison already exists under the package's key, `decide` is
    /// asked whether to replace it; on [`ConflictDecision::Keep`] nothing is
    /// written.
    pub fn import<F>(
        &self,
        registry: &mut ComparisonRegistry,
        package: &InterchangePackage,
        decide: F,
    ) -> Result<ImportOutcome>
    where
        F: FnOnce(&SiteComparison) -> ConflictDecision,
    {
        let key = package.key();
        if let Some(existing) = registry.get_comparison(&key) {
            if decide(existing) == ConflictDecision::Keep {
                info!("Kept existing comparison {}", key);
                return Ok(ImportOutcome::Kept(key));
            }
        }

        let comparison = self.materialize(package)?;
        info!(
            "Imported {} records as {}",
            comparison.records.len(),
            comparison.key
        );
        registry.insert_comparison(comparison);
        Ok(ImportOutcome::Imported(key))
    }

    /// Write package content to disk and build the comparison
    ///
    /// Content is written to a `*.staging` sibling of the comparison's import
    /// directory and swapped in only once every record has been written, so a
    /// failure leaves any earlier import of the same key intact.
    pub fn materialize(&self, package: &InterchangePackage) -> Result<SiteComparison> {
        let key = package.key();
        let slug = key.slug();
        let dir = self.import_root.join(&slug);
        let staging = self.import_root.join(format!("{}.staging", slug));
        utils::reset_dir(&staging)?;

        let records = match self.write_records(package, &staging, &dir) {
            Ok(records) => records,
            Err(e) => {
                warn!("Import of {} failed, discarding staged content: {}", key, e);
                remove_staging(&staging);
                return Err(e);
            }
        };

        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::rename(&staging, &dir)?;

        let comparison = SiteComparison::new(
            key,
            records,
            package.remote_site_name.clone(),
            package.local_site_name.clone(),
            package.environment_name.clone(),
            Origin::Imported,
        );
        Ok(comparison.with_local_root(dir.join("local")))
    }

    /// Write content under `write_dir` and return records addressed under `final_dir`
    fn write_records(
        &self,
        package: &InterchangePackage,
        write_dir: &Path,
        final_dir: &Path,
    ) -> Result<Vec<FileComparisonRecord>> {
        let sides = [
            (write_dir.join("remote"), final_dir.join("remote")),
            (write_dir.join("local"), final_dir.join("local")),
        ];
        for (write_root, _) in &sides {
            fs::create_dir_all(write_root)?;
        }
        let [remote, local] = &sides;

        let mut records = Vec::with_capacity(package.records.len());
        for entry in &package.records {
            let rel = entry.relative_path.as_str();
            let has_remote = entry.status != FileStatus::AddedLocally;
            let has_local = entry.status != FileStatus::DeletedLocally;

            let remote_path = if has_remote {
                Some(place(remote, rel, entry.content.as_deref())?)
            } else {
                None
            };
            let local_path = if has_local {
                Some(place(local, rel, entry.local_content.as_deref())?)
            } else {
                None
            };

            let missing_side = (has_remote && entry.content.is_none())
                || (has_local && entry.local_content.is_none());

            records.push(FileComparisonRecord {
                relative_path: entry.relative_path.clone(),
                local_path,
                remote_path,
                status: entry.status,
                is_binary: utils::has_extension_in(rel, &self.binary_extensions),
                content_unavailable: entry.content_unavailable || missing_side,
            });
        }
        Ok(records)
    }
}

fn remove_staging(staging: &Path) {
    if let Err(e) = fs::remove_dir_all(staging) {
        warn!("Failed to clean up {:?}: {}", staging, e);
    }
}

/// Write `content` for `rel` under the staging root and return its final path
fn place(roots: &(PathBuf, PathBuf), rel: &str, content: Option<&str>) -> Result<PathBuf> {
    let (write_root, final_root) = roots;
    if let Some(text) = content {
        let path = utils::join_relative(write_root, rel)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, text)?;
    }
    utils::join_relative(final_root, rel)
}
