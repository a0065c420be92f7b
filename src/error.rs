//! Error types for the sitediff library
//!
//! This module defines all error types that can occur while comparing,
//! reverting, sharing and reporting on site comparisons. Errors carry the
//! offending relative path wherever one applies so an operator can identify
//! and retry the specific file.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the sitediff library
pub type Result<T> = std::result::Result<T, SiteDiffError>;

/// Main error type for all sitediff operations
#[derive(Debug, Error)]
pub enum SiteDiffError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Snapshot provider could not populate the remote-side tree
    #[error("Snapshot fetch failed for site {site}: {message}")]
    SnapshotFetch {
        /// Site identifier the fetch was issued for
        site: String,
        /// Provider supplied failure description
        message: String,
    },

    /// A single file could not be reverted
    #[error("Discard failed for {relative_path}: {source}")]
    Discard {
        /// POSIX relative path of the record
        relative_path: String,
        /// Underlying file system error
        #[source]
        source: std::io::Error,
    },

    /// An interchange package was rejected
    #[error("Import rejected: {0}")]
    ImportValidation(#[from] ImportValidationError),

    /// Resync was attempted on a comparison that has no live source
    #[error("Comparison {key} was imported and cannot be resynced")]
    ResyncNotSupported {
        /// Display form of the comparison key
        key: String,
    },

    /// No comparison exists under the given key
    #[error("Comparison not found: {0}")]
    ComparisonNotFound(String),

    /// The comparison has no record with the given relative path
    #[error("No record {relative_path} in comparison {key}")]
    RecordNotFound {
        /// Display form of the comparison key
        key: String,
        /// POSIX relative path that was looked up
        relative_path: String,
    },

    /// A path could not be expressed as a relative POSIX path
    #[error("Invalid path: {0:?}")]
    InvalidPath(PathBuf),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Persistent store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Report could not be written
    #[error("Report error: {0}")]
    Report(String),

    /// Walk directory error from walkdir crate
    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Glob pattern error from globset crate
    #[error("Invalid ignore pattern: {0}")]
    InvalidPattern(#[from] globset::Error),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),

    /// Custom error type for extensions
    #[error("{0}")]
    Custom(String),
}

/// Reasons an interchange package fails validation
///
/// Validation runs before any field of the package is trusted, so no
/// comparison is created when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportValidationError {
    /// A required top-level or record field is absent
    #[error("missing required field `{field}`")]
    MissingField {
        /// Name of the missing field
        field: String,
    },

    /// A field is present but has the wrong JSON type
    #[error("field `{field}` must be {expected}")]
    WrongType {
        /// Name of the offending field
        field: String,
        /// Expected JSON type
        expected: &'static str,
    },

    /// Package was written by a newer (or nonsensical) format version
    #[error("unsupported format version {found} (supported up to {max_supported})")]
    UnsupportedVersion {
        /// Version found in the package
        found: i64,
        /// Highest version this engine reads
        max_supported: u32,
    },

    /// A record entry could not be decoded
    #[error("record {index} is invalid: {reason}")]
    InvalidRecord {
        /// Position of the record in the package
        index: usize,
        /// What was wrong with it
        reason: String,
    },

    /// Two records share a relative path
    #[error("duplicate record path {relative_path}")]
    DuplicatePath {
        /// The repeated path
        relative_path: String,
    },

    /// A record path is also the folder of another record
    #[error("record path {relative_path} is also a folder of {nested_path}")]
    PathConflict {
        /// The path used both as a file and as a folder
        relative_path: String,
        /// A record nested beneath it
        nested_path: String,
    },

    /// Document is not a JSON object at all
    #[error("malformed package: {0}")]
    Malformed(String),
}

impl SiteDiffError {
    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        SiteDiffError::Internal(msg.into())
    }

    /// Create a custom error with a custom message
    pub fn custom(msg: impl Into<String>) -> Self {
        SiteDiffError::Custom(msg.into())
    }

    /// Create a store error with a custom message
    pub fn store(msg: impl Into<String>) -> Self {
        SiteDiffError::Store(msg.into())
    }

    /// Create a snapshot fetch error for a site
    pub fn snapshot_fetch(site: impl Into<String>, message: impl Into<String>) -> Self {
        SiteDiffError::SnapshotFetch {
            site: site.into(),
            message: message.into(),
        }
    }

    /// Wrap an I/O error raised while reverting `relative_path`
    pub fn discard(relative_path: impl Into<String>, source: std::io::Error) -> Self {
        SiteDiffError::Discard {
            relative_path: relative_path.into(),
            source,
        }
    }

    /// Relative path of the file this error concerns, if any
    pub fn relative_path(&self) -> Option<&str> {
        match self {
            SiteDiffError::Discard { relative_path, .. }
            | SiteDiffError::RecordNotFound { relative_path, .. } => Some(relative_path),
            SiteDiffError::ImportValidation(
                ImportValidationError::DuplicatePath { relative_path }
                | ImportValidationError::PathConflict { relative_path, .. },
            ) => Some(relative_path),
            _ => None,
        }
    }

    /// Check if retrying the same operation may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SiteDiffError::SnapshotFetch { .. } | SiteDiffError::Discard { .. }
        )
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            SiteDiffError::SnapshotFetch { site, message } => {
                format!(
                    "Could not download the remote snapshot for {} ({}). The previous comparison was kept; try again later.",
                    site, message
                )
            }
            SiteDiffError::Discard { relative_path, source } => {
                format!(
                    "Could not revert {}: {}. Check that the file is not locked or read-only and retry.",
                    relative_path, source
                )
            }
            SiteDiffError::ResyncNotSupported { key } => {
                format!(
                    "{} was imported from a package and has no remote source. Run a new compare instead.",
                    key
                )
            }
            SiteDiffError::ImportValidation(ImportValidationError::UnsupportedVersion {
                found,
                max_supported,
            }) => {
                format!(
                    "The package uses format version {} but this build reads up to version {}. Upgrade sitediff to import it.",
                    found, max_supported
                )
            }
            _ => self.to_string(),
        }
    }
}
