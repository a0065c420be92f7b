//! Utility functions for sitediff
//!
//! This module provides common helpers used throughout the library:
//!
//! ### File Operations
//! - File content hashing (SHA-256) and content equality
//! - Atomic file writing and copying
//! - Directory reset and recursive copy
//!
//! ### Path Manipulation
//! - Converting absolute paths to relative POSIX paths
//! - Extension based binary classification
//!
//! ### Formatting
//! - Byte formatting (human-readable sizes)
//! - HTML escaping for reports

use crate::error::{Result, SiteDiffError};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use tracing::trace;
use walkdir::WalkDir;

/// Hash a file's content using SHA-256
///
/// Returns the hash as a 64-character hexadecimal string. The file is read
/// in 8KB chunks so large files are not loaded into memory.
pub fn hash_file_content(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Check whether two files have identical content
///
/// Sizes are compared first so differing files are usually rejected
/// without reading them.
pub fn files_equal(a: &Path, b: &Path) -> Result<bool> {
    let size_a = fs::metadata(a)?.len();
    let size_b = fs::metadata(b)?.len();
    if size_a != size_b {
        return Ok(false);
    }
    Ok(hash_file_content(a)? == hash_file_content(b)?)
}

/// Make `path` relative to `base`, expressed with `/` separators
///
/// # Errors
///
/// - [`SiteDiffError::InvalidPath`] if the path is not under `base` or has a
///   component that is not valid UTF-8
pub fn to_posix_relative(path: &Path, base: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(base)
        .map_err(|_| SiteDiffError::InvalidPath(path.to_path_buf()))?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(
                part.to_str()
                    .ok_or_else(|| SiteDiffError::InvalidPath(path.to_path_buf()))?,
            ),
            _ => return Err(SiteDiffError::InvalidPath(path.to_path_buf())),
        }
    }

    if parts.is_empty() {
        return Err(SiteDiffError::InvalidPath(path.to_path_buf()));
    }
    Ok(parts.join("/"))
}

/// Resolve a relative POSIX path beneath `root`
///
/// Rejects absolute paths and `..` segments so package content can never be
/// written outside its directory.
pub fn join_relative(root: &Path, relative_path: &str) -> Result<PathBuf> {
    let mut joined = root.to_path_buf();
    for segment in relative_path.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
            return Err(SiteDiffError::InvalidPath(PathBuf::from(relative_path)));
        }
        joined.push(segment);
    }
    Ok(joined)
}

/// Whether the extension of `path` is in `extensions` (case-insensitive)
pub fn has_extension_in(path: &str, extensions: &[String]) -> bool {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            extensions.iter().any(|candidate| candidate.eq_ignore_ascii_case(ext))
        }
        _ => false,
    }
}

/// Compile glob patterns into a matcher
pub fn build_glob_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Atomic file write (write to temp file then rename)
///
/// The target is never visible in a partially written state.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| SiteDiffError::InvalidPath(path.to_path_buf()))?;
    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Copy `source` over `destination` atomically, creating parent directories
///
/// Content is staged in a temp file beside the destination and renamed into
/// place, so a failure leaves the destination as it was.
pub fn atomic_copy(source: &Path, destination: &Path) -> std::io::Result<()> {
    let parent = destination.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "destination has no parent")
    })?;
    fs::create_dir_all(parent)?;

    let mut reader = File::open(source)?;
    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    std::io::copy(&mut reader, temp.as_file_mut())?;
    temp.as_file().sync_all()?;
    temp.persist(destination).map_err(|e| e.error)?;
    trace!("Copied {:?} -> {:?}", source, destination);
    Ok(())
}

/// Remove `path` if it exists and recreate it empty
pub fn reset_dir(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)?;
    }
    fs::create_dir_all(path)?;
    Ok(())
}

/// Recursively copy the files of `source` into `destination`
///
/// Returns the number of files copied.
pub fn copy_dir_all(source: &Path, destination: &Path) -> Result<usize> {
    fs::create_dir_all(destination)?;
    let mut copied = 0;
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|_| SiteDiffError::InvalidPath(entry.path().to_path_buf()))?;
        let target = destination.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Format bytes in human-readable form
///
/// Uses binary (1024-based) units.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Escape text for inclusion in HTML element content or attributes
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
