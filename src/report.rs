//! Static HTML reports
//!
//! A report is one self-contained HTML document: inline CSS, no scripts and
//! no external references. It opens with a summary of counts by status and
//! then renders one entry per record in the registry's current sort order.
//!
//! Rendering never fails because of a single file. Binary files, files with
//! no captured content, oversized files and files that cannot be read at
//! render time each get a placeholder instead of a diff.

use crate::diff::{compute_line_diff, DiffHunk, DiffOptions, LineChange};
use crate::error::{Result, SiteDiffError};
use crate::tree::sorted_records;
use crate::types::{FileComparisonRecord, FileStatus, SiteComparison, SortMode};
use crate::utils::{self, escape_html};
use chrono::Utc;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Placeholder for files classified as binary
pub const BINARY_PLACEHOLDER: &str = "Binary file. Content is not shown.";

/// Placeholder for files that could not be read while rendering
pub const UNREADABLE_PLACEHOLDER: &str = "Unable to read file.";

/// Placeholder for records whose content was never captured
pub const UNAVAILABLE_PLACEHOLDER: &str = "Content unavailable for this file.";

const STYLE: &str = "\
body{font-family:-apple-system,Segoe UI,Helvetica,Arial,sans-serif;margin:2em;color:#24292f}\
h1{font-size:1.5em}table.summary td{padding:2px 12px}\
.entry{border:1px solid #d0d7de;border-radius:6px;margin:1em 0}\
.entry h2{font-size:1em;margin:0;padding:8px 12px;background:#f6f8fa;border-bottom:1px solid #d0d7de}\
.status{display:inline-block;min-width:8em;font-weight:600}\
.modified{color:#9a6700}.addedLocally{color:#1a7f37}.deletedLocally{color:#cf222e}\
.placeholder{padding:8px 12px;font-style:italic;color:#57606a}\
pre{margin:0;padding:8px 12px;overflow-x:auto;font-size:12px}\
.hunk{color:#8250df}.add{background:#e6ffec;display:block}.del{background:#ffebe9;display:block}";

/// Rendering options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOptions {
    /// Files larger than this render a placeholder (0 = unlimited)
    pub max_file_size: u64,
    /// Diff options for text files
    pub diff: DiffOptions,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            max_file_size: crate::config::DEFAULT_MAX_REPORT_FILE_SIZE,
            diff: DiffOptions::default(),
        }
    }
}

/// What a report entry shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryBody {
    /// Unified diff hunks
    Diff(Vec<DiffHunk>),
    /// Fixed message in place of content
    Placeholder(String),
}

/// Decide what to render for one record
///
/// Read failures produce [`UNREADABLE_PLACEHOLDER`] instead of an error.
pub fn render_entry(record: &FileComparisonRecord, options: &ReportOptions) -> EntryBody {
    if record.is_binary {
        return EntryBody::Placeholder(BINARY_PLACEHOLDER.to_string());
    }
    if record.content_unavailable {
        return EntryBody::Placeholder(UNAVAILABLE_PLACEHOLDER.to_string());
    }

    let sides = [
        record.remote_path.as_deref(),
        record.local_path.as_deref(),
    ];
    for path in sides.iter().flatten() {
        if let Some(placeholder) = size_placeholder(path, options.max_file_size) {
            return EntryBody::Placeholder(placeholder);
        }
    }

    let read = |path: Option<&Path>| -> std::result::Result<String, ()> {
        match path {
            Some(path) => fs::read_to_string(path).map_err(|e| {
                warn!("Unable to read {:?} for report: {}", path, e);
            }),
            None => Ok(String::new()),
        }
    };

    let (old, new) = match record.status {
        FileStatus::Modified => (read(record.remote_path.as_deref()), read(record.local_path.as_deref())),
        FileStatus::AddedLocally => (Ok(String::new()), read(record.local_path.as_deref())),
        FileStatus::DeletedLocally => (read(record.remote_path.as_deref()), Ok(String::new())),
    };
    match (old, new) {
        (Ok(old), Ok(new)) => EntryBody::Diff(compute_line_diff(&old, &new, &options.diff)),
        _ => EntryBody::Placeholder(UNREADABLE_PLACEHOLDER.to_string()),
    }
}

fn size_placeholder(path: &Path, max_file_size: u64) -> Option<String> {
    if max_file_size == 0 {
        return None;
    }
    // Unreadable metadata falls through to the read, which reports it
    let size = fs::metadata(path).ok()?.len();
    (size > max_file_size).then(|| {
        format!(
            "File too large to display ({}, limit {}).",
            utils::format_bytes(size),
            utils::format_bytes(max_file_size)
        )
    })
}

/// Render `comparison` as an HTML document
pub fn generate_report(comparison: &SiteComparison, sort: SortMode, options: &ReportOptions) -> String {
    let counts = comparison.counts();
    let mut html = String::with_capacity(8 * 1024);

    let title = format!(
        "{} vs {} ({})",
        comparison.local_site_name, comparison.remote_site_name, comparison.environment_name
    );

    // Writing into a String cannot fail
    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n<h1>{title}</h1>\n",
        title = escape_html(&title),
    );
    let _ = write!(
        html,
        "<p>Generated {} for comparison <code>{}</code>.</p>\n\
         <table class=\"summary\">\n\
         <tr><td class=\"modified\">Modified</td><td>{}</td></tr>\n\
         <tr><td class=\"addedLocally\">Added locally</td><td>{}</td></tr>\n\
         <tr><td class=\"deletedLocally\">Deleted locally</td><td>{}</td></tr>\n\
         <tr><td><strong>Total</strong></td><td><strong>{}</strong></td></tr>\n\
         </table>\n",
        Utc::now().to_rfc3339(),
        escape_html(&comparison.key.to_string()),
        counts.modified,
        counts.added_locally,
        counts.deleted_locally,
        counts.total(),
    );

    let mut placeholders = 0usize;
    for record in sorted_records(&comparison.records, sort) {
        let body = render_entry(&record, options);
        if matches!(body, EntryBody::Placeholder(_)) {
            placeholders += 1;
        }
        write_entry(&mut html, &record, &body);
    }
    html.push_str("</body>\n</html>\n");

    debug!(
        "Rendered report for {} ({} entries, {} placeholders)",
        comparison.key,
        comparison.records.len(),
        placeholders
    );
    html
}

fn write_entry(html: &mut String, record: &FileComparisonRecord, body: &EntryBody) {
    let status = record.status.as_str();
    let _ = write!(
        html,
        "<div class=\"entry\">\n<h2><span class=\"status {status}\">{}</span> {}</h2>\n",
        record.status.label(),
        escape_html(&record.relative_path),
    );
    match body {
        EntryBody::Placeholder(message) => {
            let _ = writeln!(html, "<div class=\"placeholder\">{}</div>", escape_html(message));
        }
        EntryBody::Diff(hunks) if hunks.is_empty() => {
            let _ = writeln!(html, "<div class=\"placeholder\">No line differences.</div>");
        }
        EntryBody::Diff(hunks) => {
            html.push_str("<pre>");
            for hunk in hunks {
                let _ = writeln!(html, "<span class=\"hunk\">{}</span>", hunk.header());
                for change in &hunk.changes {
                    let (class, marker, text) = match change {
                        LineChange::Context(_, text) => ("", ' ', text),
                        LineChange::Added(_, text) => ("add", '+', text),
                        LineChange::Deleted(_, text) => ("del", '-', text),
                    };
                    if class.is_empty() {
                        let _ = writeln!(html, "{}{}", marker, escape_html(text));
                    } else {
                        let _ = write!(html, "<span class=\"{}\">{}{}</span>", class, marker, escape_html(text));
                    }
                }
            }
            html.push_str("</pre>\n");
        }
    }
    html.push_str("</div>\n");
}

/// Render and write the report atomically to `path`
pub fn write_report(
    comparison: &SiteComparison,
    sort: SortMode,
    options: &ReportOptions,
    path: &Path,
) -> Result<()> {
    let html = generate_report(comparison, sort, options);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| SiteDiffError::Report(format!("cannot create {:?}: {}", parent, e)))?;
    }
    utils::atomic_write(path, html.as_bytes())
        .map_err(|e| SiteDiffError::Report(format!("cannot write {:?}: {}", path, e)))?;
    info!("Wrote report for {} to {:?}", comparison.key, path);
    Ok(())
}
