//! Line-level diff computation for text files
//!
//! Used by the report generator to render modified text files as unified
//! diffs.
//!
//! ## Overview
//!
//! Common leading and trailing lines are trimmed first, then the Longest
//! Common Subsequence (LCS) of the remaining lines is computed with dynamic
//! programming. Changes are grouped into hunks with configurable context.
//! When the trimmed middle is too large for the O(mn) table the middle is
//! reported as one replacement block instead.
//!
//! ## Examples
//!
//! ```rust
//! use sitediff::diff::{compute_line_diff, DiffOptions, LineChange};
//!
//! let hunks = compute_line_diff("a\nb\nc", "a\nB\nc\nd", &DiffOptions::default());
//! assert_eq!(hunks.len(), 1);
//! assert!(hunks[0]
//!     .changes
//!     .iter()
//!     .any(|c| matches!(c, LineChange::Added(_, text) if text == "B")));
//! ```

/// Context lines shown around each change by default
pub const DEFAULT_CONTEXT_LINES: usize = 3;

/// Largest LCS table (old lines x new lines) computed before falling back
const MAX_LCS_CELLS: usize = 4_000_000;

/// Options controlling diff generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffOptions {
    /// Unchanged lines shown before and after each change
    pub context_lines: usize,
    /// Compare lines with surrounding whitespace trimmed
    pub ignore_whitespace: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            context_lines: DEFAULT_CONTEXT_LINES,
            ignore_whitespace: false,
        }
    }
}

/// One line of a hunk, with its 1-based line number
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineChange {
    /// Unchanged line (old side numbering)
    Context(usize, String),
    /// Line only in the old text
    Deleted(usize, String),
    /// Line only in the new text
    Added(usize, String),
}

/// A contiguous group of changes with surrounding context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffHunk {
    /// First old line covered (1-based)
    pub from_line: usize,
    /// Old lines covered
    pub from_count: usize,
    /// First new line covered (1-based)
    pub to_line: usize,
    /// New lines covered
    pub to_count: usize,
    /// Lines in display order
    pub changes: Vec<LineChange>,
}

impl DiffHunk {
    /// Unified diff header, e.g. `@@ -1,4 +1,5 @@`
    pub fn header(&self) -> String {
        format!(
            "@@ -{},{} +{},{} @@",
            self.from_line, self.from_count, self.to_line, self.to_count
        )
    }
}

/// Number of added and deleted lines across `hunks`
pub fn line_stats(hunks: &[DiffHunk]) -> (usize, usize) {
    hunks
        .iter()
        .flat_map(|h| h.changes.iter())
        .fold((0, 0), |(added, deleted), change| match change {
            LineChange::Added(..) => (added + 1, deleted),
            LineChange::Deleted(..) => (added, deleted + 1),
            LineChange::Context(..) => (added, deleted),
        })
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Keep(usize),
    Delete(usize),
    Insert(usize),
}

impl Op {
    fn is_change(self) -> bool {
        !matches!(self, Op::Keep(..))
    }
}

/// Compute the hunks turning `old_text` into `new_text`
pub fn compute_line_diff(old_text: &str, new_text: &str, options: &DiffOptions) -> Vec<DiffHunk> {
    let old_lines: Vec<&str> = old_text.lines().collect();
    let new_lines: Vec<&str> = new_text.lines().collect();
    let ops = compute_ops(&old_lines, &new_lines, options.ignore_whitespace);
    build_hunks(&ops, &old_lines, &new_lines, options.context_lines)
}

fn lines_equal(a: &str, b: &str, ignore_whitespace: bool) -> bool {
    if ignore_whitespace {
        a.trim() == b.trim()
    } else {
        a == b
    }
}

fn compute_ops(old_lines: &[&str], new_lines: &[&str], ignore_whitespace: bool) -> Vec<Op> {
    let eq = |o: usize, n: usize| lines_equal(old_lines[o], new_lines[n], ignore_whitespace);

    let mut prefix = 0;
    while prefix < old_lines.len() && prefix < new_lines.len() && eq(prefix, prefix) {
        prefix += 1;
    }
    let mut suffix = 0;
    while suffix < old_lines.len() - prefix
        && suffix < new_lines.len() - prefix
        && eq(old_lines.len() - 1 - suffix, new_lines.len() - 1 - suffix)
    {
        suffix += 1;
    }

    let old_mid = prefix..old_lines.len() - suffix;
    let new_mid = prefix..new_lines.len() - suffix;

    let mut ops: Vec<Op> = (0..prefix).map(Op::Keep).collect();

    if old_mid.len().saturating_mul(new_mid.len()) > MAX_LCS_CELLS {
        ops.extend(old_mid.clone().map(Op::Delete));
        ops.extend(new_mid.clone().map(Op::Insert));
    } else {
        ops.extend(lcs_ops(old_mid.start, old_mid.len(), new_mid.start, new_mid.len(), &eq));
    }

    ops.extend((old_lines.len() - suffix..old_lines.len()).map(Op::Keep));
    ops
}

/// LCS over `old[o0..o0+m]` and `new[n0..n0+n]`, emitted in order
fn lcs_ops(o0: usize, m: usize, n0: usize, n: usize, eq: &impl Fn(usize, usize) -> bool) -> Vec<Op> {
    // dp[i][j] = LCS length of old[o0+i..] and new[n0+j..]
    let width = n + 1;
    let mut dp = vec![0u32; (m + 1) * width];
    for i in (0..m).rev() {
        for j in (0..n).rev() {
            dp[i * width + j] = if eq(o0 + i, n0 + j) {
                dp[(i + 1) * width + j + 1] + 1
            } else {
                dp[(i + 1) * width + j].max(dp[i * width + j + 1])
            };
        }
    }

    let mut ops = Vec::with_capacity(m + n);
    let (mut i, mut j) = (0, 0);
    while i < m && j < n {
        if eq(o0 + i, n0 + j) {
            ops.push(Op::Keep(o0 + i));
            i += 1;
            j += 1;
        } else if dp[(i + 1) * width + j] >= dp[i * width + j + 1] {
            ops.push(Op::Delete(o0 + i));
            i += 1;
        } else {
            ops.push(Op::Insert(n0 + j));
            j += 1;
        }
    }
    ops.extend((i..m).map(|k| Op::Delete(o0 + k)));
    ops.extend((j..n).map(|k| Op::Insert(n0 + k)));
    ops
}

fn build_hunks(ops: &[Op], old_lines: &[&str], new_lines: &[&str], context: usize) -> Vec<DiffHunk> {
    // Merge the context windows around every change into op ranges
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for (idx, op) in ops.iter().enumerate() {
        if !op.is_change() {
            continue;
        }
        let lo = idx.saturating_sub(context);
        let hi = (idx + context + 1).min(ops.len());
        match ranges.last_mut() {
            Some((_, end)) if lo <= *end => *end = hi,
            _ => ranges.push((lo, hi)),
        }
    }

    // Line cursors before each op
    let mut cursors = Vec::with_capacity(ops.len());
    let (mut old_pos, mut new_pos) = (0, 0);
    for op in ops {
        cursors.push((old_pos, new_pos));
        match op {
            Op::Keep(..) => {
                old_pos += 1;
                new_pos += 1;
            }
            Op::Delete(_) => old_pos += 1,
            Op::Insert(_) => new_pos += 1,
        }
    }

    ranges
        .into_iter()
        .map(|(lo, hi)| {
            let (from, to) = cursors[lo];
            let mut hunk = DiffHunk {
                from_line: from + 1,
                from_count: 0,
                to_line: to + 1,
                to_count: 0,
                changes: Vec::with_capacity(hi - lo),
            };
            for op in &ops[lo..hi] {
                match *op {
                    Op::Keep(o) => {
                        hunk.from_count += 1;
                        hunk.to_count += 1;
                        hunk.changes.push(LineChange::Context(o + 1, old_lines[o].to_string()));
                    }
                    Op::Delete(o) => {
                        hunk.from_count += 1;
                        hunk.changes.push(LineChange::Deleted(o + 1, old_lines[o].to_string()));
                    }
                    Op::Insert(n) => {
                        hunk.to_count += 1;
                        hunk.changes.push(LineChange::Added(n + 1, new_lines[n].to_string()));
                    }
                }
            }
            hunk
        })
        .collect()
}
