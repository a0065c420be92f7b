//! Tree and list projections of a comparison
//!
//! A projection is a read-only view derived from a comparison's records and
//! the registry's sort mode. The `Tree` projection groups records by folder;
//! the `List` projection is the flat record set. Both are rebuilt on demand,
//! they never hold references into the registry.
//!
//! ## Ordering
//!
//! At every level folders come before files. Files are ordered by the sort
//! mode's key and then by exact relative path, so the order is total and
//! independent of the input order:
//!
//! - `Name`: case-insensitive final path segment
//! - `Path`: case-insensitive full relative path
//! - `Status`: `Modified < AddedLocally < DeletedLocally`, then as `Path`
//!
//! Folders are ordered by case-insensitive name under `Name` and by
//! case-insensitive path otherwise.
//!
//! ## Example
//!
//! ```rust
//! use sitediff::tree::{project, Projection, TreeNode};
//! use sitediff::types::{FileComparisonRecord, SortMode, ViewMode};
//!
//! let records = vec![
//!     FileComparisonRecord::deleted_locally("d.html", "/r/d.html".into(), false),
//!     FileComparisonRecord::added_locally("a/c.png", "/l/a/c.png".into(), true),
//! ];
//! let Projection::Tree(root) = project(&records, SortMode::Path, ViewMode::Tree) else {
//!     unreachable!()
//! };
//! let names: Vec<&str> = root.children().map(|n| n.name()).collect();
//! assert_eq!(names, vec!["a", "d.html"]);
//! ```

use crate::types::{FileComparisonRecord, SortMode, ViewMode};
use std::cmp::Ordering;

/// A folder in the tree projection
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FolderNode {
    /// Final segment of the folder path (empty for the root)
    pub name: String,
    /// POSIX path of the folder (empty for the root)
    pub path: String,
    /// Immediate sub-folders in display order
    pub folders: Vec<FolderNode>,
    /// Files directly inside this folder in display order
    pub files: Vec<FileComparisonRecord>,
}

/// Borrowed child of a folder
#[derive(Debug, Clone, Copy)]
pub enum TreeNode<'a> {
    /// Sub-folder
    Folder(&'a FolderNode),
    /// File record
    File(&'a FileComparisonRecord),
}

impl<'a> TreeNode<'a> {
    /// Display name of the node
    pub fn name(&self) -> &'a str {
        match *self {
            TreeNode::Folder(folder) => &folder.name,
            TreeNode::File(record) => record.file_name(),
        }
    }
}

impl FolderNode {
    fn child(name: &str, parent_path: &str) -> Self {
        let path = if parent_path.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", parent_path, name)
        };
        Self {
            name: name.to_string(),
            path,
            ..Default::default()
        }
    }

    /// Children in display order: folders first, then files
    pub fn children(&self) -> impl Iterator<Item = TreeNode<'_>> {
        self.folders
            .iter()
            .map(TreeNode::Folder)
            .chain(self.files.iter().map(TreeNode::File))
    }

    /// Every record transitively beneath this folder, in display order
    pub fn get_all_file_items(&self) -> Vec<&FileComparisonRecord> {
        let mut items = Vec::new();
        self.collect_files(&mut items);
        items
    }

    fn collect_files<'a>(&'a self, items: &mut Vec<&'a FileComparisonRecord>) {
        for folder in &self.folders {
            folder.collect_files(items);
        }
        items.extend(self.files.iter());
    }

    /// Number of records transitively beneath this folder
    pub fn file_count(&self) -> usize {
        self.files.len() + self.folders.iter().map(FolderNode::file_count).sum::<usize>()
    }

    /// Find a descendant folder by POSIX path (`""` is this folder)
    pub fn find_folder(&self, path: &str) -> Option<&FolderNode> {
        let path = path.trim_matches('/');
        if path.is_empty() {
            return Some(self);
        }
        let mut current = self;
        for segment in path.split('/') {
            current = current.folders.iter().find(|f| f.name == segment)?;
        }
        Some(current)
    }

    fn insert(&mut self, record: &FileComparisonRecord) {
        let mut current = self;
        for segment in record.folder_segments() {
            let idx = match current.folders.iter().position(|f| f.name == segment) {
                Some(idx) => idx,
                None => {
                    let node = FolderNode::child(segment, &current.path);
                    current.folders.push(node);
                    current.folders.len() - 1
                }
            };
            current = &mut current.folders[idx];
        }
        current.files.push(record.clone());
    }

    fn sort(&mut self, mode: SortMode) {
        self.folders.sort_by(|a, b| compare_folders(a, b, mode));
        self.files.sort_by(|a, b| compare_records(a, b, mode));
        for folder in &mut self.folders {
            folder.sort(mode);
        }
    }
}

/// A comparison projected for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Root folder of the hierarchy
    Tree(FolderNode),
    /// Flat sorted records
    List(Vec<FileComparisonRecord>),
}

impl Projection {
    /// Leaf records of the projection in display order
    pub fn records(&self) -> Vec<&FileComparisonRecord> {
        match self {
            Projection::Tree(root) => root.get_all_file_items(),
            Projection::List(records) => records.iter().collect(),
        }
    }
}

/// Project `records` for the given sort and view modes
pub fn project(records: &[FileComparisonRecord], sort: SortMode, view: ViewMode) -> Projection {
    match view {
        ViewMode::Tree => Projection::Tree(build_tree(records, sort)),
        ViewMode::List => Projection::List(sorted_records(records, sort)),
    }
}

/// Build the folder hierarchy for `records`
pub fn build_tree(records: &[FileComparisonRecord], sort: SortMode) -> FolderNode {
    let mut root = FolderNode::default();
    for record in records {
        root.insert(record);
    }
    root.sort(sort);
    root
}

/// Records sorted by `sort`
pub fn sorted_records(records: &[FileComparisonRecord], sort: SortMode) -> Vec<FileComparisonRecord> {
    let mut sorted = records.to_vec();
    sorted.sort_by(|a, b| compare_records(a, b, sort));
    sorted
}

/// Total order over records for a sort mode
pub fn compare_records(a: &FileComparisonRecord, b: &FileComparisonRecord, mode: SortMode) -> Ordering {
    let by_path = || {
        a.relative_path
            .to_lowercase()
            .cmp(&b.relative_path.to_lowercase())
    };
    let primary = match mode {
        SortMode::Name => a
            .file_name()
            .to_lowercase()
            .cmp(&b.file_name().to_lowercase())
            .then_with(by_path),
        SortMode::Path => by_path(),
        SortMode::Status => a.status.rank().cmp(&b.status.rank()).then_with(by_path),
    };
    primary.then_with(|| a.relative_path.cmp(&b.relative_path))
}

fn compare_folders(a: &FolderNode, b: &FolderNode, mode: SortMode) -> Ordering {
    let primary = match mode {
        SortMode::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        SortMode::Path | SortMode::Status => a.path.to_lowercase().cmp(&b.path.to_lowercase()),
    };
    primary.then_with(|| a.path.cmp(&b.path))
}
