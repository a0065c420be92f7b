//! Comparison registry
//!
//! The registry owns every active comparison (one per key), the persisted
//! sort and view modes, and the list of change listeners. It is a
//! single-writer structure: every mutation takes `&mut self`, completes
//! synchronously against the in-memory map, and then publishes exactly one
//! [`ChangeNotice`].
//!
//! ## Persistence
//!
//! Sort and view modes are read from the injected [`StateStore`] on
//! construction and written back whenever they change. When comparison
//! persistence is enabled the whole comparison set is written after every
//! mutation and restored on construction. Store failures are logged and never
//! fail a mutation; the in-memory state stays authoritative.
//!
//! ## Example
//!
//! ```rust
//! use sitediff::registry::ComparisonRegistry;
//! use sitediff::store::MemoryStore;
//! use sitediff::types::{ComparisonKey, Origin, SortMode};
//!
//! let mut registry = ComparisonRegistry::new(Box::new(MemoryStore::new()));
//! let changes = registry.subscribe();
//!
//! let key = ComparisonKey::live("site", "prod");
//! registry.set_comparison(key.clone(), vec![], "Remote", "Local", "Prod", Origin::Live);
//! registry.set_sort_mode(SortMode::Status);
//!
//! assert!(registry.get_comparison(&key).unwrap().is_empty());
//! assert_eq!(changes.try_iter().count(), 2);
//! ```

use crate::store::{StateStore, COMPARISONS_KEY, SORT_MODE_KEY, VIEW_MODE_KEY};
use crate::types::{ComparisonKey, FileComparisonRecord, Origin, SiteComparison, SortMode, ViewMode};
use indexmap::IndexMap;
use std::sync::mpsc;
use tracing::{debug, trace, warn};

/// Published after every mutating registry operation
///
/// Carries no payload; consumers re-read current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeNotice;

/// Observer of registry changes
///
/// # Examples
///
/// ```rust
/// use sitediff::registry::ChangeListener;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// struct Counter(Arc<AtomicUsize>);
///
/// impl ChangeListener for Counter {
///     fn on_change(&self) {
///         self.0.fetch_add(1, Ordering::SeqCst);
///     }
/// }
/// ```
pub trait ChangeListener: Send {
    /// Called once after each mutation
    fn on_change(&self);
}

impl ChangeListener for mpsc::Sender<ChangeNotice> {
    fn on_change(&self) {
        // Dropped receivers are not an error for the registry.
        let _ = self.send(ChangeNotice);
    }
}

/// Owner of all active comparisons
pub struct ComparisonRegistry {
    comparisons: IndexMap<ComparisonKey, SiteComparison>,
    sort_mode: SortMode,
    view_mode: ViewMode,
    store: Box<dyn StateStore>,
    persist_comparisons: bool,
    listeners: Vec<Box<dyn ChangeListener>>,
}

impl std::fmt::Debug for ComparisonRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComparisonRegistry")
            .field("comparisons", &self.comparisons.keys().collect::<Vec<_>>())
            .field("sort_mode", &self.sort_mode)
            .field("view_mode", &self.view_mode)
            .field("persist_comparisons", &self.persist_comparisons)
            .field("listeners", &format!("<{} listeners>", self.listeners.len()))
            .finish()
    }
}

impl ComparisonRegistry {
    /// Create a registry that persists only sort and view modes
    ///
    /// Starts with no comparisons. Missing or unreadable stored modes fall
    /// back to `SortMode::Path` and `ViewMode::List`.
    pub fn new(store: Box<dyn StateStore>) -> Self {
        Self::with_persistence(store, false)
    }

    /// Create a registry, optionally restoring and persisting the comparison set
    pub fn with_persistence(store: Box<dyn StateStore>, persist_comparisons: bool) -> Self {
        let sort_mode = load_mode(store.as_ref(), SORT_MODE_KEY).unwrap_or_default();
        let view_mode = load_mode(store.as_ref(), VIEW_MODE_KEY).unwrap_or_default();

        let mut comparisons = IndexMap::new();
        if persist_comparisons {
            for comparison in load_comparisons(store.as_ref()) {
                comparisons.insert(comparison.key.clone(), comparison);
            }
        }

        debug!(
            "Registry ready: sort={:?} view={:?} restored={} comparisons",
            sort_mode,
            view_mode,
            comparisons.len()
        );

        Self {
            comparisons,
            sort_mode,
            view_mode,
            store,
            persist_comparisons,
            listeners: Vec::new(),
        }
    }

    /// Register a change listener
    pub fn add_listener(&mut self, listener: Box<dyn ChangeListener>) {
        self.listeners.push(listener);
    }

    /// Subscribe to change notices through a channel
    pub fn subscribe(&mut self) -> mpsc::Receiver<ChangeNotice> {
        let (tx, rx) = mpsc::channel();
        self.listeners.push(Box::new(tx));
        rx
    }

    /// Replace any comparison stored under `key` with a new record set
    pub fn set_comparison(
        &mut self,
        key: ComparisonKey,
        records: Vec<FileComparisonRecord>,
        remote_site_name: impl Into<String>,
        local_site_name: impl Into<String>,
        environment_name: impl Into<String>,
        origin: Origin,
    ) {
        let comparison = SiteComparison::new(
            key,
            records,
            remote_site_name,
            local_site_name,
            environment_name,
            origin,
        );
        self.insert_comparison(comparison);
    }

    /// Replace any comparison stored under the comparison's own key
    ///
    /// An existing entry keeps its display position.
    pub fn insert_comparison(&mut self, comparison: SiteComparison) {
        debug!(
            "Setting comparison {} ({} records)",
            comparison.key,
            comparison.records.len()
        );
        self.comparisons.insert(comparison.key.clone(), comparison);
        self.notify();
    }

    /// Look up a comparison
    pub fn get_comparison(&self, key: &ComparisonKey) -> Option<&SiteComparison> {
        self.comparisons.get(key)
    }

    /// Whether a comparison exists under `key`
    pub fn contains(&self, key: &ComparisonKey) -> bool {
        self.comparisons.contains_key(key)
    }

    /// All comparisons in display order
    pub fn comparisons(&self) -> impl Iterator<Item = &SiteComparison> {
        self.comparisons.values()
    }

    /// Number of active comparisons
    pub fn len(&self) -> usize {
        self.comparisons.len()
    }

    /// No comparisons are active
    pub fn is_empty(&self) -> bool {
        self.comparisons.is_empty()
    }

    /// Delete a comparison; notifies even if nothing was stored
    pub fn remove_comparison(&mut self, key: &ComparisonKey) {
        if self.comparisons.shift_remove(key).is_some() {
            debug!("Removed comparison {}", key);
        }
        self.notify();
    }

    /// Remove every comparison
    pub fn clear_all(&mut self) {
        debug!("Clearing {} comparisons", self.comparisons.len());
        self.comparisons.clear();
        self.notify();
    }

    /// Remove one record from a comparison
    ///
    /// The comparison stays registered even when this leaves it empty.
    /// Returns whether a record was removed.
    pub fn remove_file(&mut self, key: &ComparisonKey, relative_path: &str) -> bool {
        let removed = self
            .comparisons
            .get_mut(key)
            .and_then(|c| c.remove_record(relative_path))
            .is_some();
        trace!("remove_file {} {} -> {}", key, relative_path, removed);
        self.notify();
        removed
    }

    /// Remove several records with a single notification
    ///
    /// Returns how many records were removed.
    pub fn remove_files(&mut self, key: &ComparisonKey, relative_paths: &[String]) -> usize {
        let removed = match self.comparisons.get_mut(key) {
            Some(comparison) => relative_paths
                .iter()
                .filter(|path| comparison.remove_record(path).is_some())
                .count(),
            None => 0,
        };
        trace!("remove_files {} -> {} removed", key, removed);
        self.notify();
        removed
    }

    /// Current sort mode
    pub fn sort_mode(&self) -> SortMode {
        self.sort_mode
    }

    /// Current view mode
    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    /// Update and persist the sort mode
    pub fn set_sort_mode(&mut self, mode: SortMode) {
        self.sort_mode = mode;
        if let Err(e) = self.store.set(SORT_MODE_KEY, mode.as_str()) {
            warn!("Failed to persist sort mode: {}", e);
        }
        self.notify();
    }

    /// Update and persist the view mode
    pub fn set_view_mode(&mut self, mode: ViewMode) {
        self.view_mode = mode;
        if let Err(e) = self.store.set(VIEW_MODE_KEY, mode.as_str()) {
            warn!("Failed to persist view mode: {}", e);
        }
        self.notify();
    }

    fn notify(&mut self) {
        if self.persist_comparisons {
            self.persist_comparison_set();
        }
        for listener in &self.listeners {
            listener.on_change();
        }
    }

    fn persist_comparison_set(&mut self) {
        let snapshot: Vec<&SiteComparison> = self.comparisons.values().collect();
        match serde_json::to_string(&snapshot) {
            Ok(json) => {
                if let Err(e) = self.store.set(COMPARISONS_KEY, &json) {
                    warn!("Failed to persist comparisons: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize comparisons: {}", e),
        }
    }
}

fn load_mode<T: std::str::FromStr>(store: &dyn StateStore, key: &str) -> Option<T> {
    match store.get(key) {
        Ok(Some(value)) => match value.parse() {
            Ok(mode) => Some(mode),
            Err(_) => {
                warn!("Ignoring unknown stored value {:?} for {}", value, key);
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            warn!("Failed to read {} from store: {}", key, e);
            None
        }
    }
}

fn load_comparisons(store: &dyn StateStore) -> Vec<SiteComparison> {
    match store.get(COMPARISONS_KEY) {
        Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_else(|e| {
            warn!("Ignoring unreadable persisted comparisons: {}", e);
            Vec::new()
        }),
        Ok(None) => Vec::new(),
        Err(e) => {
            warn!("Failed to read persisted comparisons: {}", e);
            Vec::new()
        }
    }
}
