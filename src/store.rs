//! Persistent key-value store capability
//!
//! The registry persists its sort mode, view mode and (optionally) the
//! comparison set through the [`StateStore`] trait so the storage backend is
//! injected rather than reached through a global.
//!
//! Two implementations are provided:
//!
//! - [`JsonFileStore`]: one JSON document on disk, rewritten atomically on
//!   every `set`
//! - [`MemoryStore`]: in-process map, for tests and embedding

use crate::error::{Result, SiteDiffError};
use crate::utils;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Store key for the persisted sort mode
pub const SORT_MODE_KEY: &str = "sortMode";
/// Store key for the persisted view mode
pub const VIEW_MODE_KEY: &str = "viewMode";
/// Store key for the persisted comparison set
pub const COMPARISONS_KEY: &str = "comparisons";

/// Durable string-valued storage surviving process restarts
pub trait StateStore: Send {
    /// Read the value stored under `key`
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

/// File backed store holding every key in one JSON object
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl JsonFileStore {
    /// Open (or lazily create) the store at `path`
    ///
    /// A missing file is an empty store. A file that cannot be parsed is
    /// logged and treated as empty so a corrupt state file never blocks
    /// start-up.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = if path.exists() {
            let content = fs::read_to_string(&path)?;
            match serde_json::from_str(&content) {
                Ok(values) => values,
                Err(e) => {
                    warn!("Ignoring unreadable state file {:?}: {}", path, e);
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };
        debug!("Opened state store {:?} with {} keys", path, values.len());
        Ok(Self { path, values })
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(&self.values)?;
        utils::atomic_write(&self.path, &json)
    }
}

impl StateStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        self.flush()
    }
}

/// In-memory store
///
/// Clones share the same map, so a test can keep a handle and inspect what
/// the registry wrote, or build a second registry over the same data to
/// simulate a restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.values
            .lock()
            .map_err(|_| SiteDiffError::store("memory store lock poisoned"))
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
