//! Durable key-value storage.
//!
//! The rate limiter and the cache write-through both persist string values
//! behind the [`KeyValueStore`] trait. Two backends are provided:
//!
//! - [`MemoryStore`]: process-local, used by tests and ephemeral sessions
//! - [`FileStore`]: a single JSON object on disk, written atomically

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;
use tracing::{debug, info};

/// Errors from a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize store: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// A string key-value store.
pub trait KeyValueStore: Send + Sync {
    /// Reads a value.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Writes a value, replacing any previous one.
    fn set(&self, key: &str, value: String) -> StorageResult<()>;

    /// Removes a value. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> StorageResult<()>;

    /// Lists all keys.
    fn keys(&self) -> StorageResult<Vec<String>>;
}

fn read_guard<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_guard<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// An in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(read_guard(&self.values).get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> StorageResult<()> {
        write_guard(&self.values).insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        write_guard(&self.values).remove(key);
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(read_guard(&self.values).keys().cloned().collect())
    }
}

/// A store persisted as one JSON object in a file.
///
/// Values are kept in memory and the whole file is rewritten on every
/// change: first to a temporary sibling, then renamed over the target.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
}

impl FileStore {
    /// Opens the store at `path`, loading existing values.
    ///
    /// A missing file is an empty store; it is created on the first write.
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        let values = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|source| StorageError::Io {
                action: "read",
                path: path.clone(),
                source,
            })?;
            let values: BTreeMap<String, String> =
                serde_json::from_str(&content).map_err(|source| StorageError::Parse {
                    path: path.clone(),
                    source,
                })?;
            info!(path = %path.display(), keys = values.len(), "Loaded storage file");
            values
        } else {
            debug!(path = %path.display(), "No storage file yet");
            BTreeMap::new()
        };

        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, values: &BTreeMap<String, String>) -> StorageResult<()> {
        let io_err = |action, source| StorageError::Io {
            action,
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_err("create directory for", e))?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(values).map_err(StorageError::Serialize)?;
        fs::write(&temp_path, content).map_err(|e| io_err("write", e))?;
        fs::rename(&temp_path, &self.path).map_err(|e| io_err("rename", e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600));
        }

        debug!(path = %self.path.display(), "Saved storage file");
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(read_guard(&self.values).get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> StorageResult<()> {
        let mut values = write_guard(&self.values);
        values.insert(key.to_string(), value);
        self.save(&values)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let mut values = write_guard(&self.values);
        if values.remove(key).is_some() {
            self.save(&values)?;
        }
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(read_guard(&self.values).keys().cloned().collect())
    }
}
