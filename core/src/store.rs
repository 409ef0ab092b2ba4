// Durable key/value store backing session, profile, and pending-navigation state
// One JSON object file per scope, written with temp-file rename under an exclusive lock

use async_trait::async_trait;
use fs2::FileExt;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Failures the store surfaces to callers. Expected conditions (missing key,
/// missing file) are `Ok(None)` / empty maps, never errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed store data in {context}: {source}")]
    Malformed {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Scoped, durable string-to-string mapping. Last write wins per key; the
/// store offers no transactions, so readers must tolerate concurrent writers.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` when the key was never written or was removed
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    /// Write a value, overwriting any previous one
    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;
    /// Remove a key; removing an absent key is a no-op
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Data-directory resolution for on-disk scopes
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding one JSON file per scope
    pub data_dir: PathBuf,
}

impl StoreConfig {
    /// Create configuration using the default data directory
    pub fn default_paths() -> Self {
        let data_dir = dirs::home_dir()
            .map(|h| h.join(".mela"))
            .unwrap_or_else(|| PathBuf::from("/tmp/mela"));
        Self { data_dir }
    }

    /// Create configuration from environment variables, falling back to defaults
    ///
    /// MELA_DATA_DIR overrides the data directory entirely.
    pub fn from_env() -> Self {
        if let Ok(override_dir) = std::env::var("MELA_DATA_DIR") {
            return Self {
                data_dir: PathBuf::from(override_dir),
            };
        }
        Self::default_paths()
    }

    /// File backing a named scope
    pub fn scope_file(&self, scope: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", scope))
    }

    /// Ensure the data directory exists, with 0700 permissions on Unix
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.data_dir)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.data_dir, fs::Permissions::from_mode(0o700))?;
        }

        Ok(())
    }
}

/// File-backed store: the whole scope is loaded at open and written through on
/// every mutation. Scope files are small (a few dozen short strings), so the
/// write-through cost is a single page.
pub struct FileStore {
    path: PathBuf,
    cache: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Open (or create) the store for a scope
    pub fn open(config: &StoreConfig, scope: &str) -> Result<Self, StoreError> {
        let path = config.scope_file(scope);
        config.ensure_dirs().map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;

        let cache = Self::load(&path)?;
        Ok(Self {
            path,
            cache: Mutex::new(cache),
        })
    }

    /// Load the scope file, treating a missing or empty file as an empty map
    fn load(path: &Path) -> Result<HashMap<String, String>, StoreError> {
        if !path.exists() {
            return Ok(HashMap::new());
        }

        let contents = fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        if contents.trim().is_empty() {
            return Ok(HashMap::new());
        }

        serde_json::from_str(&contents).map_err(|source| StoreError::Malformed {
            context: path.display().to_string(),
            source,
        })
    }

    /// Write the full map back to disk under an exclusive lock
    ///
    /// The lock is taken on the scope file itself; the contents go through a
    /// temp file + rename so a concurrent reader never observes a torn write.
    fn flush(&self, map: &HashMap<String, String>) -> Result<(), StoreError> {
        let io_err = |source: std::io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&self.path)
            .map_err(io_err)?;
        lock.lock_exclusive().map_err(io_err)?;

        let contents =
            serde_json::to_string_pretty(map).map_err(|source| StoreError::Malformed {
                context: self.path.display().to_string(),
                source,
            })?;

        // Temp file in the same directory so the rename stays on one filesystem
        let temp_path = self.path.with_file_name(format!(
            ".{}.tmp.{}",
            self.path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("scope"),
            std::process::id()
        ));

        fs::write(&temp_path, contents).map_err(io_err)?;
        fs::rename(&temp_path, &self.path).map_err(io_err)?;

        // Lock is released when `lock` is dropped
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.cache.lock().unwrap().get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let snapshot = {
            let mut cache = self.cache.lock().unwrap();
            cache.insert(key.to_string(), value.to_string());
            cache.clone()
        };
        self.flush(&snapshot)
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let snapshot = {
            let mut cache = self.cache.lock().unwrap();
            if cache.remove(key).is_none() {
                return Ok(());
            }
            cache.clone()
        };
        self.flush(&snapshot)
    }
}

/// In-memory store for tests and for hosts that bring their own persistence
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}
