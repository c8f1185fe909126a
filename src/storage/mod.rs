//! Key-value persistence for conversations and preferences
//!
//! The orchestrator persists small JSON blobs under well-known keys (see
//! [`keys`]). Two backends are provided: an in-memory store for tests and
//! ephemeral sessions, and a file-backed store with one file per key.
//! Both enforce an optional byte capacity over the total stored value
//! size; writes past the cap fail with [`ChatRelayError::StorageFull`] so
//! callers can shed load and retry smaller.

use crate::error::{ChatRelayError, Result};

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Well-known storage keys
pub mod keys {
    /// JSON array of selected model names
    pub const SELECTED_MODELS: &str = "selected_models";
    /// JSON array of stored conversations, newest first
    pub const CONVERSATIONS: &str = "conversations";
    /// Upstream base URL as last shown to the user
    pub const BASE_URL: &str = "base_url";
    /// UI language preference
    pub const LANGUAGE: &str = "language";
    /// UI theme preference
    pub const THEME: &str = "theme";
}

/// String key-value store with optional byte capacity
///
/// Implementations must treat `set` as atomic per key: on a capacity
/// rejection the previous value for that key is left intact.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`, if any
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be read
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write `value` under `key`, replacing any previous value
    ///
    /// # Errors
    ///
    /// Returns [`ChatRelayError::StorageFull`] if the write would push the
    /// total stored bytes past the configured capacity, or another error
    /// if the backend cannot be written
    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    /// Delete the value stored under `key`; removing an absent key is not
    /// an error
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be written
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// In-memory store, used by tests and `--ephemeral` sessions
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
    capacity: Option<usize>,
}

impl MemoryStore {
    /// Create an unbounded in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that rejects writes past `capacity` total value bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: Some(capacity),
        }
    }

    fn stored_bytes_excluding(&self, key: &str) -> usize {
        self.entries
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(_, v)| v.len())
            .sum()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        if let Some(capacity) = self.capacity {
            let total = self.stored_bytes_excluding(key) + value.len();
            if total > capacity {
                return Err(ChatRelayError::StorageFull {
                    key: key.to_string(),
                }
                .into());
            }
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// File-backed store keeping one file per key under a directory
///
/// Keys map directly to file names, so callers must stick to the
/// identifiers in [`keys`] (no path separators).
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    capacity: Option<usize>,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `dir`
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        tracing::debug!("Opened file store at {}", dir.display());
        Ok(Self {
            dir,
            capacity: None,
        })
    }

    /// Open a store that rejects writes past `capacity` total value bytes
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn open_with_capacity(dir: impl AsRef<Path>, capacity: usize) -> Result<Self> {
        let mut store = Self::open(dir)?;
        store.capacity = Some(capacity);
        Ok(store)
    }

    /// Default store location under the platform data directory
    ///
    /// # Errors
    ///
    /// Returns error if no home directory can be determined
    pub fn default_dir() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("io", "chatrelay", "chatrelay").ok_or_else(
            || ChatRelayError::Storage("Could not determine data directory".to_string()),
        )?;
        Ok(dirs.data_dir().to_path_buf())
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn stored_bytes_excluding(&self, key: &str) -> Result<usize> {
        let skip = self.path_for(key);
        let mut total = 0usize;
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.path() == skip {
                continue;
            }
            total += entry.metadata()?.len() as usize;
        }
        Ok(total)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        if let Some(capacity) = self.capacity {
            let total = self.stored_bytes_excluding(key)? + value.len();
            if total > capacity {
                return Err(ChatRelayError::StorageFull {
                    key: key.to_string(),
                }
                .into());
            }
        }
        std::fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
