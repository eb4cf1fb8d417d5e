//! # Key-Value Storage
//!
//! The ambient key-value capability used for user identity and the
//! notification log. Injected as a trait object so production code,
//! the demo binary, and tests can pick different backings.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::warn;

/// Storage failures.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying file I/O failed
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be encoded or decoded
    #[error("storage encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A string key-value store with get/set/remove.
///
/// Values are opaque strings; callers serialize structured data
/// themselves (the notification log stores JSON, identity stores plain
/// values).
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` if the key is absent.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete a key; removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// In-memory store. Used in tests and as the fallback when the
/// file-backed store cannot be opened.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON object file on disk.
///
/// The whole map is kept in memory and rewritten on every mutation;
/// the stored state is small (an identity and at most 50 notifications).
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl JsonFileStore {
    /// Open a store at `path`, loading existing entries.
    ///
    /// A missing file starts the store empty. A file that exists but
    /// does not parse also starts empty with a warning; the next write
    /// replaces it.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();

        let entries = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            match serde_json::from_str(&contents) {
                Ok(map) => map,
                Err(e) => {
                    warn!("store file {} is not valid JSON, starting empty: {}", path.display(), e);
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// The file this store persists to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &HashMap<String, String>) -> Result<(), StorageError> {
        let encoded = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, encoded)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap();
        if entries.remove(key).is_some() {
            return self.persist(&entries);
        }
        Ok(())
    }
}
