//! Persisted resume records.
//!
//! [`ResumeStore`] maps a payload identity to its [`UploadRecord`] on top of
//! any [`KeyValueStore`]. Two payloads sharing an identity share a record;
//! nothing detects that collision.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use capyupload_protocol::UploadRecord;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Errors from key/value backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// String key/value persistence.
///
/// Writes must be visible to a later `get`, including from a new process.
pub trait KeyValueStore: Send + Sync {
    /// Returns the stored value, or `None` if absent or unreadable.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Deletes `key`. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-process store, lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .write()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().unwrap().remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileStore
// ---------------------------------------------------------------------------

/// One file per key under a directory.
///
/// File names are the SHA-256 hex digest of the key, so any key is a valid
/// file name. Values are written to a temporary file and renamed into place.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Uses `dir` for storage, creating it on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", hash_key(key)))
    }
}

fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(value) => Some(value),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read stored value");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// ResumeStore
// ---------------------------------------------------------------------------

/// Upload records keyed by `"<namespace>|<identity>"`.
#[derive(Clone)]
pub struct ResumeStore {
    backend: Arc<dyn KeyValueStore>,
    namespace: String,
}

impl ResumeStore {
    pub fn new(backend: Arc<dyn KeyValueStore>, namespace: impl Into<String>) -> Self {
        Self {
            backend,
            namespace: namespace.into(),
        }
    }

    /// Backend key for an identity.
    pub fn key_for(&self, identity: &str) -> String {
        format!("{}|{}", self.namespace, identity)
    }

    /// Returns the record for `identity`.
    ///
    /// A missing or unparseable value yields `None`; corrupt state means
    /// "nothing to resume", never an error.
    pub fn get(&self, identity: &str) -> Option<UploadRecord> {
        let key = self.key_for(identity);
        let raw = self.backend.get(&key)?;
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(key = %key, error = %e, "ignoring unparseable resume record");
                None
            }
        }
    }

    /// Persists the record for `identity`.
    pub fn set(&self, identity: &str, record: &UploadRecord) -> Result<(), StoreError> {
        let key = self.key_for(identity);
        let json = serde_json::to_string(record)?;
        self.backend.set(&key, &json)?;
        debug!(key = %key, finished = record.finished_parts.len(), "resume record saved");
        Ok(())
    }

    /// Deletes the record for `identity`, if any.
    pub fn remove(&self, identity: &str) -> Result<(), StoreError> {
        let key = self.key_for(identity);
        self.backend.remove(&key)?;
        debug!(key = %key, "resume record removed");
        Ok(())
    }
}
