//! Durable storage for the authenticated slice

use crate::session::SessionState;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

/// Key the persisted root lives under
pub const ROOT_KEY: &str = "root";

/// Current layout version of the persisted root
pub const PERSIST_VERSION: u32 = 1;

/// String key/value storage
#[cfg_attr(test, mockall::automock)]
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// What gets written under [`ROOT_KEY`]. Only the auth slice is persisted.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedRoot {
    version: u32,
    auth: SessionState,
}

/// Serialize the auth slice into storage
pub fn save_session(storage: &dyn Storage, state: &SessionState) -> Result<()> {
    let root = PersistedRoot {
        version: PERSIST_VERSION,
        auth: state.clone(),
    };
    storage.set(ROOT_KEY, &serde_json::to_string(&root)?)
}

/// Load the auth slice, discarding payloads that cannot be trusted
pub fn load_session(storage: &dyn Storage) -> Result<Option<SessionState>> {
    let Some(raw) = storage.get(ROOT_KEY)? else {
        return Ok(None);
    };

    match serde_json::from_str::<PersistedRoot>(&raw) {
        Ok(root) if root.version == PERSIST_VERSION => Ok(Some(root.auth)),
        Ok(root) => {
            warn!(version = root.version, "Discarding persisted session with unknown version");
            storage.remove(ROOT_KEY)?;
            Ok(None)
        }
        Err(e) => {
            warn!("Discarding unreadable persisted session: {e}");
            storage.remove(ROOT_KEY)?;
            Ok(None)
        }
    }
}

/// In-process storage, lost on exit
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// Storage backed by a single JSON object file
///
/// Every write rewrites the whole file through a temporary sibling and a
/// rename, so readers never observe a half-written document.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(entries)?)?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            Error::Storage(format!("failed to replace {}: {e}", self.path.display()))
        })?;
        debug!(path = %self.path.display(), "Wrote storage file");
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read_all()?;
        if entries.remove(key).is_some() {
            self.write_all(&entries)?;
        }
        Ok(())
    }
}
