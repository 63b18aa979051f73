//! Session state persisted across restarts
//!
//! Two values survive between invocations: the folder that was active before the
//! most recent detach, and a single-slot pending switch target. They live in a
//! key-value store owned by the caller and injected into the engine.

use crate::errors::{Result, SessionError};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

pub const LAST_WORKSPACE_FOLDER_KEY: &str = "lastWorkspaceFolder";
pub const PENDING_WORKSPACE_CHANGE_KEY: &str = "pendingWorkspaceChange";

/// Durable string key-value storage
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Option<String>;

    /// Set or, with `None`, remove a key
    fn set(&mut self, key: &str, value: Option<&str>) -> Result<()>;
}

/// JSON file backed store
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: Map<String, Value>,
}

impl FileStore {
    /// Open the store at `path`. A missing file starts empty; an unreadable one
    /// is logged and also starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str::<Map<String, Value>>(&content).unwrap_or_else(|e| {
                warn!(path = %path.display(), "Ignoring corrupt session state: {}", e);
                Map::new()
            }),
            Err(_) => Map::new(),
        };
        debug!(path = %path.display(), keys = values.len(), "Opened session store");
        Self { path, values }
    }

    /// Default location under the per-user data directory
    pub fn default_path() -> Option<PathBuf> {
        directories_next::ProjectDirs::from("", "", "dockside")
            .map(|dirs| dirs.data_dir().join("session.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<()> {
        let store_err = |message: String| SessionError::Store {
            path: self.path.display().to_string(),
            message,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| store_err(e.to_string()))?;
        }
        let content =
            serde_json::to_string_pretty(&self.values).map_err(|e| store_err(e.to_string()))?;
        let temp = self.path.with_extension("json.tmp");
        fs::write(&temp, content).map_err(|e| store_err(e.to_string()))?;
        fs::rename(&temp, &self.path).map_err(|e| store_err(e.to_string()))?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).and_then(|v| v.as_str()).map(str::to_string)
    }

    fn set(&mut self, key: &str, value: Option<&str>) -> Result<()> {
        match value {
            Some(value) => {
                self.values
                    .insert(key.to_string(), Value::String(value.to_string()));
            }
            None => {
                self.values.remove(key);
            }
        }
        self.flush()
    }
}

/// In-memory store; clones share the same map
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A poisoned map is still a valid map
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values().get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Option<&str>) -> Result<()> {
        let mut values = self.values();
        match value {
            Some(value) => values.insert(key.to_string(), value.to_string()),
            None => values.remove(key),
        };
        Ok(())
    }
}

/// Process-wide session fields, written through to the backing store
pub struct SessionState {
    store: Box<dyn KeyValueStore>,
    last_workspace_folder: Option<PathBuf>,
    pending_workspace_change: Option<PathBuf>,
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("last_workspace_folder", &self.last_workspace_folder)
            .field("pending_workspace_change", &self.pending_workspace_change)
            .finish()
    }
}

impl SessionState {
    /// Load the session fields from `store`
    pub fn load(store: impl KeyValueStore + 'static) -> Self {
        let last_workspace_folder = store.get(LAST_WORKSPACE_FOLDER_KEY).map(PathBuf::from);
        let pending_workspace_change = store.get(PENDING_WORKSPACE_CHANGE_KEY).map(PathBuf::from);
        Self {
            store: Box::new(store),
            last_workspace_folder,
            pending_workspace_change,
        }
    }

    pub fn last_workspace_folder(&self) -> Option<&Path> {
        self.last_workspace_folder.as_deref()
    }

    pub fn pending_workspace_change(&self) -> Option<&Path> {
        self.pending_workspace_change.as_deref()
    }

    pub fn set_last_workspace_folder(&mut self, folder: &Path) -> Result<()> {
        self.store
            .set(LAST_WORKSPACE_FOLDER_KEY, Some(&folder.to_string_lossy()))?;
        self.last_workspace_folder = Some(folder.to_path_buf());
        Ok(())
    }

    /// Queue `target` as the pending switch, replacing any previous one
    pub fn set_pending_workspace_change(&mut self, target: &Path) -> Result<()> {
        if let Some(previous) = &self.pending_workspace_change {
            debug!(previous = %previous.display(), "Replacing pending workspace change");
        }
        self.store
            .set(PENDING_WORKSPACE_CHANGE_KEY, Some(&target.to_string_lossy()))?;
        self.pending_workspace_change = Some(target.to_path_buf());
        Ok(())
    }

    pub fn clear_pending_workspace_change(&mut self) -> Result<()> {
        self.store.set(PENDING_WORKSPACE_CHANGE_KEY, None)?;
        self.pending_workspace_change = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_store_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state/session.json");

        let mut session = SessionState::load(FileStore::open(&path));
        assert!(session.pending_workspace_change().is_none());
        session
            .set_pending_workspace_change(Path::new("/src/next"))
            .unwrap();
        session
            .set_last_workspace_folder(Path::new("/src/current"))
            .unwrap();

        let reloaded = SessionState::load(FileStore::open(&path));
        assert_eq!(
            reloaded.pending_workspace_change(),
            Some(Path::new("/src/next"))
        );
        assert_eq!(
            reloaded.last_workspace_folder(),
            Some(Path::new("/src/current"))
        );
    }

    #[test]
    fn test_clear_pending_persists() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("session.json");

        let mut session = SessionState::load(FileStore::open(&path));
        session.set_pending_workspace_change(Path::new("/a")).unwrap();
        session.clear_pending_workspace_change().unwrap();

        let reloaded = SessionState::load(FileStore::open(&path));
        assert!(reloaded.pending_workspace_change().is_none());
    }

    #[test]
    fn test_pending_is_single_slot() {
        let store = MemoryStore::new();
        let mut session = SessionState::load(store.clone());
        session.set_pending_workspace_change(Path::new("/a")).unwrap();
        session.set_pending_workspace_change(Path::new("/b")).unwrap();
        assert_eq!(session.pending_workspace_change(), Some(Path::new("/b")));
        assert_eq!(
            store.get(PENDING_WORKSPACE_CHANGE_KEY).as_deref(),
            Some("/b")
        );
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("session.json");
        fs::write(&path, "not json").unwrap();
        let session = SessionState::load(FileStore::open(&path));
        assert!(session.last_workspace_folder().is_none());
    }
}
