//! Key-value persistence for the settings and task records.

use directories::ProjectDirs;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

pub const SETTINGS_KEY: &str = "settings";
pub const TASKS_KEY: &str = "tasks";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Raw string records addressed by fixed key names.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// One `<key>.json` file per record inside a data directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Platform data directory, e.g. `~/.local/share/pocus` on Linux.
pub fn default_data_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "pocus", "pocus").map(|dirs| dirs.data_dir().to_path_buf())
}

/// Reads and decodes `key`. Missing, unreadable or malformed records all
/// yield `T::default()`.
pub fn load_or_default<T>(store: &dyn KvStore, key: &str) -> T
where
    T: DeserializeOwned + Default,
{
    match store.get(key) {
        Ok(Some(json)) => match serde_json::from_str(&json) {
            Ok(value) => value,
            Err(e) => {
                warn!("Discarding malformed '{}' record: {}", key, e);
                T::default()
            }
        },
        Ok(None) => {
            debug!("No '{}' record yet, using defaults", key);
            T::default()
        }
        Err(e) => {
            warn!("Failed to read '{}' record: {}", key, e);
            T::default()
        }
    }
}

pub fn save_json<T: Serialize>(store: &dyn KvStore, key: &str, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(value)?;
    store.set(key, &json)
}
