//! File-backed storage with a lazily opened, memoized backing map
//!
//! The persistent analogue of a structured browser store: the file is read
//! once on first access and the loaded map is memoized behind a single async
//! mutex, so concurrent callers share one underlying open instead of racing
//! on the initial load. Writes persist while still holding the lock, so
//! write-backs reach disk in the same order the map was mutated.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};
use tracing::warn;

use crate::error::FhevmError;

use super::StorageAdapter;

#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    // None until the first access loads (or initializes) the map
    state: Mutex<Option<HashMap<String, String>>>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(None),
        }
    }

    /// Lock the state, loading the backing file on first access. Load
    /// failures degrade to an empty map; they must not poison reads.
    async fn open(&self) -> MutexGuard<'_, Option<HashMap<String, String>>> {
        let mut guard = self.state.lock().await;
        if guard.is_none() {
            let entries = match tokio::fs::read_to_string(&self.path).await {
                Ok(raw) => match serde_json::from_str(&raw) {
                    Ok(entries) => entries,
                    Err(err) => {
                        warn!(path = %self.path.display(), error = %err, "Discarding malformed storage file");
                        HashMap::new()
                    }
                },
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
                Err(err) => {
                    warn!(path = %self.path.display(), error = %err, "Failed to read storage file");
                    HashMap::new()
                }
            };
            *guard = Some(entries);
        }
        guard
    }

    async fn persist(&self, entries: &HashMap<String, String>) -> crate::Result<()> {
        let encoded = serde_json::to_string(entries)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| FhevmError::StorageWrite(err.to_string()))?;
        }
        tokio::fs::write(&self.path, encoded)
            .await
            .map_err(|err| FhevmError::StorageWrite(err.to_string()))
    }
}

#[async_trait]
impl StorageAdapter for FileStorage {
    async fn get_item(&self, key: &str) -> Option<String> {
        let guard = self.open().await;
        guard.as_ref().and_then(|entries| entries.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> crate::Result<()> {
        let mut guard = self.open().await;
        let entries = guard.get_or_insert_with(HashMap::new);
        entries.insert(key.to_string(), value.to_string());
        self.persist(entries).await
    }

    async fn remove_item(&self, key: &str) {
        let mut guard = self.open().await;
        let entries = guard.get_or_insert_with(HashMap::new);
        entries.remove(key);
        if let Err(err) = self.persist(entries).await {
            warn!(path = %self.path.display(), error = %err, "Failed to persist removal");
        }
    }

    async fn clear(&self) {
        let mut guard = self.open().await;
        let entries = guard.get_or_insert_with(HashMap::new);
        entries.clear();
        if let Err(err) = self.persist(entries).await {
            warn!(path = %self.path.display(), error = %err, "Failed to persist clear");
        }
    }

    async fn keys(&self) -> Vec<String> {
        let guard = self.open().await;
        guard
            .as_ref()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }
}
