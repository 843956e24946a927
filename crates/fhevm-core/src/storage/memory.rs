//! In-memory storage for native hosts and tests

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::StorageAdapter;

/// Process-lifetime storage backed by a `HashMap`
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl StorageAdapter for MemoryStorage {
    async fn get_item(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    async fn set_item(&self, key: &str, value: &str) -> crate::Result<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) {
        self.lock().remove(key);
    }

    async fn clear(&self) {
        self.lock().clear();
    }

    async fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }
}
