//! Prefix-scoped view over a shared storage adapter

use std::sync::Arc;

use async_trait::async_trait;

use super::StorageAdapter;

/// Wraps a shared adapter and scopes every key under a prefix. `clear()`
/// removes only entries under this namespace, leaving the rest of the
/// underlying store untouched.
pub struct NamespacedStorage {
    inner: Arc<dyn StorageAdapter>,
    prefix: String,
}

impl NamespacedStorage {
    pub fn new(inner: Arc<dyn StorageAdapter>, prefix: impl Into<String>) -> Self {
        Self {
            inner,
            prefix: prefix.into(),
        }
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl StorageAdapter for NamespacedStorage {
    async fn get_item(&self, key: &str) -> Option<String> {
        self.inner.get_item(&self.scoped(key)).await
    }

    async fn set_item(&self, key: &str, value: &str) -> crate::Result<()> {
        self.inner.set_item(&self.scoped(key), value).await
    }

    async fn remove_item(&self, key: &str) {
        self.inner.remove_item(&self.scoped(key)).await;
    }

    async fn clear(&self) {
        for key in self.inner.keys().await {
            if key.starts_with(&self.prefix) {
                self.inner.remove_item(&key).await;
            }
        }
    }

    async fn keys(&self) -> Vec<String> {
        self.inner
            .keys()
            .await
            .into_iter()
            .filter_map(|key| key.strip_prefix(&self.prefix).map(str::to_string))
            .collect()
    }
}
