//! Key/value persistence abstraction shared by the public-key cache and the
//! decryption signature manager
//!
//! Read-side failures (`get_item`, `remove_item`, `clear`, `keys`) are
//! swallowed and logged: correctness never depends on cache availability,
//! only performance does. Write failures from `set_item` propagate so quota
//! exhaustion on persistent backends is observable.

mod file;
mod memory;
mod namespaced;

pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use namespaced::NamespacedStorage;

use async_trait::async_trait;

#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Look up a key. Absent keys are `None`, never an error.
    async fn get_item(&self, key: &str) -> Option<String>;

    /// Store a value. May fail on persistent backends; the failure is
    /// surfaced to the caller.
    async fn set_item(&self, key: &str, value: &str) -> crate::Result<()>;

    /// Remove a key. Idempotent; removing a missing key is a no-op.
    async fn remove_item(&self, key: &str);

    /// Remove every key this adapter owns. The namespaced adapter clears
    /// only entries under its own prefix.
    async fn clear(&self);

    /// All keys currently owned by this adapter.
    async fn keys(&self) -> Vec<String>;
}
