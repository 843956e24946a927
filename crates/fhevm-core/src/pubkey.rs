//! Public-key cache keyed by verification-authority (ACL) address
//!
//! The FHE public key and public parameters are expensive to fetch from the
//! relayer; caching them avoids a network round-trip for a previously-seen
//! authority address. Reads never fail: malformed or partial entries are
//! treated as absent. Writes validate their input, since handing the cache
//! malformed key material is a programming error rather than an expected
//! runtime condition.

use std::sync::Arc;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{PUBLIC_KEY_PREFIX, PUBLIC_PARAMS_PREFIX};
use crate::error::FhevmError;
use crate::storage::StorageAdapter;

/// FHE public key as persisted per ACL address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPublicKey {
    pub public_key_id: String,
    pub public_key: String,
}

/// FHE public parameters as persisted per ACL address, fixed at the
/// 2048-bit parameter size
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPublicParams {
    pub public_params_id: String,
    pub public_params: String,
}

/// Composite cache lookup result. `public_key` is present only when both
/// the id and the key material exist together.
#[derive(Debug, Clone, Default)]
pub struct CachedKeys {
    pub public_key: Option<StoredPublicKey>,
    pub public_params: Option<StoredPublicParams>,
}

/// Cache over a shared storage adapter (borrowed, not owned)
#[derive(Clone)]
pub struct PublicKeyStore {
    storage: Arc<dyn StorageAdapter>,
}

impl PublicKeyStore {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self { storage }
    }

    /// Read the cached key and params for an authority address. Never fails;
    /// anything that does not decode and validate reads as absent.
    pub async fn get(&self, acl_address: Address) -> CachedKeys {
        let public_key = self
            .read_slot::<StoredPublicKey>(&format!("{PUBLIC_KEY_PREFIX}{acl_address}"))
            .await
            .filter(|pk| {
                let complete = !pk.public_key_id.is_empty() && !pk.public_key.is_empty();
                if !complete {
                    debug!(acl = %acl_address, "Cached public key is incomplete, ignoring");
                }
                complete
            });

        let public_params = self
            .read_slot::<StoredPublicParams>(&format!("{PUBLIC_PARAMS_PREFIX}{acl_address}"))
            .await
            .filter(|pp| {
                let complete = !pp.public_params_id.is_empty() && !pp.public_params.is_empty();
                if !complete {
                    debug!(acl = %acl_address, "Cached public params are incomplete, ignoring");
                }
                complete
            });

        CachedKeys {
            public_key,
            public_params,
        }
    }

    /// Write-through after a successful instance creation. Whichever of
    /// key/params is present gets persisted; malformed input is rejected.
    pub async fn set(
        &self,
        acl_address: Address,
        public_key: Option<&StoredPublicKey>,
        public_params: Option<&StoredPublicParams>,
    ) -> crate::Result<()> {
        if let Some(pk) = public_key {
            if pk.public_key_id.is_empty() || pk.public_key.is_empty() {
                return Err(FhevmError::KeyMaterial(
                    "public key id and data must both be non-empty".into(),
                ));
            }
        }
        if let Some(pp) = public_params {
            if pp.public_params_id.is_empty() || pp.public_params.is_empty() {
                return Err(FhevmError::KeyMaterial(
                    "public params id and data must both be non-empty".into(),
                ));
            }
        }

        if let Some(pk) = public_key {
            let key = format!("{PUBLIC_KEY_PREFIX}{acl_address}");
            self.storage
                .set_item(&key, &serde_json::to_string(pk)?)
                .await?;
        }
        if let Some(pp) = public_params {
            let key = format!("{PUBLIC_PARAMS_PREFIX}{acl_address}");
            self.storage
                .set_item(&key, &serde_json::to_string(pp)?)
                .await?;
        }
        Ok(())
    }

    async fn read_slot<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.storage.get_item(key).await?;
        match serde_json::from_str(&raw) {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                debug!(key, error = %err, "Discarding malformed cache entry");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn store() -> PublicKeyStore {
        PublicKeyStore::new(Arc::new(MemoryStorage::new()))
    }

    fn acl() -> Address {
        Address::from([0x11u8; 20])
    }

    #[tokio::test]
    async fn test_get_on_unknown_address_is_empty() {
        let cached = store().get(acl()).await;
        assert!(cached.public_key.is_none());
        assert!(cached.public_params.is_none());
    }

    #[tokio::test]
    async fn test_set_then_get_round_trip() {
        let store = store();
        let pk = StoredPublicKey {
            public_key_id: "key-1".into(),
            public_key: "0xabcd".into(),
        };
        let pp = StoredPublicParams {
            public_params_id: "default".into(),
            public_params: "0x1234".into(),
        };
        store.set(acl(), Some(&pk), Some(&pp)).await.unwrap();

        let cached = store.get(acl()).await;
        assert_eq!(cached.public_key, Some(pk));
        assert_eq!(cached.public_params, Some(pp));
    }

    #[tokio::test]
    async fn test_set_rejects_empty_key_material() {
        let pk = StoredPublicKey {
            public_key_id: String::new(),
            public_key: "0xabcd".into(),
        };
        let err = store().set(acl(), Some(&pk), None).await.unwrap_err();
        assert!(matches!(err, FhevmError::KeyMaterial(_)));
    }

    #[tokio::test]
    async fn test_malformed_entry_reads_as_absent() {
        let storage: Arc<dyn StorageAdapter> = Arc::new(MemoryStorage::new());
        storage
            .set_item(&format!("{PUBLIC_KEY_PREFIX}{}", acl()), "{not json")
            .await
            .unwrap();

        let cached = PublicKeyStore::new(storage).get(acl()).await;
        assert!(cached.public_key.is_none());
    }
}
