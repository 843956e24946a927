//! Decryption-authorization signature manager
//!
//! A decryption signature authorizes batch decryption for a (contract set,
//! user) identity for 365 days. Signatures are cached under a key derived
//! from the structural hash of the typed data built over the *sorted*
//! contract list, so contract order never affects cache hits. Invalid or
//! expired entries are never repaired in place; the next successful create
//! overwrites them.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::{DECRYPT_SIG_PREFIX, SIGNATURE_DURATION_DAYS};
use crate::runtime::{FhevmInstance, TypedDataSigner};
use crate::storage::StorageAdapter;
use crate::types::{Eip712TypedData, Keypair};

fn timestamp_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Derive the storage key for a signature scoped to (contracts, user).
///
/// The contract list is sorted bytewise before building the keying typed
/// data, and the validity window is zeroed: only the structural hash
/// matters here, not a signable payload. When the caller supplied its own
/// keypair the public key participates in the derivation; otherwise the
/// zero-address sentinel stands in.
pub fn decryption_signature_storage_key(
    instance: &dyn FhevmInstance,
    contract_addresses: &[Address],
    user_address: Address,
    public_key: Option<&str>,
) -> crate::Result<String> {
    let mut sorted = contract_addresses.to_vec();
    sorted.sort();
    sorted.dedup();

    let sentinel = Address::ZERO.to_string();
    let keying_public_key = public_key.unwrap_or(&sentinel);

    let typed_data = instance.create_eip712(keying_public_key, &sorted, 0, 0);
    let digest = typed_data.digest()?;

    Ok(format!("{DECRYPT_SIG_PREFIX}{user_address}:{digest}"))
}

/// A cached decryption authorization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptionSignature {
    pub public_key: String,
    pub private_key: String,
    pub signature: String,
    pub start_timestamp: u64,
    pub duration_days: u64,
    pub user_address: Address,
    pub contract_addresses: Vec<Address>,
    pub eip712: Eip712TypedData,
}

// Two signatures are the same authorization iff their raw signature bytes
// match; the other fields are derived state.
impl PartialEq for DecryptionSignature {
    fn eq(&self, other: &Self) -> bool {
        self.signature == other.signature
    }
}

impl DecryptionSignature {
    /// Valid iff `now < start + duration_days * 86400`. The fields come
    /// from persisted JSON, so a window that overflows u64 is treated as
    /// invalid rather than trusted.
    pub fn is_valid(&self) -> bool {
        self.duration_days
            .checked_mul(86_400)
            .and_then(|window| self.start_timestamp.checked_add(window))
            .map(|deadline| timestamp_now() < deadline)
            .unwrap_or(false)
    }

    /// Attempt a cache read. Absent, malformed and expired entries all read
    /// as a miss; stale entries stay in place until overwritten.
    pub async fn load_from_storage(
        storage: &Arc<dyn StorageAdapter>,
        instance: &dyn FhevmInstance,
        contract_addresses: &[Address],
        user_address: Address,
        public_key: Option<&str>,
    ) -> Option<Self> {
        let key = match decryption_signature_storage_key(
            instance,
            contract_addresses,
            user_address,
            public_key,
        ) {
            Ok(key) => key,
            Err(err) => {
                debug!(error = %err, "Failed to derive signature cache key");
                return None;
            }
        };

        let raw = storage.get_item(&key).await?;
        let signature: DecryptionSignature = match serde_json::from_str(&raw) {
            Ok(sig) => sig,
            Err(err) => {
                debug!(key, error = %err, "Discarding malformed cached signature");
                return None;
            }
        };

        if !signature.is_valid() {
            debug!(key, start = signature.start_timestamp, "Cached signature expired");
            return None;
        }
        Some(signature)
    }

    /// Prompt the signer for a fresh authorization. Returns `None` if the
    /// user declined or the signer failed; that is an expected outcome, not
    /// an error.
    pub async fn create(
        instance: &dyn FhevmInstance,
        contract_addresses: &[Address],
        keypair: Keypair,
        signer: &dyn TypedDataSigner,
    ) -> Option<Self> {
        let user_address = match signer.address().await {
            Ok(address) => address,
            Err(err) => {
                debug!(error = %err, "Signer did not report an address");
                return None;
            }
        };

        let start_timestamp = timestamp_now();
        let duration_days = SIGNATURE_DURATION_DAYS;
        let eip712 = instance.create_eip712(
            &keypair.public_key,
            contract_addresses,
            start_timestamp,
            duration_days,
        );

        match signer.sign_typed_data(&eip712).await {
            Ok(signature) => Some(Self {
                public_key: keypair.public_key,
                private_key: keypair.private_key,
                signature,
                start_timestamp,
                duration_days,
                user_address,
                contract_addresses: contract_addresses.to_vec(),
                eip712,
            }),
            Err(err) => {
                debug!(error = %err, "Typed-data signing was rejected");
                None
            }
        }
    }

    /// Persist under the derived cache key. Persistence failures are logged
    /// and swallowed; an unpersisted signature is still usable in memory.
    pub async fn save_to_storage(
        &self,
        storage: &Arc<dyn StorageAdapter>,
        instance: &dyn FhevmInstance,
        with_public_key: bool,
    ) {
        let public_key = with_public_key.then_some(self.public_key.as_str());
        let key = match decryption_signature_storage_key(
            instance,
            &self.contract_addresses,
            self.user_address,
            public_key,
        ) {
            Ok(key) => key,
            Err(err) => {
                warn!(error = %err, "Failed to derive signature cache key, not persisting");
                return;
            }
        };

        let encoded = match serde_json::to_string(self) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(error = %err, "Failed to encode signature, not persisting");
                return;
            }
        };

        if let Err(err) = storage.set_item(&key, &encoded).await {
            warn!(key, error = %err, "Failed to persist decryption signature");
        }
    }

    /// The load-or-create flow: cache hit returns without invoking the
    /// signer; a miss generates (or reuses) a keypair, prompts for a
    /// signature and writes it back. Returns `None` when no signature could
    /// be obtained.
    pub async fn load_or_sign(
        instance: &dyn FhevmInstance,
        contract_addresses: &[Address],
        signer: &dyn TypedDataSigner,
        storage: &Arc<dyn StorageAdapter>,
        keypair: Option<Keypair>,
    ) -> Option<Self> {
        let user_address = match signer.address().await {
            Ok(address) => address,
            Err(err) => {
                debug!(error = %err, "Signer did not report an address");
                return None;
            }
        };

        let cached = Self::load_from_storage(
            storage,
            instance,
            contract_addresses,
            user_address,
            keypair.as_ref().map(|kp| kp.public_key.as_str()),
        )
        .await;
        if let Some(cached) = cached {
            return Some(cached);
        }

        let supplied_keypair = keypair.is_some();
        let keypair = keypair.unwrap_or_else(|| instance.generate_keypair());

        let signature = Self::create(instance, contract_addresses, keypair, signer).await?;
        signature
            .save_to_storage(storage, instance, supplied_keypair)
            .await;
        Some(signature)
    }
}
