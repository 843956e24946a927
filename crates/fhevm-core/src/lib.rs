//! fhevm-core: Core types and storage-backed caches for the FHEVM client SDK
//!
//! This crate defines the pieces that do not depend on a live chain
//! connection:
//! - the shared data model (statuses, encrypted types, encrypt/decrypt
//!   payloads, EIP-712 structures)
//! - the error taxonomy
//! - the storage adapter abstraction with in-memory, file-backed and
//!   namespaced implementations
//! - the public-key cache (per verification-authority address)
//! - the decryption-authorization signature manager (365-day cache)
//! - the traits the client core uses to talk to the external relayer
//!   runtime and to a wallet signer
//!
//! The actual homomorphic encryption is delegated to an external relayer
//! runtime reachable through the [`RelayerSdk`] / [`FhevmInstance`] traits;
//! this crate treats it as a black box.

mod error;
mod pubkey;
mod runtime;
mod signature;
pub mod storage;
mod types;

pub use error::FhevmError;
pub use pubkey::{CachedKeys, PublicKeyStore, StoredPublicKey, StoredPublicParams};
pub use runtime::{EncryptedInput, FhevmInstance, RelayerSdk, TypedDataSigner};
pub use signature::{decryption_signature_storage_key, DecryptionSignature};
pub use storage::{FileStorage, MemoryStorage, NamespacedStorage, StorageAdapter};
pub use types::{
    ClearValue, DecryptRequest, DecryptResult, EncryptParams, EncryptResult, EncryptedType,
    Eip712Domain, Eip712Field, Eip712TypedData, FhevmStatus, InstanceConfig, Keypair,
    NetworkConfig,
};

pub type Result<T> = std::result::Result<T, FhevmError>;

/// Stable storage key layout and fixed protocol constants
pub mod constants {
    /// Storage key prefix for cached FHE public keys, suffixed with the
    /// verification-authority (ACL) address
    pub const PUBLIC_KEY_PREFIX: &str = "fhevm:publicKey:";

    /// Storage key prefix for cached FHE public parameters
    pub const PUBLIC_PARAMS_PREFIX: &str = "fhevm:publicParams:";

    /// Storage key prefix for cached decryption signatures, suffixed with
    /// `<userAddress>:<digest>`
    pub const DECRYPT_SIG_PREFIX: &str = "fhevm:decryptSig:";

    /// Fixed parameter-size tag used when fetching public parameters
    pub const PUBLIC_PARAMS_BITS: u32 = 2048;

    /// Validity window of a decryption signature, in days
    pub const SIGNATURE_DURATION_DAYS: u64 = 365;

    /// Chain id of the default local development node
    pub const DEFAULT_MOCK_CHAIN_ID: u64 = 31337;

    /// RPC endpoint of the default local development node
    pub const DEFAULT_MOCK_CHAIN_RPC: &str = "http://localhost:8545";
}
