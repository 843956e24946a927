//! Trait seams to the external relayer runtime and to a wallet signer
//!
//! The runtime performs the actual homomorphic cryptography; this SDK only
//! orchestrates it. On the web the runtime is a dynamically loaded global,
//! here it is whatever implements [`RelayerSdk`]: a statically linked
//! library, a process-local handle, or a test double.

use alloy_primitives::Address;
use async_trait::async_trait;

use crate::pubkey::{StoredPublicKey, StoredPublicParams};
use crate::signature::DecryptionSignature;
use crate::types::{
    DecryptRequest, DecryptResult, EncryptResult, Eip712TypedData, InstanceConfig, Keypair,
    NetworkConfig,
};

/// The relayer runtime entry point
#[async_trait]
pub trait RelayerSdk: Send + Sync {
    /// Boot the runtime. Idempotent: implementations guard with an internal
    /// flag and report `true` once booted. A `false` return means the boot
    /// ran and failed without a transport error.
    async fn init(&self) -> crate::Result<bool>;

    /// Whether the runtime has already been booted
    fn is_initialized(&self) -> bool;

    /// The runtime's built-in network configuration, including the fixed
    /// verification-authority addresses
    fn network_config(&self) -> NetworkConfig;

    /// Build an encryption instance from the merged configuration
    async fn create_instance(
        &self,
        config: InstanceConfig,
    ) -> crate::Result<std::sync::Arc<dyn FhevmInstance>>;
}

/// An opaque handle to a booted encryption runtime, created at most once per
/// successful `init()` and replaced wholesale on re-init
#[async_trait]
pub trait FhevmInstance: Send + Sync + std::fmt::Debug {
    /// Open an encrypted-input builder scoped to a (contract, user) pair
    fn create_encrypted_input(
        &self,
        contract_address: Address,
        user_address: Address,
    ) -> crate::Result<Box<dyn EncryptedInput>>;

    /// The instance's FHE public key, if it reports one
    fn get_public_key(&self) -> Option<StoredPublicKey>;

    /// The instance's public parameters for the given parameter size
    fn get_public_params(&self, bits: u32) -> Option<StoredPublicParams>;

    /// Build the typed-data structure authorizing decryption for the given
    /// contract set and validity window
    fn create_eip712(
        &self,
        public_key: &str,
        contract_addresses: &[Address],
        start_timestamp: u64,
        duration_days: u64,
    ) -> Eip712TypedData;

    /// Generate an ephemeral keypair for a decryption authorization
    fn generate_keypair(&self) -> Keypair;

    /// Batch-decrypt ciphertext handles under a valid authorization
    /// signature. Returns the handle-to-plaintext mapping unmodified.
    async fn user_decrypt(
        &self,
        requests: &[DecryptRequest],
        signature: &DecryptionSignature,
    ) -> crate::Result<DecryptResult>;
}

/// Encrypted-input builder: exactly one setter call per value, then a single
/// finalize. No retries; finalize either succeeds or the operation fails.
#[async_trait]
pub trait EncryptedInput: Send {
    fn add_bool(&mut self, value: bool);
    fn add_u8(&mut self, value: u8);
    fn add_u16(&mut self, value: u16);
    fn add_u32(&mut self, value: u32);
    fn add_u64(&mut self, value: u64);
    fn add_u128(&mut self, value: u128);
    fn add_u256(&mut self, value: alloy_primitives::U256);
    fn add_address(&mut self, value: Address);

    /// Finalize the builder, producing ciphertext handles and the input
    /// proof
    async fn encrypt(self: Box<Self>) -> crate::Result<EncryptResult>;
}

/// A wallet capable of EIP-712 typed-data signing. `sign_typed_data` may
/// suspend indefinitely on user interaction; callers abandon the flow by
/// dropping the future.
#[async_trait]
pub trait TypedDataSigner: Send + Sync {
    async fn address(&self) -> crate::Result<Address>;

    async fn sign_typed_data(&self, typed_data: &Eip712TypedData) -> crate::Result<String>;
}
