//! FHEVM client SDK: encrypted inputs, user decryption with cached
//! EIP-712 authorizations, and transparent mock/production switching.
//!
//! The crate splits into [`fhevm_core`] (types, storage adapters, the
//! signature cache, runtime traits) and [`fhevm_client`] (the client core,
//! chain probing, runtime loaders and the mock instance). This facade
//! re-exports the surface most integrations need.

pub use fhevm_client::{
    DevNodeMetadata, Eip1193Provider, FhevmClient, FhevmConfig, InitParams, LazySdkLoader,
    LocalSigner, MockInstance, NullSdkLoader, SdkLoader, StaticSdkLoader, StatusSubscription,
    Web3Provider,
};
pub use fhevm_core::{
    constants, ClearValue, DecryptRequest, DecryptResult, DecryptionSignature, EncryptParams,
    EncryptResult, EncryptedInput, EncryptedType, Eip712Domain, Eip712Field, Eip712TypedData,
    FhevmError, FhevmInstance, FhevmStatus, FileStorage, InstanceConfig, Keypair, MemoryStorage,
    NamespacedStorage, NetworkConfig, PublicKeyStore, RelayerSdk, Result, StorageAdapter,
    StoredPublicKey, StoredPublicParams, TypedDataSigner,
};
