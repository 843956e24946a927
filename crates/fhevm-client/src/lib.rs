//! fhevm-client: chain probing, runtime loading and the FHEVM client core
//!
//! The client core drives the full lifecycle: resolve the chain id from a
//! provider, decide between a local mock dev node and the production relayer
//! runtime, build an instance (seeding it from the public-key cache), and
//! serve encrypt/decrypt calls against it. UI layers observe the lifecycle
//! through the status subscription and retry by calling `init()` again.

mod client;
mod loader;
mod mock;
mod probe;
mod signer;

pub use client::{FhevmClient, FhevmConfig, InitParams, StatusSubscription};
pub use loader::{validate_network_config, LazySdkLoader, NullSdkLoader, SdkLoader, StaticSdkLoader};
pub use mock::MockInstance;
pub use probe::{
    fetch_dev_node_metadata, resolve_chain_id, web3_client_version, DevNodeMetadata,
    Eip1193Provider, Web3Provider,
};
pub use signer::LocalSigner;

pub use fhevm_core::{FhevmError, Result};
