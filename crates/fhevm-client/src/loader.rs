//! Relayer runtime loading and shape validation
//!
//! On the web the runtime arrives as a dynamically injected global; here a
//! loader yields whatever implements [`RelayerSdk`]. The contract is the
//! same: `is_loaded()` reports presence, `load()` produces a validated
//! handle, and concurrent loads share a single in-flight initialization.

use std::sync::Arc;

use alloy_primitives::Address;
use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::OnceCell;

use fhevm_core::{FhevmError, NetworkConfig, RelayerSdk};

#[async_trait]
pub trait SdkLoader: Send + Sync {
    /// Whether the runtime is already present in this host
    fn is_loaded(&self) -> bool;

    /// Obtain the runtime handle, loading it if needed. Idempotent; the
    /// returned handle is shape-validated.
    async fn load(&self) -> fhevm_core::Result<Arc<dyn RelayerSdk>>;
}

/// Explicit schema validation of the runtime's network configuration: all
/// three verification-authority addresses must be present, hex-prefixed and
/// well-formed.
pub fn validate_network_config(config: &NetworkConfig) -> fhevm_core::Result<()> {
    let fields = [
        ("aclContractAddress", &config.acl_contract_address),
        (
            "kmsVerifierContractAddress",
            &config.kms_verifier_contract_address,
        ),
        (
            "inputVerifierContractAddress",
            &config.input_verifier_contract_address,
        ),
    ];
    for (name, value) in fields {
        if value.is_empty() {
            return Err(FhevmError::RuntimeLoadFailed(format!(
                "network config is missing {name}"
            )));
        }
        if !value.starts_with("0x") || value.parse::<Address>().is_err() {
            return Err(FhevmError::InvalidAddress(format!("{name}: {value}")));
        }
    }
    Ok(())
}

/// A process-local runtime handle, the statically linked substitute for a
/// browser-injected global
pub struct StaticSdkLoader {
    sdk: Arc<dyn RelayerSdk>,
}

impl StaticSdkLoader {
    pub fn new(sdk: Arc<dyn RelayerSdk>) -> Self {
        Self { sdk }
    }
}

#[async_trait]
impl SdkLoader for StaticSdkLoader {
    fn is_loaded(&self) -> bool {
        true
    }

    async fn load(&self) -> fhevm_core::Result<Arc<dyn RelayerSdk>> {
        validate_network_config(&self.sdk.network_config())?;
        Ok(self.sdk.clone())
    }
}

type SdkFactory =
    Box<dyn Fn() -> BoxFuture<'static, fhevm_core::Result<Arc<dyn RelayerSdk>>> + Send + Sync>;

/// Deferred runtime loading with deduplicated concurrent loads: the first
/// `load()` drives the factory, every concurrent caller awaits the same
/// in-flight initialization, later callers get the memoized handle.
pub struct LazySdkLoader {
    factory: SdkFactory,
    cell: OnceCell<Arc<dyn RelayerSdk>>,
}

impl LazySdkLoader {
    pub fn new<F, Fut>(factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = fhevm_core::Result<Arc<dyn RelayerSdk>>>
            + Send
            + 'static,
    {
        Self {
            factory: Box::new(move || Box::pin(factory())),
            cell: OnceCell::new(),
        }
    }
}

#[async_trait]
impl SdkLoader for LazySdkLoader {
    fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    async fn load(&self) -> fhevm_core::Result<Arc<dyn RelayerSdk>> {
        let sdk = self
            .cell
            .get_or_try_init(|| async {
                let sdk = (self.factory)().await?;
                validate_network_config(&sdk.network_config())?;
                Ok::<_, FhevmError>(sdk)
            })
            .await?;
        Ok(sdk.clone())
    }
}

/// A host with no relayer runtime at all. Production-path `init()` against
/// this loader fails with the runtime-unavailable condition.
#[derive(Debug, Default)]
pub struct NullSdkLoader;

impl NullSdkLoader {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SdkLoader for NullSdkLoader {
    fn is_loaded(&self) -> bool {
        false
    }

    async fn load(&self) -> fhevm_core::Result<Arc<dyn RelayerSdk>> {
        Err(FhevmError::RuntimeUnavailable)
    }
}
