//! FHEVM client core: status state machine, init orchestration and the
//! encrypt/decrypt entry points

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use alloy_primitives::{Address, U256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use fhevm_core::constants::{DEFAULT_MOCK_CHAIN_ID, DEFAULT_MOCK_CHAIN_RPC, PUBLIC_PARAMS_BITS};
use fhevm_core::{
    ClearValue, DecryptRequest, DecryptResult, DecryptionSignature, EncryptParams, EncryptResult,
    EncryptedInput, EncryptedType, FhevmError, FhevmInstance, FhevmStatus, InstanceConfig,
    Keypair, MemoryStorage, PublicKeyStore, StorageAdapter, TypedDataSigner,
};

use crate::loader::SdkLoader;
use crate::mock::MockInstance;
use crate::probe::{fetch_dev_node_metadata, resolve_chain_id, Web3Provider};

/// Client configuration, immutable after construction
#[derive(Default)]
pub struct FhevmConfig {
    /// Storage backing the public-key and signature caches. Defaults to
    /// in-memory storage.
    pub storage: Option<Arc<dyn StorageAdapter>>,
    /// Extra mock-chain registrations overlaying the built-in default
    /// (31337 -> http://localhost:8545)
    pub mock_chains: HashMap<u64, String>,
}

impl FhevmConfig {
    pub fn with_storage(mut self, storage: Arc<dyn StorageAdapter>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_mock_chain(mut self, chain_id: u64, rpc_url: impl Into<String>) -> Self {
        self.mock_chains.insert(chain_id, rpc_url.into());
        self
    }
}

/// Parameters for `init()`
#[derive(Debug, Clone)]
pub struct InitParams {
    pub provider: Web3Provider,
    /// Skips chain-id detection when supplied
    pub chain_id: Option<u64>,
}

type StatusListener = Arc<dyn Fn(FhevmStatus) + Send + Sync>;

#[derive(Default)]
struct ListenerRegistry {
    entries: Mutex<Vec<(u64, StatusListener)>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    fn lock(&self) -> MutexGuard<'_, Vec<(u64, StatusListener)>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn subscribe(&self, listener: StatusListener) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.lock().push((id, listener));
        id
    }

    fn unsubscribe(&self, id: u64) {
        self.lock().retain(|(entry_id, _)| *entry_id != id);
    }

    fn notify(&self, status: FhevmStatus) {
        // snapshot so listeners can subscribe/unsubscribe reentrantly
        let snapshot: Vec<StatusListener> =
            self.lock().iter().map(|(_, listener)| listener.clone()).collect();
        for listener in snapshot {
            listener(status);
        }
    }
}

/// Handle returned by `on_status_change`; dropping it does NOT unsubscribe,
/// and calling `unsubscribe` more than once is a no-op.
pub struct StatusSubscription {
    id: u64,
    registry: Weak<ListenerRegistry>,
}

impl StatusSubscription {
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(self.id);
        }
    }
}

struct ClientState {
    status: FhevmStatus,
    instance: Option<Arc<dyn FhevmInstance>>,
}

/// Framework-agnostic FHEVM client.
///
/// Owns its status, listener registry and instance handle exclusively, so
/// multiple clients coexist without cross-talk (give them distinct storage
/// adapters if persistence must be isolated too).
pub struct FhevmClient {
    mock_chains: HashMap<u64, String>,
    storage: Arc<dyn StorageAdapter>,
    pubkeys: PublicKeyStore,
    loader: Arc<dyn SdkLoader>,
    state: Mutex<ClientState>,
    listeners: Arc<ListenerRegistry>,
    init_epoch: AtomicU64,
}

impl FhevmClient {
    pub fn new(config: FhevmConfig, loader: Arc<dyn SdkLoader>) -> Self {
        let storage = config
            .storage
            .unwrap_or_else(|| Arc::new(MemoryStorage::new()) as Arc<dyn StorageAdapter>);

        // configured registry overlays the fixed default
        let mut mock_chains = HashMap::new();
        mock_chains.insert(DEFAULT_MOCK_CHAIN_ID, DEFAULT_MOCK_CHAIN_RPC.to_string());
        mock_chains.extend(config.mock_chains);

        Self {
            mock_chains,
            pubkeys: PublicKeyStore::new(storage.clone()),
            storage,
            loader,
            state: Mutex::new(ClientState {
                status: FhevmStatus::Idle,
                instance: None,
            }),
            listeners: Arc::new(ListenerRegistry::default()),
            init_epoch: AtomicU64::new(0),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current lifecycle status; `Idle` immediately after construction
    pub fn status(&self) -> FhevmStatus {
        self.lock_state().status
    }

    /// Subscribe to status transitions. The returned handle unsubscribes
    /// idempotently.
    pub fn on_status_change<F>(&self, listener: F) -> StatusSubscription
    where
        F: Fn(FhevmStatus) + Send + Sync + 'static,
    {
        let id = self.listeners.subscribe(Arc::new(listener));
        StatusSubscription {
            id,
            registry: Arc::downgrade(&self.listeners),
        }
    }

    /// The active instance, if a prior `init()` succeeded
    pub fn instance(&self) -> fhevm_core::Result<Arc<dyn FhevmInstance>> {
        self.lock_state()
            .instance
            .clone()
            .ok_or(FhevmError::NotInitialized)
    }

    /// The instance's FHE public key
    pub fn get_public_key(&self) -> fhevm_core::Result<String> {
        let instance = self.instance()?;
        instance
            .get_public_key()
            .map(|key| key.public_key)
            .ok_or_else(|| FhevmError::Relayer("instance reports no public key".into()))
    }

    /// Initialize (or re-initialize) the client.
    ///
    /// Re-entrant: a newer call supersedes an outstanding one, whose late
    /// result is discarded. A cancelled attempt resolves to `Cancelled` and
    /// never drives a status transition; any other failure transitions the
    /// status to `Error` and re-raises the cause verbatim.
    pub async fn init(
        &self,
        params: InitParams,
        cancel: CancellationToken,
    ) -> fhevm_core::Result<Arc<dyn FhevmInstance>> {
        let epoch = self.init_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.transition(epoch, FhevmStatus::Loading);

        match self.run_init(&params, &cancel, epoch).await {
            Ok(instance) => Ok(instance),
            Err(err) => {
                if !err.is_cancelled() {
                    self.transition(epoch, FhevmStatus::Error);
                }
                Err(err)
            }
        }
    }

    async fn run_init(
        &self,
        params: &InitParams,
        cancel: &CancellationToken,
        epoch: u64,
    ) -> fhevm_core::Result<Arc<dyn FhevmInstance>> {
        let chain_id = match params.chain_id {
            Some(chain_id) => chain_id,
            None => resolve_chain_id(&params.provider).await?,
        };
        self.checkpoint(cancel)?;

        if let Some(rpc_url) = self.mock_chain_rpc(chain_id, &params.provider) {
            let metadata = fetch_dev_node_metadata(&rpc_url).await;
            self.checkpoint(cancel)?;

            if let Some(metadata) = metadata {
                info!(chain_id, rpc_url, "Initializing mock FHEVM instance");
                let instance = MockInstance::connect(&rpc_url, chain_id, &metadata)?;
                return self.commit(epoch, cancel, instance);
            }
            // not a dev node: fall through to the production path
            debug!(chain_id, rpc_url, "No FHEVM dev node detected");
        }

        if !self.loader.is_loaded() {
            debug!("Relayer runtime not present, loading");
        }
        let sdk = self.loader.load().await?;
        self.checkpoint(cancel)?;

        if !sdk.is_initialized() {
            if !sdk.init().await? {
                return Err(FhevmError::RuntimeInitFailed);
            }
            self.checkpoint(cancel)?;
        }

        let network = sdk.network_config();
        let acl_address: Address = network.acl_contract_address.parse().map_err(|_| {
            FhevmError::InvalidAddress(format!(
                "aclContractAddress: {}",
                network.acl_contract_address
            ))
        })?;

        // cache-first: seed the instance with previously fetched material
        let cached = self.pubkeys.get(acl_address).await;
        self.checkpoint(cancel)?;

        let config = InstanceConfig {
            chain_id,
            network_url: params.provider.rpc_url().map(str::to_string),
            network,
            public_key: cached.public_key.clone(),
            public_params: cached.public_params.clone(),
        };

        let instance = sdk.create_instance(config).await?;
        self.checkpoint(cancel)?;

        // write-through so the next load skips key generation; keep the
        // cached id when one exists
        let fresh_key = instance.get_public_key().map(|mut key| {
            if let Some(cached_key) = &cached.public_key {
                key.public_key_id = cached_key.public_key_id.clone();
            }
            key
        });
        let fresh_params = instance.get_public_params(PUBLIC_PARAMS_BITS);
        self.pubkeys
            .set(acl_address, fresh_key.as_ref(), fresh_params.as_ref())
            .await?;
        self.checkpoint(cancel)?;

        info!(chain_id, acl = %acl_address, "FHEVM instance ready");
        self.commit(epoch, cancel, instance)
    }

    /// Registered mock chains resolve to the provider URL when one was
    /// given, else to the registry endpoint
    fn mock_chain_rpc(&self, chain_id: u64, provider: &Web3Provider) -> Option<String> {
        if !self.mock_chains.contains_key(&chain_id) {
            return None;
        }
        provider
            .rpc_url()
            .map(str::to_string)
            .or_else(|| self.mock_chains.get(&chain_id).cloned())
    }

    fn checkpoint(&self, cancel: &CancellationToken) -> fhevm_core::Result<()> {
        if cancel.is_cancelled() {
            Err(FhevmError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Install the instance and go `Ready`, unless this attempt was
    /// cancelled or superseded in the meantime: a late-arriving result must
    /// not overwrite a newer one.
    fn commit(
        &self,
        epoch: u64,
        cancel: &CancellationToken,
        instance: Arc<dyn FhevmInstance>,
    ) -> fhevm_core::Result<Arc<dyn FhevmInstance>> {
        self.checkpoint(cancel)?;
        if self.init_epoch.load(Ordering::SeqCst) != epoch {
            debug!(epoch, "Discarding superseded init result");
            return Err(FhevmError::Cancelled);
        }
        {
            let mut state = self.lock_state();
            state.instance = Some(instance.clone());
            state.status = FhevmStatus::Ready;
        }
        self.listeners.notify(FhevmStatus::Ready);
        Ok(instance)
    }

    /// Status transitions are ignored for superseded attempts
    fn transition(&self, epoch: u64, status: FhevmStatus) {
        if self.init_epoch.load(Ordering::SeqCst) != epoch {
            return;
        }
        {
            self.lock_state().status = status;
        }
        self.listeners.notify(status);
    }

    /// Encrypt a single value into an on-chain-ready ciphertext handle.
    ///
    /// The type tag is validated against the value before the instance is
    /// touched; a single finalize call produces the handles and proof.
    pub async fn encrypt(&self, params: EncryptParams) -> fhevm_core::Result<EncryptResult> {
        let instance = self.instance()?;
        let prepared = prepare_value(&params)?;

        let mut input =
            instance.create_encrypted_input(params.contract_address, params.user_address)?;
        prepared.apply(input.as_mut());
        input.encrypt().await
    }

    /// Decrypt a batch of ciphertext handles under a cached-or-fresh
    /// authorization signature from `signer`
    pub async fn decrypt(
        &self,
        requests: &[DecryptRequest],
        signer: &dyn TypedDataSigner,
    ) -> fhevm_core::Result<DecryptResult> {
        self.decrypt_with_keypair(requests, signer, None).await
    }

    /// Like `decrypt`, but binding the authorization to a caller-supplied
    /// keypair (deterministic tests, cross-tab key reuse)
    pub async fn decrypt_with_keypair(
        &self,
        requests: &[DecryptRequest],
        signer: &dyn TypedDataSigner,
        keypair: Option<Keypair>,
    ) -> fhevm_core::Result<DecryptResult> {
        let instance = self.instance()?;

        // unique contract set, first-seen order
        let mut contract_addresses: Vec<Address> = Vec::new();
        for request in requests {
            if !contract_addresses.contains(&request.contract_address) {
                contract_addresses.push(request.contract_address);
            }
        }

        let signature = DecryptionSignature::load_or_sign(
            instance.as_ref(),
            &contract_addresses,
            signer,
            &self.storage,
            keypair,
        )
        .await
        .ok_or(FhevmError::SignatureFailed)?;

        instance.user_decrypt(requests, &signature).await
    }
}

enum PreparedValue {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    U128(u128),
    U256(U256),
    Address(Address),
}

impl PreparedValue {
    fn apply(self, input: &mut dyn EncryptedInput) {
        match self {
            PreparedValue::Bool(v) => input.add_bool(v),
            PreparedValue::U8(v) => input.add_u8(v),
            PreparedValue::U16(v) => input.add_u16(v),
            PreparedValue::U32(v) => input.add_u32(v),
            PreparedValue::U64(v) => input.add_u64(v),
            PreparedValue::U128(v) => input.add_u128(v),
            PreparedValue::U256(v) => input.add_u256(v),
            PreparedValue::Address(v) => input.add_address(v),
        }
    }
}

/// Check the declared type against the value before any instance
/// interaction; mismatches and out-of-range values fail fast
fn prepare_value(params: &EncryptParams) -> fhevm_core::Result<PreparedValue> {
    fn uint_value(params: &EncryptParams) -> fhevm_core::Result<U256> {
        match &params.value {
            ClearValue::Uint(value) => Ok(*value),
            _ => Err(FhevmError::InvalidType(format!(
                "expected a numeric value for {}",
                params.value_type
            ))),
        }
    }

    fn narrow<T: TryFrom<U256>>(params: &EncryptParams) -> fhevm_core::Result<T> {
        T::try_from(uint_value(params)?).map_err(|_| {
            FhevmError::InvalidType(format!("value out of range for {}", params.value_type))
        })
    }

    match params.value_type {
        EncryptedType::Ebool => match params.value {
            ClearValue::Bool(value) => Ok(PreparedValue::Bool(value)),
            _ => Err(FhevmError::InvalidType(
                "expected a boolean value for ebool".into(),
            )),
        },
        EncryptedType::Euint8 => narrow(params).map(PreparedValue::U8),
        EncryptedType::Euint16 => narrow(params).map(PreparedValue::U16),
        EncryptedType::Euint32 => narrow(params).map(PreparedValue::U32),
        EncryptedType::Euint64 => narrow(params).map(PreparedValue::U64),
        EncryptedType::Euint128 => narrow(params).map(PreparedValue::U128),
        EncryptedType::Euint256 => uint_value(params).map(PreparedValue::U256),
        EncryptedType::Eaddress => match params.value {
            ClearValue::Address(value) => Ok(PreparedValue::Address(value)),
            _ => Err(FhevmError::InvalidType(
                "expected an address value for eaddress".into(),
            )),
        },
    }
}
