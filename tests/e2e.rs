//! End-to-end integration tests for the FHEVM client SDK
//!
//! Tests the full pipeline: init -> instance -> encrypt -> decrypt, with an
//! in-process relayer runtime standing in for the external one. No network
//! access is required: probes are skipped by registering no mock chain for
//! the test chain id and passing an explicit chain id to `init()`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use fhevm_sdk::{
    ClearValue, DecryptRequest, DecryptResult, DevNodeMetadata, EncryptParams, EncryptedType,
    Eip712TypedData, FhevmClient, FhevmConfig, FhevmError, FhevmInstance, FhevmStatus, InitParams,
    InstanceConfig, LocalSigner, MemoryStorage, MockInstance, NetworkConfig, NullSdkLoader,
    RelayerSdk, StaticSdkLoader, StorageAdapter, TypedDataSigner, Web3Provider,
};

/// A chain id with no mock-chain registration, so `init()` takes the
/// production path without probing anything
const TEST_CHAIN_ID: u64 = 11155111;

const ACL: &str = "0x1111111111111111111111111111111111111111";

/// In-process relayer runtime double. Hands out a simulated instance and
/// records the instance config it was asked to build from.
struct FakeSdk {
    initialized: AtomicBool,
    init_calls: AtomicUsize,
    instance: Arc<MockInstance>,
    seen_config: Mutex<Option<InstanceConfig>>,
}

impl FakeSdk {
    fn new() -> Arc<Self> {
        let metadata = DevNodeMetadata {
            acl_address: ACL.into(),
            input_verifier_address: "0x2222222222222222222222222222222222222222".into(),
            kms_verifier_address: "0x3333333333333333333333333333333333333333".into(),
        };
        let instance =
            MockInstance::connect("http://fake-relayer.invalid", TEST_CHAIN_ID, &metadata)
                .unwrap();
        Arc::new(Self {
            initialized: AtomicBool::new(false),
            init_calls: AtomicUsize::new(0),
            instance,
            seen_config: Mutex::new(None),
        })
    }

    fn seen_cached_key(&self) -> bool {
        self.seen_config
            .lock()
            .unwrap()
            .as_ref()
            .map(|config| config.public_key.is_some())
            .unwrap_or(false)
    }
}

#[async_trait]
impl RelayerSdk for FakeSdk {
    async fn init(&self) -> fhevm_sdk::Result<bool> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        self.initialized.store(true, Ordering::SeqCst);
        Ok(true)
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            name: "testnet".into(),
            chain_id: TEST_CHAIN_ID,
            acl_contract_address: ACL.into(),
            kms_verifier_contract_address: "0x2222222222222222222222222222222222222222".into(),
            input_verifier_contract_address: "0x3333333333333333333333333333333333333333".into(),
            relayer_url: Some("http://fake-relayer.invalid".into()),
        }
    }

    async fn create_instance(
        &self,
        config: InstanceConfig,
    ) -> fhevm_sdk::Result<Arc<dyn FhevmInstance>> {
        *self.seen_config.lock().unwrap() = Some(config);
        Ok(self.instance.clone())
    }
}

/// Counts signing-prompt invocations so signature-cache hits are observable
struct CountingSigner {
    inner: LocalSigner,
    signs: AtomicUsize,
}

impl CountingSigner {
    fn new() -> Self {
        Self {
            inner: LocalSigner::random(),
            signs: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TypedDataSigner for CountingSigner {
    async fn address(&self) -> fhevm_sdk::Result<Address> {
        self.inner.address().await
    }

    async fn sign_typed_data(&self, typed_data: &Eip712TypedData) -> fhevm_sdk::Result<String> {
        self.signs.fetch_add(1, Ordering::SeqCst);
        self.inner.sign_typed_data(typed_data).await
    }
}

fn init_params() -> InitParams {
    InitParams {
        provider: Web3Provider::RpcUrl("http://fake-relayer.invalid".into()),
        chain_id: Some(TEST_CHAIN_ID),
    }
}

fn production_client(sdk: Arc<FakeSdk>, storage: Arc<dyn StorageAdapter>) -> FhevmClient {
    FhevmClient::new(
        FhevmConfig::default().with_storage(storage),
        Arc::new(StaticSdkLoader::new(sdk)),
    )
}

async fn ready_client() -> (FhevmClient, Arc<FakeSdk>) {
    let sdk = FakeSdk::new();
    let client = production_client(sdk.clone(), Arc::new(MemoryStorage::new()));
    client
        .init(init_params(), CancellationToken::new())
        .await
        .unwrap();
    (client, sdk)
}

/// Test the full production-path init lifecycle and its observable
/// status transitions
#[tokio::test]
async fn test_init_production_path_e2e() {
    let sdk = FakeSdk::new();
    let client = production_client(sdk.clone(), Arc::new(MemoryStorage::new()));
    assert_eq!(client.status(), FhevmStatus::Idle);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    let subscription = client.on_status_change(move |status| {
        seen_clone.lock().unwrap().push(status);
    });

    client
        .init(init_params(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(client.status(), FhevmStatus::Ready);
    assert_eq!(sdk.init_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![FhevmStatus::Loading, FhevmStatus::Ready]
    );
    assert!(client.get_public_key().unwrap().starts_with("0x"));

    subscription.unsubscribe();
}

/// Test that the public-key cache written by one init seeds the next
#[tokio::test]
async fn test_public_key_cache_seeds_next_init_e2e() {
    let storage: Arc<dyn StorageAdapter> = Arc::new(MemoryStorage::new());

    let first_sdk = FakeSdk::new();
    let first = production_client(first_sdk.clone(), storage.clone());
    first
        .init(init_params(), CancellationToken::new())
        .await
        .unwrap();

    // the first run starts cold and writes through
    assert!(!first_sdk.seen_cached_key());
    let keys = storage.keys().await;
    assert!(keys.iter().any(|key| key.starts_with("fhevm:publicKey:")));
    assert!(keys.iter().any(|key| key.starts_with("fhevm:publicParams:")));

    // a fresh client over the same storage is seeded from the cache
    let second_sdk = FakeSdk::new();
    let second = production_client(second_sdk.clone(), storage);
    second
        .init(init_params(), CancellationToken::new())
        .await
        .unwrap();
    assert!(second_sdk.seen_cached_key());
}

/// Test encrypt -> decrypt round trip with the decryption signature cached
/// across calls
#[tokio::test]
async fn test_encrypt_decrypt_round_trip_e2e() {
    let (client, _sdk) = ready_client().await;
    let contract = Address::from([0x44u8; 20]);
    let signer = CountingSigner::new();
    let user = signer.address().await.unwrap();

    let encrypted = client
        .encrypt(EncryptParams {
            value: ClearValue::Uint(U256::from(42u64)),
            value_type: EncryptedType::Euint64,
            contract_address: contract,
            user_address: user,
        })
        .await
        .unwrap();
    assert_eq!(encrypted.handles.len(), 1);
    let handle = format!("{}", encrypted.handles[0]);

    let requests = [DecryptRequest {
        handle: handle.clone(),
        contract_address: contract,
    }];

    let result: DecryptResult = client.decrypt(&requests, &signer).await.unwrap();
    assert_eq!(result.get(&handle), Some(&ClearValue::Uint(U256::from(42u64))));
    assert_eq!(signer.signs.load(Ordering::SeqCst), 1);

    // same contract set hits the cached signature, no new prompt
    let again = client.decrypt(&requests, &signer).await.unwrap();
    assert_eq!(again.get(&handle), Some(&ClearValue::Uint(U256::from(42u64))));
    assert_eq!(signer.signs.load(Ordering::SeqCst), 1);
}

/// Test that a different contract set requires a fresh signature
#[tokio::test]
async fn test_new_contract_set_requires_new_signature_e2e() {
    let (client, _sdk) = ready_client().await;
    let signer = CountingSigner::new();
    let user = signer.address().await.unwrap();

    let mut handles = HashMap::new();
    for contract in [Address::from([0x44u8; 20]), Address::from([0x55u8; 20])] {
        let encrypted = client
            .encrypt(EncryptParams {
                value: ClearValue::Bool(true),
                value_type: EncryptedType::Ebool,
                contract_address: contract,
                user_address: user,
            })
            .await
            .unwrap();
        handles.insert(contract, format!("{}", encrypted.handles[0]));
    }

    for (index, (contract, handle)) in handles.iter().enumerate() {
        client
            .decrypt(
                &[DecryptRequest {
                    handle: handle.clone(),
                    contract_address: *contract,
                }],
                &signer,
            )
            .await
            .unwrap();
        assert_eq!(signer.signs.load(Ordering::SeqCst), index + 1);
    }
}

/// Test that calls before a successful init are rejected without touching
/// the signer
#[tokio::test]
async fn test_calls_before_init_are_rejected_e2e() {
    let client = FhevmClient::new(FhevmConfig::default(), Arc::new(NullSdkLoader::new()));
    let signer = CountingSigner::new();

    let err = client
        .decrypt(
            &[DecryptRequest {
                handle: "0xdead".into(),
                contract_address: Address::ZERO,
            }],
            &signer,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FhevmError::NotInitialized));
    assert_eq!(signer.signs.load(Ordering::SeqCst), 0);
}

/// Test that a failed init reports Error status and surfaces the cause
#[tokio::test]
async fn test_init_failure_sets_error_status_e2e() {
    let client = FhevmClient::new(FhevmConfig::default(), Arc::new(NullSdkLoader::new()));
    let err = client
        .init(init_params(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, FhevmError::RuntimeUnavailable));
    assert_eq!(client.status(), FhevmStatus::Error);
}

/// Test that cancellation resolves to Cancelled and never drives the
/// status to Error
#[tokio::test]
async fn test_cancelled_init_never_reports_error_e2e() {
    let client = FhevmClient::new(FhevmConfig::default(), Arc::new(NullSdkLoader::new()));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = client.init(init_params(), cancel).await.unwrap_err();
    assert!(err.is_cancelled());
    assert_ne!(client.status(), FhevmStatus::Error);
}

/// Test that a superseded init attempt is discarded and the newest
/// attempt's instance wins
#[tokio::test]
async fn test_superseded_init_is_discarded_e2e() {
    /// Loader whose first `load()` parks until released; later loads pass
    /// straight through
    struct GatedLoader {
        inner: StaticSdkLoader,
        gate: Arc<tokio::sync::Notify>,
        parked_first: AtomicBool,
    }

    #[async_trait]
    impl fhevm_sdk::SdkLoader for GatedLoader {
        fn is_loaded(&self) -> bool {
            true
        }

        async fn load(&self) -> fhevm_sdk::Result<Arc<dyn RelayerSdk>> {
            if !self.parked_first.swap(true, Ordering::SeqCst) {
                self.gate.notified().await;
            }
            self.inner.load().await
        }
    }

    let gate = Arc::new(tokio::sync::Notify::new());
    let sdk = FakeSdk::new();
    let client = Arc::new(FhevmClient::new(
        FhevmConfig::default(),
        Arc::new(GatedLoader {
            inner: StaticSdkLoader::new(sdk),
            gate: gate.clone(),
            parked_first: AtomicBool::new(false),
        }),
    ));

    let stale = {
        let client = client.clone();
        tokio::spawn(async move { client.init(init_params(), CancellationToken::new()).await })
    };
    // let the first attempt reach the gate before starting the second
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    client
        .init(init_params(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(client.status(), FhevmStatus::Ready);

    gate.notify_one();
    let stale_result = stale.await.unwrap();
    assert!(stale_result.err().unwrap().is_cancelled());

    // the late result did not disturb the committed one
    assert_eq!(client.status(), FhevmStatus::Ready);
    assert!(client.instance().is_ok());
}
