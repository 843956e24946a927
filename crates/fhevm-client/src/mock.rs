//! Simulated FHEVM instance for local mock/dev chains
//!
//! A registered mock chain running an FHEVM-enabled dev node exposes
//! synthetic verification-authority addresses over RPC; this instance is
//! built directly from that metadata. Ciphertext handles are keccak-derived
//! and the plaintexts live in a local ledger, so encrypt/decrypt round-trips
//! work without any relayer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use alloy_primitives::{keccak256, Address, Bytes, U256};
use async_trait::async_trait;
use rand::RngCore;
use tracing::debug;

use fhevm_core::{
    ClearValue, DecryptRequest, DecryptResult, DecryptionSignature, EncryptResult, EncryptedInput,
    Eip712Domain, Eip712Field, Eip712TypedData, FhevmError, FhevmInstance, Keypair,
    StoredPublicKey, StoredPublicParams,
};

use crate::probe::DevNodeMetadata;

type Ledger = Arc<Mutex<HashMap<String, ClearValue>>>;

fn lock_ledger(ledger: &Ledger) -> std::sync::MutexGuard<'_, HashMap<String, ClearValue>> {
    ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug)]
pub struct MockInstance {
    rpc_url: String,
    chain_id: u64,
    acl_address: Address,
    kms_verifier_address: Address,
    input_verifier_address: Address,
    public_key: StoredPublicKey,
    ledger: Ledger,
    counter: AtomicU64,
}

impl MockInstance {
    /// Build a simulated instance from dev-node metadata. Address parse
    /// failures surface as `InvalidAddress`.
    pub fn connect(
        rpc_url: &str,
        chain_id: u64,
        metadata: &DevNodeMetadata,
    ) -> fhevm_core::Result<Arc<Self>> {
        let parse = |label: &str, value: &str| -> fhevm_core::Result<Address> {
            value
                .parse::<Address>()
                .map_err(|_| FhevmError::InvalidAddress(format!("{label}: {value}")))
        };

        let acl_address = parse("ACLAddress", &metadata.acl_address)?;
        let kms_verifier_address = parse("KMSVerifierAddress", &metadata.kms_verifier_address)?;
        let input_verifier_address =
            parse("InputVerifierAddress", &metadata.input_verifier_address)?;

        // synthetic but stable per endpoint, so repeated connects agree
        let key_material = keccak256(format!("{rpc_url}:{chain_id}").as_bytes());
        let public_key = StoredPublicKey {
            public_key_id: format!("mock-{chain_id}"),
            public_key: key_material.to_string(),
        };

        debug!(rpc_url, chain_id, acl = %acl_address, "Connected mock FHEVM instance");

        Ok(Arc::new(Self {
            rpc_url: rpc_url.to_string(),
            chain_id,
            acl_address,
            kms_verifier_address,
            input_verifier_address,
            public_key,
            ledger: Arc::new(Mutex::new(HashMap::new())),
            counter: AtomicU64::new(0),
        }))
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn acl_address(&self) -> Address {
        self.acl_address
    }

    pub fn kms_verifier_address(&self) -> Address {
        self.kms_verifier_address
    }

    pub fn input_verifier_address(&self) -> Address {
        self.input_verifier_address
    }
}

#[async_trait]
impl FhevmInstance for MockInstance {
    fn create_encrypted_input(
        &self,
        contract_address: Address,
        user_address: Address,
    ) -> fhevm_core::Result<Box<dyn EncryptedInput>> {
        Ok(Box::new(MockEncryptedInput {
            chain_id: self.chain_id,
            contract_address,
            user_address,
            pending: Vec::new(),
            ledger: self.ledger.clone(),
            sequence: self.counter.fetch_add(1, Ordering::SeqCst),
        }))
    }

    fn get_public_key(&self) -> Option<StoredPublicKey> {
        Some(self.public_key.clone())
    }

    fn get_public_params(&self, bits: u32) -> Option<StoredPublicParams> {
        Some(StoredPublicParams {
            public_params_id: format!("mock-params-{bits}"),
            public_params: keccak256(format!("{}:{bits}", self.rpc_url).as_bytes()).to_string(),
        })
    }

    fn create_eip712(
        &self,
        public_key: &str,
        contract_addresses: &[Address],
        start_timestamp: u64,
        duration_days: u64,
    ) -> Eip712TypedData {
        let mut types = std::collections::BTreeMap::new();
        types.insert(
            "UserDecryptRequestVerification".to_string(),
            vec![
                Eip712Field {
                    name: "publicKey".into(),
                    field_type: "bytes".into(),
                },
                Eip712Field {
                    name: "contractAddresses".into(),
                    field_type: "address[]".into(),
                },
                Eip712Field {
                    name: "startTimestamp".into(),
                    field_type: "uint256".into(),
                },
                Eip712Field {
                    name: "durationDays".into(),
                    field_type: "uint256".into(),
                },
            ],
        );

        Eip712TypedData {
            domain: Eip712Domain {
                name: "Decryption".into(),
                version: "1".into(),
                chain_id: self.chain_id,
                verifying_contract: self.acl_address,
            },
            primary_type: "UserDecryptRequestVerification".into(),
            types,
            message: serde_json::json!({
                "publicKey": public_key,
                "contractAddresses": contract_addresses,
                "startTimestamp": start_timestamp,
                "durationDays": duration_days,
            }),
        }
    }

    fn generate_keypair(&self) -> Keypair {
        let mut private = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut private);
        Keypair {
            public_key: keccak256(private).to_string(),
            private_key: format!("0x{}", hex::encode(private)),
        }
    }

    async fn user_decrypt(
        &self,
        requests: &[DecryptRequest],
        signature: &DecryptionSignature,
    ) -> fhevm_core::Result<DecryptResult> {
        if signature.signature.is_empty() {
            return Err(FhevmError::Relayer("empty decryption signature".into()));
        }
        if !signature.is_valid() {
            return Err(FhevmError::Relayer("decryption signature expired".into()));
        }

        let ledger = lock_ledger(&self.ledger);
        let mut result = DecryptResult::new();
        for request in requests {
            if !signature.contract_addresses.contains(&request.contract_address) {
                return Err(FhevmError::Relayer(format!(
                    "contract {} is not covered by the authorization",
                    request.contract_address
                )));
            }
            let value = ledger.get(&request.handle).ok_or_else(|| {
                FhevmError::Relayer(format!("unknown ciphertext handle {}", request.handle))
            })?;
            result.insert(request.handle.clone(), value.clone());
        }
        Ok(result)
    }
}

struct MockEncryptedInput {
    chain_id: u64,
    contract_address: Address,
    user_address: Address,
    pending: Vec<(u8, ClearValue)>,
    ledger: Ledger,
    sequence: u64,
}

impl MockEncryptedInput {
    fn handle_for(&self, index: usize, tag: u8, value: &ClearValue) -> fhevm_core::Result<Bytes> {
        let mut preimage = Vec::with_capacity(128);
        preimage.extend_from_slice(&self.chain_id.to_be_bytes());
        preimage.extend_from_slice(self.contract_address.as_slice());
        preimage.extend_from_slice(self.user_address.as_slice());
        preimage.extend_from_slice(&self.sequence.to_be_bytes());
        preimage.extend_from_slice(&(index as u64).to_be_bytes());
        preimage.push(tag);
        preimage.extend_from_slice(&serde_json::to_vec(value)?);
        Ok(Bytes::copy_from_slice(keccak256(&preimage).as_slice()))
    }
}

#[async_trait]
impl EncryptedInput for MockEncryptedInput {
    fn add_bool(&mut self, value: bool) {
        self.pending.push((0, ClearValue::Bool(value)));
    }

    fn add_u8(&mut self, value: u8) {
        self.pending.push((1, ClearValue::Uint(U256::from(value))));
    }

    fn add_u16(&mut self, value: u16) {
        self.pending.push((2, ClearValue::Uint(U256::from(value))));
    }

    fn add_u32(&mut self, value: u32) {
        self.pending.push((3, ClearValue::Uint(U256::from(value))));
    }

    fn add_u64(&mut self, value: u64) {
        self.pending.push((4, ClearValue::Uint(U256::from(value))));
    }

    fn add_u128(&mut self, value: u128) {
        self.pending.push((5, ClearValue::Uint(U256::from(value))));
    }

    fn add_u256(&mut self, value: U256) {
        self.pending.push((6, ClearValue::Uint(value)));
    }

    fn add_address(&mut self, value: Address) {
        self.pending.push((7, ClearValue::Address(value)));
    }

    async fn encrypt(self: Box<Self>) -> fhevm_core::Result<EncryptResult> {
        let mut handles = Vec::with_capacity(self.pending.len());
        let mut proof_preimage = Vec::new();

        {
            let mut ledger = lock_ledger(&self.ledger);
            for (index, (tag, value)) in self.pending.iter().enumerate() {
                let handle = self.handle_for(index, *tag, value)?;
                proof_preimage.extend_from_slice(&handle);
                ledger.insert(format!("{handle}"), value.clone());
                handles.push(handle);
            }
        }

        Ok(EncryptResult {
            handles,
            input_proof: Bytes::copy_from_slice(keccak256(&proof_preimage).as_slice()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fhevm_core::constants::SIGNATURE_DURATION_DAYS;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn metadata() -> DevNodeMetadata {
        DevNodeMetadata {
            acl_address: "0x1111111111111111111111111111111111111111".into(),
            input_verifier_address: "0x2222222222222222222222222222222222222222".into(),
            kms_verifier_address: "0x3333333333333333333333333333333333333333".into(),
        }
    }

    fn instance() -> Arc<MockInstance> {
        MockInstance::connect("http://localhost:8545", 31337, &metadata()).unwrap()
    }

    fn authorization(instance: &MockInstance, contracts: Vec<Address>) -> DecryptionSignature {
        let keypair = instance.generate_keypair();
        let start = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let eip712 = instance.create_eip712(&keypair.public_key, &contracts, start, 365);
        DecryptionSignature {
            public_key: keypair.public_key,
            private_key: keypair.private_key,
            signature: "0xmock-signature".into(),
            start_timestamp: start,
            duration_days: SIGNATURE_DURATION_DAYS,
            user_address: Address::from([0xaau8; 20]),
            contract_addresses: contracts,
            eip712,
        }
    }

    #[test]
    fn test_connect_rejects_malformed_addresses() {
        let mut bad = metadata();
        bad.acl_address = "0x1234".into();
        let err = MockInstance::connect("http://localhost:8545", 31337, &bad)
            .err()
            .unwrap();
        assert!(matches!(err, FhevmError::InvalidAddress(_)));
    }

    #[tokio::test]
    async fn test_encrypt_decrypt_round_trip() {
        let instance = instance();
        let contract = Address::from([0x44u8; 20]);
        let user = Address::from([0xaau8; 20]);

        let mut input = instance.create_encrypted_input(contract, user).unwrap();
        input.add_u64(123_456);
        let encrypted = input.encrypt().await.unwrap();
        assert_eq!(encrypted.handles.len(), 1);

        let handle = format!("{}", encrypted.handles[0]);
        let signature = authorization(&instance, vec![contract]);
        let result = instance
            .user_decrypt(
                &[DecryptRequest {
                    handle: handle.clone(),
                    contract_address: contract,
                }],
                &signature,
            )
            .await
            .unwrap();

        assert_eq!(result.get(&handle), Some(&ClearValue::Uint(U256::from(123_456u64))));
    }

    #[tokio::test]
    async fn test_decrypt_rejects_uncovered_contract() {
        let instance = instance();
        let contract = Address::from([0x44u8; 20]);
        let other = Address::from([0x55u8; 20]);
        let user = Address::from([0xaau8; 20]);

        let mut input = instance.create_encrypted_input(contract, user).unwrap();
        input.add_bool(true);
        let encrypted = input.encrypt().await.unwrap();

        let signature = authorization(&instance, vec![other]);
        let err = instance
            .user_decrypt(
                &[DecryptRequest {
                    handle: format!("{}", encrypted.handles[0]),
                    contract_address: contract,
                }],
                &signature,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FhevmError::Relayer(_)));
    }

    #[tokio::test]
    async fn test_handles_are_unique_across_builders() {
        let instance = instance();
        let contract = Address::from([0x44u8; 20]);
        let user = Address::from([0xaau8; 20]);

        let mut first = instance.create_encrypted_input(contract, user).unwrap();
        first.add_u32(7);
        let mut second = instance.create_encrypted_input(contract, user).unwrap();
        second.add_u32(7);

        let a = first.encrypt().await.unwrap();
        let b = second.encrypt().await.unwrap();
        assert_ne!(a.handles[0], b.handles[0]);
    }

    #[test]
    fn test_keypair_generation_is_fresh() {
        let instance = instance();
        let a = instance.generate_keypair();
        let b = instance.generate_keypair();
        assert_ne!(a.private_key, b.private_key);
    }
}
