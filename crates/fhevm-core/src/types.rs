//! Shared data model for the FHEVM client SDK

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

use crate::error::FhevmError;

/// Client lifecycle status
///
/// Owned exclusively by the client core; observed through the status
/// listener registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FhevmStatus {
    Idle,
    Loading,
    Ready,
    Error,
}

impl fmt::Display for FhevmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FhevmStatus::Idle => "idle",
            FhevmStatus::Loading => "loading",
            FhevmStatus::Ready => "ready",
            FhevmStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// The closed set of encrypted input types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncryptedType {
    Ebool,
    Euint8,
    Euint16,
    Euint32,
    Euint64,
    Euint128,
    Euint256,
    Eaddress,
}

impl EncryptedType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncryptedType::Ebool => "ebool",
            EncryptedType::Euint8 => "euint8",
            EncryptedType::Euint16 => "euint16",
            EncryptedType::Euint32 => "euint32",
            EncryptedType::Euint64 => "euint64",
            EncryptedType::Euint128 => "euint128",
            EncryptedType::Euint256 => "euint256",
            EncryptedType::Eaddress => "eaddress",
        }
    }
}

impl fmt::Display for EncryptedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncryptedType {
    type Err = FhevmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ebool" => Ok(EncryptedType::Ebool),
            "euint8" => Ok(EncryptedType::Euint8),
            "euint16" => Ok(EncryptedType::Euint16),
            "euint32" => Ok(EncryptedType::Euint32),
            "euint64" => Ok(EncryptedType::Euint64),
            "euint128" => Ok(EncryptedType::Euint128),
            "euint256" => Ok(EncryptedType::Euint256),
            "eaddress" => Ok(EncryptedType::Eaddress),
            other => Err(FhevmError::InvalidType(other.to_string())),
        }
    }
}

/// A plaintext value, on either side of the encryption boundary
///
/// Decrypt batches are heterogeneous: a single batch may resolve to
/// booleans, integers and addresses at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ClearValue {
    Bool(bool),
    Uint(U256),
    Address(Address),
}

/// Parameters for a single-value encrypt operation
#[derive(Debug, Clone)]
pub struct EncryptParams {
    pub value: ClearValue,
    pub value_type: EncryptedType,
    pub contract_address: Address,
    pub user_address: Address,
}

/// Result of an encrypt operation: one opaque ciphertext handle per value
/// plus the input proof covering the whole builder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptResult {
    pub handles: Vec<Bytes>,
    pub input_proof: Bytes,
}

/// One (handle, contract) pair of a decrypt batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecryptRequest {
    pub handle: String,
    pub contract_address: Address,
}

/// Mapping from handle identifier to plaintext value
pub type DecryptResult = HashMap<String, ClearValue>;

/// Ephemeral keypair used to bind a decryption authorization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keypair {
    pub public_key: String,
    pub private_key: String,
}

/// EIP-712 domain separator fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip712Domain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

/// One field of an EIP-712 struct type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Eip712Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
}

/// An EIP-712 typed-data structure as produced by the relayer runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip712TypedData {
    pub domain: Eip712Domain,
    pub primary_type: String,
    pub types: BTreeMap<String, Vec<Eip712Field>>,
    pub message: serde_json::Value,
}

impl Eip712TypedData {
    /// Structural hash of the typed data, used to key the decryption
    /// signature cache. `types` is a BTreeMap so the encoding is canonical.
    pub fn digest(&self) -> Result<B256, FhevmError> {
        let encoded = serde_json::to_vec(self)?;
        Ok(keccak256(&encoded))
    }
}

/// Network configuration as reported by the relayer runtime
///
/// Address fields are kept as raw strings so the loader can run the
/// explicit shape checks before anything parses them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    pub name: String,
    pub chain_id: u64,
    pub acl_contract_address: String,
    pub kms_verifier_contract_address: String,
    pub input_verifier_contract_address: String,
    #[serde(default)]
    pub relayer_url: Option<String>,
}

/// Configuration handed to the relayer runtime when building an instance
///
/// The runtime's base network configuration merged with the network target
/// and whatever key material the public-key cache already had. Absent key
/// fields let the runtime generate fresh material.
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    pub network: NetworkConfig,
    pub network_url: Option<String>,
    pub chain_id: u64,
    pub public_key: Option<crate::pubkey::StoredPublicKey>,
    pub public_params: Option<crate::pubkey::StoredPublicParams>,
}
