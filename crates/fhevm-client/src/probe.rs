//! Chain-id resolution and local dev-node detection over JSON-RPC

use std::sync::Arc;

use alloy_primitives::{Address, U64};
use alloy_rpc_client::ClientBuilder;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use fhevm_core::FhevmError;

/// An injected wallet-style provider (EIP-1193): a raw request pipe into
/// whatever wallet the host application connected
#[async_trait]
pub trait Eip1193Provider: Send + Sync {
    async fn request(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> fhevm_core::Result<serde_json::Value>;
}

/// The network target handed to `init()`: a bare RPC endpoint or an
/// injected provider
#[derive(Clone)]
pub enum Web3Provider {
    RpcUrl(String),
    Eip1193(Arc<dyn Eip1193Provider>),
}

impl Web3Provider {
    pub fn rpc_url(&self) -> Option<&str> {
        match self {
            Web3Provider::RpcUrl(url) => Some(url),
            Web3Provider::Eip1193(_) => None,
        }
    }
}

impl std::fmt::Debug for Web3Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Web3Provider::RpcUrl(url) => f.debug_tuple("RpcUrl").field(url).finish(),
            Web3Provider::Eip1193(_) => f.write_str("Eip1193(..)"),
        }
    }
}

/// Resolve the chain id from the provider. URL targets get a short-lived
/// RPC connection that is dropped regardless of outcome; injected providers
/// answer `eth_chainId` themselves.
pub async fn resolve_chain_id(provider: &Web3Provider) -> fhevm_core::Result<u64> {
    match provider {
        Web3Provider::RpcUrl(url) => {
            let client = ClientBuilder::default()
                .connect(url)
                .await
                .map_err(|err| FhevmError::Rpc(err.to_string()))?;
            let chain_id: U64 = client
                .request_noparams("eth_chainId")
                .await
                .map_err(|err| FhevmError::Rpc(err.to_string()))?;
            Ok(chain_id.to::<u64>())
        }
        Web3Provider::Eip1193(provider) => {
            let raw = provider
                .request("eth_chainId", serde_json::Value::Array(vec![]))
                .await?;
            let hex_id = raw
                .as_str()
                .ok_or_else(|| FhevmError::Rpc("eth_chainId returned a non-string".into()))?;
            u64::from_str_radix(hex_id.trim_start_matches("0x"), 16)
                .map_err(|err| FhevmError::Rpc(format!("invalid eth_chainId {hex_id}: {err}")))
        }
    }
}

/// Ask the endpoint what client it runs. Connection or protocol failure
/// means "not a reachable Web3 node"; that is recoverable, the caller falls
/// through to the production path.
pub async fn web3_client_version(rpc_url: &str) -> fhevm_core::Result<String> {
    let client = ClientBuilder::default()
        .connect(rpc_url)
        .await
        .map_err(|err| FhevmError::Web3Probe {
            url: rpc_url.to_string(),
            reason: err.to_string(),
        })?;
    client
        .request_noparams("web3_clientVersion")
        .await
        .map_err(|err| FhevmError::Web3Probe {
            url: rpc_url.to_string(),
            reason: err.to_string(),
        })
}

/// Verification-authority addresses reported by an FHEVM-enabled dev node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevNodeMetadata {
    #[serde(rename = "ACLAddress")]
    pub acl_address: String,
    #[serde(rename = "InputVerifierAddress")]
    pub input_verifier_address: String,
    #[serde(rename = "KMSVerifierAddress")]
    pub kms_verifier_address: String,
}

impl DevNodeMetadata {
    /// All three addresses must be hex-prefixed and well-formed
    fn is_well_formed(&self) -> bool {
        [
            &self.acl_address,
            &self.input_verifier_address,
            &self.kms_verifier_address,
        ]
        .iter()
        .all(|addr| addr.starts_with("0x") && addr.parse::<Address>().is_ok())
    }
}

/// Marker a local FHEVM development node advertises in its client version
const DEV_NODE_MARKER: &str = "hardhat";

/// Probe a registered mock-chain endpoint for FHEVM dev-node metadata.
///
/// Every failure returns `None` so the caller falls through to the
/// production path; the distinguishing reason is logged at debug since a
/// reachable-but-mis-versioned node is otherwise invisible.
pub async fn fetch_dev_node_metadata(rpc_url: &str) -> Option<DevNodeMetadata> {
    let version = match web3_client_version(rpc_url).await {
        Ok(version) => version,
        Err(err) => {
            debug!(url = rpc_url, error = %err, "Dev-node probe: endpoint unreachable");
            return None;
        }
    };

    if !version.to_lowercase().contains(DEV_NODE_MARKER) {
        debug!(url = rpc_url, version, "Dev-node probe: client version has no dev marker");
        return None;
    }

    let client = match ClientBuilder::default().connect(rpc_url).await {
        Ok(client) => client,
        Err(err) => {
            debug!(url = rpc_url, error = %err, "Dev-node probe: reconnect failed");
            return None;
        }
    };

    let metadata: DevNodeMetadata = match client.request_noparams("fhevm_relayer_metadata").await {
        Ok(metadata) => metadata,
        Err(err) => {
            debug!(url = rpc_url, error = %err, "Dev-node probe: no relayer metadata");
            return None;
        }
    };

    if !metadata.is_well_formed() {
        debug!(url = rpc_url, ?metadata, "Dev-node probe: malformed authority addresses");
        return None;
    }

    Some(metadata)
}
