//! Error taxonomy for the FHEVM client SDK

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FhevmError {
    #[error("FHEVM instance not initialized, call init() first")]
    NotInitialized,

    #[error("Invalid encrypted type: {0}")]
    InvalidType(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("No relayer runtime is available in this environment")]
    RuntimeUnavailable,

    #[error("Failed to load relayer runtime: {0}")]
    RuntimeLoadFailed(String),

    #[error("Relayer runtime initialization failed")]
    RuntimeInitFailed,

    #[error("web3_clientVersion probe failed for {url}: {reason}")]
    Web3Probe { url: String, reason: String },

    #[error("Failed to obtain decryption signature")]
    SignatureFailed,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Storage write failed: {0}")]
    StorageWrite(String),

    #[error("Malformed key material: {0}")]
    KeyMaterial(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Relayer error: {0}")]
    Relayer(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FhevmError {
    /// True for cooperative-cancellation aborts, which must never drive a
    /// status transition
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FhevmError::Cancelled)
    }

    /// True for the recoverable dev-node probe failure that falls through to
    /// the production path
    pub fn is_probe_failure(&self) -> bool {
        matches!(self, FhevmError::Web3Probe { .. })
    }
}
