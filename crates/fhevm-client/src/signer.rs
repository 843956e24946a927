//! Local typed-data signer backed by an in-process private key
//!
//! Useful for tests and headless integrations; browser/wallet hosts provide
//! their own `TypedDataSigner` over the wallet's signing prompt.

use alloy_primitives::Address;
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;

use fhevm_core::{Eip712TypedData, FhevmError, TypedDataSigner};

pub struct LocalSigner {
    inner: PrivateKeySigner,
}

impl LocalSigner {
    pub fn new(inner: PrivateKeySigner) -> Self {
        Self { inner }
    }

    pub fn random() -> Self {
        Self {
            inner: PrivateKeySigner::random(),
        }
    }

    pub fn signer_address(&self) -> Address {
        self.inner.address()
    }
}

#[async_trait]
impl TypedDataSigner for LocalSigner {
    async fn address(&self) -> fhevm_core::Result<Address> {
        Ok(self.inner.address())
    }

    async fn sign_typed_data(&self, typed_data: &Eip712TypedData) -> fhevm_core::Result<String> {
        let digest = typed_data.digest()?;
        let signature = self
            .inner
            .sign_hash_sync(&digest)
            .map_err(|err| FhevmError::Rpc(format!("typed-data signing failed: {err}")))?;
        Ok(format!("0x{}", hex::encode(signature.as_bytes())))
    }
}
