//! Signing capability for the dispenser account.

use std::fmt;

use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Address, B256};
use alloy::signers::SignerSync;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use thiserror::Error;

pub const PRIVATE_KEY_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("invalid signing key: {0}")]
    InvalidKey(String),
    #[error("signing failed: {0}")]
    Signing(String),
}

/// A transaction signed and encoded for `eth_sendRawTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransfer {
    pub hash: B256,
    pub raw: Vec<u8>,
}

/// Something that controls the dispenser account and can sign for it.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    fn address(&self) -> Address;

    async fn sign_transaction(&self, tx: TxLegacy) -> Result<SignedTransfer, CredentialError>;
}

/// Private key held in process memory.
pub struct LocalKeyCredential {
    signer: PrivateKeySigner,
}

impl LocalKeyCredential {
    pub fn from_hex(key: &str) -> Result<Self, CredentialError> {
        let trimmed = key.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(digits)
            .map_err(|_| CredentialError::InvalidKey("key is not valid hex".to_string()))?;
        if bytes.len() != PRIVATE_KEY_BYTES {
            return Err(CredentialError::InvalidKey(format!(
                "key must be {PRIVATE_KEY_BYTES} bytes, got {}",
                bytes.len()
            )));
        }
        let signer = PrivateKeySigner::from_slice(&bytes)
            .map_err(|err| CredentialError::InvalidKey(err.to_string()))?;
        Ok(Self { signer })
    }
}

impl fmt::Debug for LocalKeyCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalKeyCredential")
            .field("address", &self.signer.address())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CredentialProvider for LocalKeyCredential {
    fn address(&self) -> Address {
        self.signer.address()
    }

    async fn sign_transaction(&self, tx: TxLegacy) -> Result<SignedTransfer, CredentialError> {
        assert!(tx.chain_id.is_some(), "Transfers must be replay protected");
        let signature = self
            .signer
            .sign_hash_sync(&tx.signature_hash())
            .map_err(|err| CredentialError::Signing(err.to_string()))?;
        let signed = tx.into_signed(signature);
        let hash = *signed.hash();
        let envelope = TxEnvelope::from(signed);
        Ok(SignedTransfer {
            hash,
            raw: envelope.encoded_2718(),
        })
    }
}
