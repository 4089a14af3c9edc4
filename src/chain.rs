use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use thiserror::Error;

use crate::credential::{CredentialError, CredentialProvider};

/// Gas limit of a plain value transfer.
pub const TRANSFER_GAS_LIMIT: u64 = 21_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    /// `None` while the node reports the receipt without an including block.
    pub block_number: Option<u64>,
    pub succeeded: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("RPC transport error: {0}")]
    Transport(String),
    /// Error object returned by the node; the message is kept verbatim.
    #[error("{message}")]
    Rpc { code: i32, message: String },
    #[error("RPC request timed out")]
    Timeout,
    #[error("Malformed RPC response: {0}")]
    Malformed(String),
    #[error(transparent)]
    Credential(#[from] CredentialError),
}

/// Read and broadcast access to the target chain.
///
/// Nonce allocation and fee selection belong to the implementation; callers
/// only say who signs, where the funds go and how much.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn block_number(&self) -> Result<u64, ChainError>;

    async fn balance(&self, account: Address) -> Result<U256, ChainError>;

    async fn submit_transfer(
        &self,
        signer: &dyn CredentialProvider,
        to: Address,
        value: U256,
    ) -> Result<B256, ChainError>;

    async fn transaction_receipt(
        &self,
        hash: B256,
    ) -> Result<Option<TransactionReceipt>, ChainError>;
}
