use std::sync::Arc;
use std::time::Duration;

use alloy::consensus::TxLegacy;
use alloy::primitives::{Address, B256, Bytes, TxKind, U64, U128, U256};
use anyhow::{Context, Result};
use async_trait::async_trait;
use jsonrpsee::core::client::{ClientT, Error as ClientError};
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::address::encode_tx_hash;
use crate::chain::{ChainClient, ChainError, TRANSFER_GAS_LIMIT, TransactionReceipt};
use crate::credential::CredentialProvider;

/// Heights at or above this are treated as a broken node response.
const MAX_PLAUSIBLE_BLOCK: u64 = 1_000_000_000_000;

/// Ethereum JSON-RPC client for the dispenser's node.
#[derive(Clone)]
pub struct RpcClient {
    inner: HttpClient,
    chain_id: Arc<OnceCell<u64>>,
}

impl RpcClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        assert!(!endpoint.is_empty(), "RPC endpoint must be provided");
        assert!(
            timeout >= Duration::from_millis(100),
            "Timeout below 100ms is unsafe"
        );

        let client = HttpClientBuilder::default()
            .request_timeout(timeout)
            .build(endpoint)
            .with_context(|| format!("Failed to build RPC client for {endpoint}"))?;

        Ok(Self {
            inner: client,
            chain_id: Default::default(),
        })
    }

    async fn call<R: DeserializeOwned>(
        &self,
        method: &'static str,
        params: ArrayParams,
    ) -> Result<R, ChainError> {
        self.inner
            .request(method, params)
            .await
            .map_err(|err| map_client_error(method, err))
    }

    pub async fn chain_id(&self) -> Result<u64, ChainError> {
        let chain_id = self
            .chain_id
            .get_or_try_init(|| async {
                let id: U64 = self.call("eth_chainId", rpc_params![]).await?;
                Ok::<_, ChainError>(id.to::<u64>())
            })
            .await?;
        Ok(*chain_id)
    }

    async fn gas_price(&self) -> Result<u128, ChainError> {
        let price: U128 = self.call("eth_gasPrice", rpc_params![]).await?;
        Ok(price.to::<u128>())
    }

    async fn pending_nonce(&self, account: Address) -> Result<u64, ChainError> {
        let nonce: U64 = self
            .call(
                "eth_getTransactionCount",
                rpc_params![account.to_string(), "pending"],
            )
            .await?;
        Ok(nonce.to::<u64>())
    }
}

#[async_trait]
impl ChainClient for RpcClient {
    async fn block_number(&self) -> Result<u64, ChainError> {
        let height: U64 = self.call("eth_blockNumber", rpc_params![]).await?;
        let block_number = height.to::<u64>();
        if block_number >= MAX_PLAUSIBLE_BLOCK {
            return Err(ChainError::Malformed(format!(
                "eth_blockNumber: implausible height {block_number}"
            )));
        }
        Ok(block_number)
    }

    async fn balance(&self, account: Address) -> Result<U256, ChainError> {
        self.call("eth_getBalance", rpc_params![account.to_string(), "latest"])
            .await
    }

    async fn submit_transfer(
        &self,
        signer: &dyn CredentialProvider,
        to: Address,
        value: U256,
    ) -> Result<B256, ChainError> {
        assert!(!value.is_zero(), "Transfer value must be positive");
        let chain_id = self.chain_id().await?;
        let gas_price = self.gas_price().await?;
        let nonce = self.pending_nonce(signer.address()).await?;

        let tx = TxLegacy {
            chain_id: Some(chain_id),
            nonce,
            gas_price,
            gas_limit: TRANSFER_GAS_LIMIT,
            to: TxKind::Call(to),
            value,
            input: Bytes::new(),
        };
        let signed = signer.sign_transaction(tx).await?;
        debug!(
            "Broadcasting transfer nonce={nonce} gas_price={gas_price} chain_id={chain_id}"
        );

        let raw_hex = format!("0x{}", hex::encode(&signed.raw));
        let hash: B256 = self
            .call("eth_sendRawTransaction", rpc_params![raw_hex])
            .await?;
        if hash != signed.hash {
            warn!(
                "Node returned hash {} for locally computed {}",
                encode_tx_hash(&hash),
                encode_tx_hash(&signed.hash)
            );
        }
        Ok(hash)
    }

    async fn transaction_receipt(
        &self,
        hash: B256,
    ) -> Result<Option<TransactionReceipt>, ChainError> {
        let response: Option<ReceiptResponse> = self
            .call(
                "eth_getTransactionReceipt",
                rpc_params![encode_tx_hash(&hash)],
            )
            .await?;
        Ok(response.map(|receipt| receipt.into_receipt(hash)))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptResponse {
    transaction_hash: Option<B256>,
    block_number: Option<U64>,
    status: Option<U64>,
}

impl ReceiptResponse {
    fn into_receipt(self, requested: B256) -> TransactionReceipt {
        TransactionReceipt {
            transaction_hash: self.transaction_hash.unwrap_or(requested),
            block_number: self.block_number.map(|height| height.to::<u64>()),
            succeeded: self.status.map(|status| status == U64::from(1)),
        }
    }
}

fn map_client_error(method: &str, err: ClientError) -> ChainError {
    match err {
        ClientError::Call(object) => ChainError::Rpc {
            code: object.code(),
            message: object.message().to_string(),
        },
        ClientError::RequestTimeout => ChainError::Timeout,
        ClientError::ParseError(err) => ChainError::Malformed(format!("{method}: {err}")),
        other => ChainError::Transport(format!("RPC call {method} failed: {other}")),
    }
}
