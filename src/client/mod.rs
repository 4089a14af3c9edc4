//! HTTP client for a running faucet server.

use std::time::Duration;

use alloy::primitives::B256;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::address::encode_tx_hash;
use crate::http::PASSWORD_HEADER;
use crate::models::faucet::{
    DispenseRequestBody, DispenseResponseBody, ErrorBody, StatusRequestBody, StatusResponseBody,
};
use crate::poller::{StatusSource, TransactionStatus};

pub const DEFAULT_DISPENSE_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_STATUS_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("request to faucet timed out")]
    Timeout,
    #[error("could not reach faucet: {0}")]
    Transport(String),
    #[error("faucet responded {status}: {message}")]
    Api { status: u16, message: String },
    #[error("unexpected faucet response: {0}")]
    Decode(String),
}

impl ClientError {
    /// Transport trouble and server-side failures may clear up on their own.
    /// Anything the server rejected as a bad request will not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Transport(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

#[derive(Clone)]
pub struct FaucetClient {
    http: reqwest::Client,
    base_url: Url,
    password: Option<String>,
}

impl FaucetClient {
    pub fn new(base_url: &str, password: Option<String>) -> Result<Self> {
        assert!(!base_url.is_empty(), "Faucet URL must be provided");
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("Invalid faucet URL {base_url}"))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url,
            password: password.filter(|password| !password.is_empty()),
        })
    }

    pub async fn request_funds(&self, address: &str) -> Result<DispenseResponseBody, ClientError> {
        let body = DispenseRequestBody {
            address: Some(address.to_string()),
        };
        self.post("api/faucet", &body, DEFAULT_DISPENSE_REQUEST_TIMEOUT).await
    }

    pub async fn transaction_status(&self, hash: B256) -> Result<StatusResponseBody, ClientError> {
        let body = StatusRequestBody {
            hash: Some(encode_tx_hash(&hash)),
        };
        self.post("api/transaction-status", &body, DEFAULT_STATUS_REQUEST_TIMEOUT)
            .await
    }

    async fn post<B, R>(&self, path: &str, body: &B, timeout: Duration) -> Result<R, ClientError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self
            .base_url
            .join(path)
            .map_err(|err| ClientError::Transport(err.to_string()))?;
        let mut request = self.http.post(url).timeout(timeout).json(body);
        if let Some(password) = &self.password {
            request = request.header(PASSWORD_HEADER.as_str(), password);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(api_error(status, response).await);
        }
        response
            .json::<R>()
            .await
            .map_err(|err| ClientError::Decode(err.to_string()))
    }
}

async fn api_error(status: StatusCode, response: reqwest::Response) -> ClientError {
    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
    };
    ClientError::Api {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl StatusSource for FaucetClient {
    type Error = ClientError;

    async fn status(&self, hash: B256) -> Result<TransactionStatus, ClientError> {
        match self.transaction_status(hash).await {
            Ok(body) => Ok(body.to_status()),
            Err(err) if err.is_transient() => {
                debug!("Status check failed, counting as unknown: {err}");
                Ok(TransactionStatus::Unknown {
                    reason: err.to_string(),
                })
            }
            Err(err) => Err(err),
        }
    }
}
