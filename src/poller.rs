//! Transaction confirmation polling.
//!
//! [`ChainStatus`] answers a single status query straight from the chain and
//! keeps nothing between calls. [`StatusPoller`] drives repeated queries from
//! the caller's side with a fixed attempt ceiling and interval.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::B256;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::address::encode_tx_hash;
use crate::chain::ChainClient;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 20;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Observed state of a submitted transaction, re-derived on every query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    Pending,
    Confirmed { block_number: u64 },
    /// The query itself failed; the transaction may still be pending.
    Unknown { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Confirmed { block_number: u64, attempts: u32 },
    /// Attempt budget spent without a receipt. Not a failure: the
    /// transaction can still be mined later.
    GaveUp {
        attempts: u32,
        last_status: TransactionStatus,
    },
}

#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Errors that end polling. Transient failures should be reported as
    /// [`TransactionStatus::Unknown`] instead.
    type Error: Send;

    async fn status(&self, hash: B256) -> Result<TransactionStatus, Self::Error>;
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Status straight from the chain's receipt lookup.
#[derive(Clone)]
pub struct ChainStatus {
    chain: Arc<dyn ChainClient>,
}

impl ChainStatus {
    pub fn new(chain: Arc<dyn ChainClient>) -> Self {
        Self { chain }
    }

    pub async fn observe(&self, hash: B256) -> TransactionStatus {
        match self.chain.transaction_receipt(hash).await {
            Ok(Some(receipt)) => match receipt.block_number {
                Some(block_number) => TransactionStatus::Confirmed { block_number },
                None => TransactionStatus::Pending,
            },
            Ok(None) => TransactionStatus::Pending,
            Err(err) => {
                debug!("Receipt lookup for {} failed: {err}", encode_tx_hash(&hash));
                TransactionStatus::Unknown {
                    reason: err.to_string(),
                }
            }
        }
    }
}

#[async_trait]
impl StatusSource for ChainStatus {
    type Error = Infallible;

    async fn status(&self, hash: B256) -> Result<TransactionStatus, Infallible> {
        Ok(self.observe(hash).await)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    max_attempts: u32,
    interval: Duration,
}

impl PollSettings {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        assert!(max_attempts > 0, "Poll attempts must be positive");
        assert!(max_attempts <= 1_000, "Poll attempts exceed bound");
        Self {
            max_attempts,
            interval,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL)
    }
}

pub struct StatusPoller<S, Z = TokioSleeper> {
    source: S,
    sleeper: Z,
    settings: PollSettings,
}

impl<S: StatusSource> StatusPoller<S> {
    pub fn new(source: S, settings: PollSettings) -> Self {
        Self::with_sleeper(source, TokioSleeper, settings)
    }
}

impl<S: StatusSource, Z: Sleeper> StatusPoller<S, Z> {
    pub fn with_sleeper(source: S, sleeper: Z, settings: PollSettings) -> Self {
        Self {
            source,
            sleeper,
            settings,
        }
    }

    /// Queries until the transaction confirms or `max_attempts` queries have
    /// been made, sleeping `interval` between queries.
    pub async fn wait_for_confirmation(&self, hash: B256) -> Result<PollOutcome, S::Error> {
        let max_attempts = self.settings.max_attempts;
        let mut attempts = 0;
        loop {
            let status = self.source.status(hash).await?;
            attempts += 1;

            if let TransactionStatus::Confirmed { block_number } = status {
                info!(
                    "Transaction {} confirmed in block {block_number} after {attempts} checks",
                    encode_tx_hash(&hash)
                );
                return Ok(PollOutcome::Confirmed {
                    block_number,
                    attempts,
                });
            }

            if attempts >= max_attempts {
                info!(
                    "Transaction {} still unconfirmed after {attempts} checks",
                    encode_tx_hash(&hash)
                );
                return Ok(PollOutcome::GaveUp {
                    attempts,
                    last_status: status,
                });
            }

            debug!("Check {attempts}/{max_attempts}: {status:?}");
            self.sleeper.sleep(self.settings.interval).await;
        }
    }
}
