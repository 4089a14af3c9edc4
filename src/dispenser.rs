//! Dispense handler.
//!
//! A request goes through, in order: recipient syntax check, chain
//! reachability, credential presence, the per-account critical section
//! (cooldown, balance, broadcast) and finally the acknowledgment. The whole
//! sequence is bounded by a timeout. Confirmation is not awaited here.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy::primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use moka::future::Cache;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::address::{AddressError, encode_tx_hash, parse_recipient};
use crate::amount::format_balance;
use crate::chain::{ChainClient, ChainError};
use crate::credential::CredentialProvider;

pub const DEFAULT_DISPENSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on recipients remembered for cooldown purposes.
const COOLDOWN_CAPACITY: u64 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingSetting {
    RpcEndpoint,
    SigningCredential,
}

impl fmt::Display for MissingSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RpcEndpoint => f.write_str("chain.rpc_url"),
            Self::SigningCredential => f.write_str("signer.private_key"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispenseError {
    #[error("Ethereum address is required")]
    MissingAddress,
    #[error("Invalid Ethereum address format")]
    InvalidAddress(AddressError),
    /// Never names the missing setting; that goes to the log only.
    #[error("Ethereum provider not properly configured")]
    Misconfigured(MissingSetting),
    #[error("Could not connect to Ethereum network. Please check your RPC URL.")]
    NetworkUnreachable(String),
    #[error("Request timed out after {}s; the transfer may or may not have been submitted", whole_seconds(.0))]
    Timeout(Duration),
    #[error("Insufficient funds in faucet wallet. Current balance: {}", balance_text(.balance))]
    InsufficientFunds { balance: U256 },
    #[error("Transaction failed: {0}")]
    Broadcast(String),
    #[error("Address already received funds recently. Try again in {} minutes", whole_minutes(.retry_after))]
    CoolingDown { retry_after: Duration },
}

impl DispenseError {
    /// Whether resubmitting the same request later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkUnreachable(_) | Self::Timeout(_) | Self::CoolingDown { .. }
        )
    }
}

/// Acknowledgment of a broadcast transfer. Confirmation comes later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub tx_hash: B256,
    pub recipient: Address,
    pub amount: U256,
    pub next_eligible_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaucetInfo {
    pub dispenser_address: Address,
    pub balance: U256,
    pub amount: U256,
    pub block_number: u64,
    pub cooldown: Option<Duration>,
}

impl FaucetInfo {
    pub fn drips_available(&self) -> U256 {
        assert!(!self.amount.is_zero(), "Dispense amount must be positive");
        self.balance / self.amount
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispenseSettings {
    pub amount: U256,
    pub timeout: Duration,
    pub cooldown: Option<Duration>,
}

struct Cooldown {
    window: Duration,
    recent: Cache<Address, Instant>,
}

impl Cooldown {
    fn new(window: Duration) -> Self {
        assert!(!window.is_zero(), "Cooldown window must be positive");
        let recent = Cache::builder()
            .max_capacity(COOLDOWN_CAPACITY)
            .time_to_live(window)
            .build();
        Self { window, recent }
    }

    async fn remaining(&self, recipient: &Address) -> Option<Duration> {
        let funded_at = self.recent.get(recipient).await?;
        let remaining = self.window.saturating_sub(funded_at.elapsed());
        (!remaining.is_zero()).then_some(remaining)
    }

    async fn record(&self, recipient: Address) -> Option<DateTime<Utc>> {
        self.recent.insert(recipient, Instant::now()).await;
        chrono::Duration::from_std(self.window)
            .ok()
            .map(|window| Utc::now() + window)
    }
}

pub struct Dispenser {
    chain: Option<Arc<dyn ChainClient>>,
    credential: Option<Arc<dyn CredentialProvider>>,
    amount: U256,
    timeout: Duration,
    cooldown: Option<Cooldown>,
    // One dispenser account, one in-flight balance-check-and-broadcast.
    account_lock: Mutex<()>,
}

impl Dispenser {
    pub fn new(
        chain: Option<Arc<dyn ChainClient>>,
        credential: Option<Arc<dyn CredentialProvider>>,
        settings: DispenseSettings,
    ) -> Self {
        assert!(!settings.amount.is_zero(), "Dispense amount must be positive");
        assert!(!settings.timeout.is_zero(), "Dispense timeout must be positive");
        Self {
            chain,
            credential,
            amount: settings.amount,
            timeout: settings.timeout,
            cooldown: settings.cooldown.map(Cooldown::new),
            account_lock: Mutex::new(()),
        }
    }

    pub fn amount(&self) -> U256 {
        self.amount
    }

    pub fn dispenser_address(&self) -> Option<Address> {
        self.credential.as_ref().map(|credential| credential.address())
    }

    /// Sends the configured amount to `raw_address` and returns as soon as the
    /// node accepted the transaction.
    pub async fn dispense(&self, raw_address: Option<&str>) -> Result<Submission, DispenseError> {
        let recipient = validate_recipient(raw_address)?;
        match tokio::time::timeout(self.timeout, self.dispense_to(recipient)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "Dispense to {} exceeded {:?}; outcome unknown",
                    recipient.to_checksum(None),
                    self.timeout
                );
                Err(DispenseError::Timeout(self.timeout))
            }
        }
    }

    async fn dispense_to(&self, recipient: Address) -> Result<Submission, DispenseError> {
        let chain = self.chain()?;
        let block_number = chain.block_number().await.map_err(|err| {
            warn!("Connectivity check failed: {err}");
            DispenseError::NetworkUnreachable(err.to_string())
        })?;
        let credential = self.credential()?;

        let _guard = self.account_lock.lock().await;

        if let Some(cooldown) = &self.cooldown {
            if let Some(retry_after) = cooldown.remaining(&recipient).await {
                return Err(DispenseError::CoolingDown { retry_after });
            }
        }

        let balance = chain
            .balance(credential.address())
            .await
            .map_err(|err| DispenseError::NetworkUnreachable(err.to_string()))?;
        if balance < self.amount {
            warn!(
                "Faucet balance {} below dispense amount {}",
                format_balance(balance),
                format_balance(self.amount)
            );
            return Err(DispenseError::InsufficientFunds { balance });
        }

        let tx_hash = chain
            .submit_transfer(credential.as_ref(), recipient, self.amount)
            .await
            .map_err(broadcast_error)?;
        assert!(!tx_hash.is_zero(), "Broadcast returned an empty hash");

        let next_eligible_at = match &self.cooldown {
            Some(cooldown) => cooldown.record(recipient).await,
            None => None,
        };

        info!(
            "Faucet drip: {} to {} (tx: {}, head: {block_number})",
            format_balance(self.amount),
            recipient.to_checksum(None),
            encode_tx_hash(&tx_hash)
        );

        Ok(Submission {
            tx_hash,
            recipient,
            amount: self.amount,
            next_eligible_at,
        })
    }

    /// Dispenser account, balance and chain head for the status endpoint.
    pub async fn info(&self) -> Result<FaucetInfo, DispenseError> {
        let chain = self.chain()?;
        let credential = self.credential()?;
        let block_number = chain
            .block_number()
            .await
            .map_err(|err| DispenseError::NetworkUnreachable(err.to_string()))?;
        let balance = chain
            .balance(credential.address())
            .await
            .map_err(|err| DispenseError::NetworkUnreachable(err.to_string()))?;
        Ok(FaucetInfo {
            dispenser_address: credential.address(),
            balance,
            amount: self.amount,
            block_number,
            cooldown: self.cooldown.as_ref().map(|cooldown| cooldown.window),
        })
    }

    fn chain(&self) -> Result<&Arc<dyn ChainClient>, DispenseError> {
        self.chain.as_ref().ok_or_else(|| {
            warn!("Dispense refused: {} is not configured", MissingSetting::RpcEndpoint);
            DispenseError::Misconfigured(MissingSetting::RpcEndpoint)
        })
    }

    fn credential(&self) -> Result<&Arc<dyn CredentialProvider>, DispenseError> {
        self.credential.as_ref().ok_or_else(|| {
            warn!(
                "Dispense refused: {} is not configured",
                MissingSetting::SigningCredential
            );
            DispenseError::Misconfigured(MissingSetting::SigningCredential)
        })
    }
}

fn balance_text(balance: &U256) -> String {
    format_balance(*balance)
}

fn whole_seconds(duration: &Duration) -> u64 {
    duration.as_secs()
}

fn whole_minutes(duration: &Duration) -> u64 {
    duration.as_secs().div_ceil(60)
}

fn validate_recipient(raw_address: Option<&str>) -> Result<Address, DispenseError> {
    match raw_address {
        None | Some("") => Err(DispenseError::MissingAddress),
        Some(raw) => parse_recipient(raw).map_err(DispenseError::InvalidAddress),
    }
}

fn broadcast_error(err: ChainError) -> DispenseError {
    error!("Broadcast failed: {err}");
    DispenseError::Broadcast(err.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::amount::parse_ether_amount;
    use crate::chain::testing::StubChain;
    use crate::credential::LocalKeyCredential;
    use crate::credential::testing::ANVIL_KEY;

    const DEAD: &str = "0x000000000000000000000000000000000000dEaD";

    fn ether(value: &str) -> U256 {
        parse_ether_amount(value).unwrap()
    }

    fn settings() -> DispenseSettings {
        DispenseSettings {
            amount: ether("0.05"),
            timeout: DEFAULT_DISPENSE_TIMEOUT,
            cooldown: None,
        }
    }

    fn dispenser(chain: &Arc<StubChain>, settings: DispenseSettings) -> Dispenser {
        let credential = LocalKeyCredential::from_hex(ANVIL_KEY).unwrap();
        Dispenser::new(
            Some(chain.clone() as Arc<dyn ChainClient>),
            Some(Arc::new(credential)),
            settings,
        )
    }

    #[tokio::test]
    async fn submits_configured_amount_without_waiting() {
        let chain = Arc::new(StubChain::with_balance(ether("1.0")));
        let dispenser = dispenser(&chain, settings());

        let submission = dispenser.dispense(Some(DEAD)).await.expect("submitted");

        assert!(!submission.tx_hash.is_zero());
        assert_eq!(submission.amount, ether("0.05"));
        assert_eq!(submission.next_eligible_at, None);
        assert_eq!(chain.transfers(), vec![(DEAD.parse::<Address>().unwrap(), ether("0.05"))]);
        assert_eq!(chain.receipt_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_address_makes_no_chain_calls() {
        let chain = Arc::new(StubChain::with_balance(ether("1.0")));
        let dispenser = dispenser(&chain, settings());

        for input in ["not-an-address", "0x1234", "0x0000000000000000000000000000000000dEaD"] {
            let err = dispenser.dispense(Some(input)).await.unwrap_err();
            assert!(matches!(err, DispenseError::InvalidAddress(_)), "{input}");
            assert_eq!(err.to_string(), "Invalid Ethereum address format");
        }
        assert_eq!(
            dispenser.dispense(None).await,
            Err(DispenseError::MissingAddress)
        );
        assert_eq!(
            dispenser.dispense(Some("")).await,
            Err(DispenseError::MissingAddress)
        );
        assert_eq!(chain.total_calls(), 0);
    }

    #[tokio::test]
    async fn insufficient_balance_never_broadcasts() {
        let chain = Arc::new(StubChain::with_balance(ether("0.01")));
        let dispenser = dispenser(&chain, settings());

        let err = dispenser.dispense(Some(DEAD)).await.unwrap_err();

        assert_eq!(
            err,
            DispenseError::InsufficientFunds {
                balance: ether("0.01")
            }
        );
        let message = err.to_string();
        assert!(message.contains("Insufficient funds"));
        assert!(message.contains("0.01"));
        assert_eq!(chain.balance_calls.load(Ordering::SeqCst), 1);
        assert_eq!(chain.submit_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unreachable_network_fails_before_wallet_access() {
        let chain = Arc::new(StubChain::with_balance(ether("1.0")));
        chain.set_unreachable();
        let dispenser = dispenser(&chain, settings());

        let err = dispenser.dispense(Some(DEAD)).await.unwrap_err();

        assert!(matches!(err, DispenseError::NetworkUnreachable(_)));
        assert!(err.is_retryable());
        assert_eq!(chain.balance_calls.load(Ordering::SeqCst), 0);
        assert_eq!(chain.submit_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_configuration_is_reported_without_detail() {
        let chain = Arc::new(StubChain::with_balance(ether("1.0")));
        let no_key = Dispenser::new(Some(chain.clone() as Arc<dyn ChainClient>), None, settings());
        let err = no_key.dispense(Some(DEAD)).await.unwrap_err();
        assert_eq!(
            err,
            DispenseError::Misconfigured(MissingSetting::SigningCredential)
        );
        assert!(!err.to_string().contains("private_key"));
        assert!(!err.is_retryable());

        let no_endpoint = Dispenser::new(None, None, settings());
        assert_eq!(
            no_endpoint.dispense(Some(DEAD)).await,
            Err(DispenseError::Misconfigured(MissingSetting::RpcEndpoint))
        );
    }

    #[tokio::test]
    async fn broadcast_error_keeps_node_message() {
        let chain = Arc::new(StubChain::with_balance(ether("1.0")));
        chain.fail_broadcasts_with(ChainError::Rpc {
            code: -32000,
            message: "nonce too low".to_string(),
        });
        let dispenser = dispenser(&chain, settings());

        let err = dispenser.dispense(Some(DEAD)).await.unwrap_err();

        assert_eq!(err, DispenseError::Broadcast("nonce too low".to_string()));
        assert_eq!(err.to_string(), "Transaction failed: nonce too low");
    }

    #[tokio::test]
    async fn slow_broadcast_times_out() {
        let chain = Arc::new(StubChain::with_balance(ether("1.0")));
        chain.delay_broadcasts(Duration::from_secs(5));
        let dispenser = dispenser(
            &chain,
            DispenseSettings {
                timeout: Duration::from_millis(50),
                ..settings()
            },
        );

        let err = dispenser.dispense(Some(DEAD)).await.unwrap_err();

        assert_eq!(err, DispenseError::Timeout(Duration::from_millis(50)));
        assert!(chain.transfers().is_empty());
    }

    #[tokio::test]
    async fn cooldown_blocks_repeat_recipient() {
        let chain = Arc::new(StubChain::with_balance(ether("1.0")));
        let dispenser = dispenser(
            &chain,
            DispenseSettings {
                cooldown: Some(Duration::from_secs(600)),
                ..settings()
            },
        );

        let first = dispenser.dispense(Some(DEAD)).await.expect("first drip");
        assert!(first.next_eligible_at.is_some());

        let err = dispenser.dispense(Some(DEAD)).await.unwrap_err();
        match err {
            DispenseError::CoolingDown { retry_after } => {
                assert!(retry_after <= Duration::from_secs(600));
                assert!(retry_after > Duration::from_secs(590));
            }
            other => panic!("unexpected {other:?}"),
        }

        let other = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";
        assert!(dispenser.dispense(Some(other)).await.is_ok());
        assert_eq!(chain.submit_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_requests_cannot_overdraw() {
        let chain = Arc::new(StubChain::with_balance(ether("0.05")));
        let dispenser = Arc::new(dispenser(&chain, settings()));

        let first = tokio::spawn({
            let dispenser = dispenser.clone();
            async move { dispenser.dispense(Some(DEAD)).await }
        });
        let second = tokio::spawn({
            let dispenser = dispenser.clone();
            async move {
                dispenser
                    .dispense(Some("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"))
                    .await
            }
        });
        let results = [first.await.unwrap(), second.await.unwrap()];

        assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
        assert!(results.iter().any(|result| matches!(
            result,
            Err(DispenseError::InsufficientFunds { .. })
        )));
        assert_eq!(chain.transfers().len(), 1);
    }

    #[tokio::test]
    async fn info_reports_balance_and_capacity() {
        let chain = Arc::new(StubChain::with_balance(ether("1.0")));
        let dispenser = dispenser(&chain, settings());

        let info = dispenser.info().await.expect("info");

        assert_eq!(info.balance, ether("1.0"));
        assert_eq!(info.drips_available(), U256::from(20u64));
        assert_eq!(info.block_number, 7_000_000);
        assert_eq!(Some(info.dispenser_address), dispenser.dispenser_address());
    }
}
