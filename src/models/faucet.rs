//! JSON bodies shared by the HTTP handlers and the faucet client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::poller::TransactionStatus;

pub const MESSAGE_MINED: &str = "Transaction successfully mined";
pub const MESSAGE_PENDING: &str = "Transaction is still pending";
pub const MESSAGE_UNKNOWN: &str = "Transaction status unknown, it may still be pending";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispenseRequestBody {
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Pending,
    Success,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispenseResponseBody {
    pub status: StatusKind,
    pub hash: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_eligible_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusRequestBody {
    pub hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponseBody {
    pub status: StatusKind,
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    pub message: String,
}

impl StatusResponseBody {
    pub fn from_status(hash: String, status: &TransactionStatus) -> Self {
        match status {
            TransactionStatus::Confirmed { block_number } => Self {
                status: StatusKind::Success,
                hash,
                block_number: Some(*block_number),
                message: MESSAGE_MINED.to_string(),
            },
            TransactionStatus::Pending => Self {
                status: StatusKind::Pending,
                hash,
                block_number: None,
                message: MESSAGE_PENDING.to_string(),
            },
            TransactionStatus::Unknown { .. } => Self {
                status: StatusKind::Pending,
                hash,
                block_number: None,
                message: MESSAGE_UNKNOWN.to_string(),
            },
        }
    }

    /// Inverse of [`Self::from_status`] as seen by a client. A success body
    /// without a block number is treated as still pending.
    ///
    /// The wire format has no separate field for an unknown status, so it is
    /// recognised by [`MESSAGE_UNKNOWN`]. Server and client must share that text.
    pub fn to_status(&self) -> TransactionStatus {
        match (&self.status, self.block_number) {
            (StatusKind::Success, Some(block_number)) => {
                TransactionStatus::Confirmed { block_number }
            }
            _ if self.message == MESSAGE_UNKNOWN => TransactionStatus::Unknown {
                reason: self.message.clone(),
            },
            _ => TransactionStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaucetStatusResponse {
    pub faucet_address: String,
    pub balance: String,
    pub balance_formatted: String,
    pub drip_amount: String,
    pub drip_amount_formatted: String,
    pub drips_available: String,
    pub block_number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_minutes: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthRequestBody {
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponseBody {
    pub authenticated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
