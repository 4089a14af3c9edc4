//! Ether amounts, kept in wei end to end.

use alloy::primitives::U256;
use alloy::primitives::utils::{UnitsError, parse_ether};
use thiserror::Error;

pub const WEI_PER_ETHER: u64 = 1_000_000_000_000_000_000;
pub const ETHER_DECIMALS: usize = 18;
pub const ETHER_SYMBOL: &str = "ETH";

#[derive(Debug, Error)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,
    #[error("amount must not be negative")]
    Negative,
    #[error("amount must be greater than zero")]
    Zero,
    #[error("amount is not a decimal ether quantity: {0}")]
    Invalid(#[from] UnitsError),
}

/// Parses a decimal ether string such as `"0.05"` into wei without going
/// through floating point.
pub fn parse_ether_amount(value: &str) -> Result<U256, AmountError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AmountError::Empty);
    }
    if trimmed.starts_with('-') {
        return Err(AmountError::Negative);
    }
    let wei = parse_ether(trimmed)?;
    if wei.is_zero() {
        return Err(AmountError::Zero);
    }
    Ok(wei)
}

/// Renders wei as decimal ether with trailing zeros trimmed.
pub fn format_ether(wei: U256) -> String {
    let divisor = U256::from(WEI_PER_ETHER);
    let whole = wei / divisor;
    let frac = (wei % divisor).to::<u64>();
    if frac == 0 {
        return whole.to_string();
    }
    let frac_str = format!("{frac:0width$}", width = ETHER_DECIMALS);
    format!("{whole}.{}", frac_str.trim_end_matches('0'))
}

pub fn format_balance(wei: U256) -> String {
    format!("{} {ETHER_SYMBOL}", format_ether(wei))
}
