use alloy::primitives::{Address, B256};
use thiserror::Error;

pub const ADDRESS_HEX_LEN: usize = 40;
pub const TX_HASH_HEX_LEN: usize = 64;

const _: [(); 64 - ADDRESS_HEX_LEN] = [(); 64 - ADDRESS_HEX_LEN];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,
    #[error("address must be 0x followed by {ADDRESS_HEX_LEN} hex digits")]
    Malformed,
    #[error("address checksum does not match")]
    Checksum,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxHashError {
    #[error("transaction hash is empty")]
    Empty,
    #[error("transaction hash must be 0x followed by {TX_HASH_HEX_LEN} hex digits")]
    Malformed,
}

/// Parses a recipient account address.
///
/// An all-lowercase address is accepted as is. Any uppercase hex digit makes
/// the input a checksummed address, and then the EIP-55 checksum has to match.
pub fn parse_recipient(value: &str) -> Result<Address, AddressError> {
    if value.is_empty() {
        return Err(AddressError::Empty);
    }
    let digits = value.strip_prefix("0x").ok_or(AddressError::Malformed)?;
    if !is_hex_of_len(digits, ADDRESS_HEX_LEN) {
        return Err(AddressError::Malformed);
    }

    if digits.bytes().any(|byte| byte.is_ascii_uppercase()) {
        return Address::parse_checksummed(value, None).map_err(|_| AddressError::Checksum);
    }
    value.parse::<Address>().map_err(|_| AddressError::Malformed)
}

pub fn parse_tx_hash(value: &str) -> Result<B256, TxHashError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(TxHashError::Empty);
    }
    let digits = strip_hex_prefix(trimmed);
    if !is_hex_of_len(digits, TX_HASH_HEX_LEN) {
        return Err(TxHashError::Malformed);
    }
    digits.parse::<B256>().map_err(|_| TxHashError::Malformed)
}

pub fn encode_tx_hash(hash: &B256) -> String {
    format!("{hash:#x}")
}

fn is_hex_of_len(digits: &str, expected_len: usize) -> bool {
    digits.len() == expected_len && digits.bytes().all(|byte| byte.is_ascii_hexdigit())
}

fn strip_hex_prefix(value: &str) -> &str {
    if value.starts_with("0x") || value.starts_with("0X") {
        &value[2..]
    } else {
        value
    }
}
