//! Sepolia testnet faucet.
//!
//! The server validates a recipient, checks the dispenser balance and
//! broadcasts a fixed transfer; callers then poll for confirmation until the
//! transaction is mined or the attempt budget runs out.

pub mod address;
pub mod amount;
pub mod chain;
pub mod client;
pub mod config;
pub mod credential;
pub mod dispenser;
pub mod http;
pub mod models;
pub mod poller;
pub mod rpc;
pub mod state;

use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let default_filter = "info";
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    assert!(!filter.is_empty(), "Tracing filter must not be empty");
    assert!(filter.len() < 256, "Tracing filter length exceeds bounds");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .compact()
        .init();
}
