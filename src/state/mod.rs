use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::chain::ChainClient;
use crate::config::SecretString;
use crate::dispenser::Dispenser;
use crate::poller::ChainStatus;

#[derive(Clone)]
pub struct AppState {
    pub dispenser: Arc<Dispenser>,
    pub chain: Option<Arc<dyn ChainClient>>,
    pub status: Option<ChainStatus>,
    pub access_password: Option<SecretString>,
    pub rpc_timeout: Duration,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        dispenser: Arc<Dispenser>,
        chain: Option<Arc<dyn ChainClient>>,
        access_password: Option<SecretString>,
        rpc_timeout: Duration,
    ) -> Self {
        assert!(
            access_password
                .as_ref()
                .is_none_or(|password| !password.expose().is_empty()),
            "Access password must be non-empty when set"
        );
        assert!(
            rpc_timeout >= Duration::from_millis(100),
            "RPC timeout must be configured"
        );
        let status = chain.clone().map(ChainStatus::new);
        Self {
            dispenser,
            chain,
            status,
            access_password,
            rpc_timeout,
            start_time: Instant::now(),
        }
    }
}
