use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use sepolia_faucet::chain::ChainClient;
use sepolia_faucet::config::FaucetConfig;
use sepolia_faucet::credential::{CredentialProvider, LocalKeyCredential};
use sepolia_faucet::dispenser::Dispenser;
use sepolia_faucet::rpc::RpcClient;
use sepolia_faucet::state::AppState;
use sepolia_faucet::{http, init_tracing};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = FaucetConfig::load().context("Failed to load configuration")?;

    let chain = connect_chain(&config).await?;
    let credential = load_credential(&config)?;
    let dispense_settings = config.dispense.settings()?;

    let dispenser = Arc::new(Dispenser::new(
        chain.clone(),
        credential,
        dispense_settings,
    ));
    let app_state = AppState::new(
        dispenser,
        chain,
        config.access.password.clone(),
        config.chain.request_timeout(),
    );
    if app_state.access_password.is_some() {
        info!("Password gate enabled for /api routes");
    }

    let listener = TcpListener::bind(config.server.address())
        .await
        .context("Failed to bind HTTP listener")?;
    let local_addr = listener
        .local_addr()
        .context("Failed to obtain listener address")?;
    info!("Sepolia faucet listening on {local_addr}");

    let router: Router = http::router(app_state);
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server exited with error")?;

    Ok(())
}

async fn connect_chain(config: &FaucetConfig) -> Result<Option<Arc<dyn ChainClient>>> {
    let Some(rpc_url) = config.chain.rpc_url.as_deref() else {
        warn!("chain.rpc_url is not set; dispense and status requests will fail");
        return Ok(None);
    };

    let rpc_client = RpcClient::new(rpc_url, config.chain.request_timeout())
        .context("Failed to initialize RPC client")?;
    match rpc_client.block_number().await {
        Ok(block) => info!("Connected to chain at block {block}"),
        Err(err) => warn!("Chain not reachable at startup: {err}"),
    }
    Ok(Some(Arc::new(rpc_client)))
}

fn load_credential(config: &FaucetConfig) -> Result<Option<Arc<dyn CredentialProvider>>> {
    let Some(key) = config.signer.private_key.as_ref() else {
        warn!("signer.private_key is not set; dispense requests will fail");
        return Ok(None);
    };
    let credential =
        LocalKeyCredential::from_hex(key.expose()).context("Invalid signer.private_key")?;
    info!(
        "Dispensing from {}",
        credential.address().to_checksum(None)
    );
    Ok(Some(Arc::new(credential)))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
        return;
    }
    info!("Shutdown signal received");
}
