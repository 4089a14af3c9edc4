//! Faucet HTTP handlers.
//!
//! - `POST /faucet` broadcasts one drip and answers before it is mined
//! - `POST /transaction-status` reports whether a drip has been mined
//! - `GET /faucet/status` shows the dispenser account and its balance
//! - `POST /auth` checks the access password for the browser form
//!
//! Status queries are answered straight from the chain; nothing is stored.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::info;

use crate::address::{TxHashError, encode_tx_hash, parse_tx_hash};
use crate::amount::{format_balance, format_ether};
use crate::dispenser::DispenseError;
use crate::models::faucet::{
    AuthRequestBody, AuthResponseBody, DispenseRequestBody, DispenseResponseBody,
    FaucetStatusResponse, StatusKind, StatusRequestBody, StatusResponseBody,
};
use crate::state::AppState;

use super::HttpError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/faucet", post(request_funds))
        .route("/faucet/status", get(get_status))
        .route("/transaction-status", post(transaction_status))
}

/// Routes reachable without the access password.
pub fn auth_router() -> Router<AppState> {
    Router::new().route("/auth", post(authenticate))
}

async fn request_funds(
    State(state): State<AppState>,
    body: Result<Json<DispenseRequestBody>, JsonRejection>,
) -> Result<Json<DispenseResponseBody>, HttpError> {
    let Json(request) = body.map_err(rejected_body)?;
    let submission = state.dispenser.dispense(request.address.as_deref()).await?;

    let hash = encode_tx_hash(&submission.tx_hash);
    assert!(hash.len() == 66, "Transaction hash must be 32 bytes");

    Ok(Json(DispenseResponseBody {
        status: StatusKind::Pending,
        message: format!(
            "Transaction submitted. Sending {} to {}",
            format_balance(submission.amount),
            submission.recipient.to_checksum(None)
        ),
        hash,
        next_eligible_at: submission.next_eligible_at,
    }))
}

async fn transaction_status(
    State(state): State<AppState>,
    body: Result<Json<StatusRequestBody>, JsonRejection>,
) -> Result<Json<StatusResponseBody>, HttpError> {
    let Json(request) = body.map_err(rejected_body)?;
    let hash = parse_tx_hash(request.hash.as_deref().unwrap_or_default()).map_err(|err| {
        let message = match err {
            TxHashError::Empty => "Transaction hash is required".to_string(),
            TxHashError::Malformed => err.to_string(),
        };
        HttpError::new(StatusCode::BAD_REQUEST, message)
    })?;

    let status_source = state.status.as_ref().ok_or_else(|| {
        HttpError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "RPC URL not configured".to_string(),
        )
    })?;

    let status = status_source.observe(hash).await;
    Ok(Json(StatusResponseBody::from_status(
        encode_tx_hash(&hash),
        &status,
    )))
}

async fn get_status(
    State(state): State<AppState>,
) -> Result<Json<FaucetStatusResponse>, HttpError> {
    let info = state.dispenser.info().await?;

    Ok(Json(FaucetStatusResponse {
        faucet_address: info.dispenser_address.to_checksum(None),
        balance: info.balance.to_string(),
        balance_formatted: format_balance(info.balance),
        drip_amount: info.amount.to_string(),
        drip_amount_formatted: format_balance(info.amount),
        drips_available: info.drips_available().to_string(),
        block_number: info.block_number,
        cooldown_minutes: info.cooldown.map(|window| window.as_secs() / 60),
    }))
}

async fn authenticate(
    State(state): State<AppState>,
    body: Result<Json<AuthRequestBody>, JsonRejection>,
) -> Result<Json<AuthResponseBody>, HttpError> {
    let Json(request) = body.map_err(rejected_body)?;
    let Some(expected) = &state.access_password else {
        return Ok(Json(AuthResponseBody {
            authenticated: true,
        }));
    };

    if request.password.as_deref() != Some(expected.expose()) {
        return Err(HttpError::new(
            StatusCode::UNAUTHORIZED,
            "Incorrect password".to_string(),
        ));
    }
    Ok(Json(AuthResponseBody {
        authenticated: true,
    }))
}

impl From<DispenseError> for HttpError {
    fn from(err: DispenseError) -> Self {
        let status = match &err {
            DispenseError::MissingAddress | DispenseError::InvalidAddress(_) => {
                StatusCode::BAD_REQUEST
            }
            DispenseError::CoolingDown { .. } => StatusCode::TOO_MANY_REQUESTS,
            DispenseError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            DispenseError::Misconfigured(_)
            | DispenseError::NetworkUnreachable(_)
            | DispenseError::InsufficientFunds { .. }
            | DispenseError::Broadcast(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if let DispenseError::InsufficientFunds { balance } = &err {
            info!("Drip refused, faucet holds {} ETH", format_ether(*balance));
        }
        HttpError::new(status, err.to_string())
    }
}

fn rejected_body(rejection: JsonRejection) -> HttpError {
    HttpError::new(
        StatusCode::BAD_REQUEST,
        format!("Failed to process request: {}", rejection.body_text()),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use alloy::primitives::U256;
    use serde_json::json;

    use super::*;
    use crate::amount::parse_ether_amount;
    use crate::chain::ChainClient;
    use crate::chain::testing::StubChain;
    use crate::credential::LocalKeyCredential;
    use crate::credential::testing::{ANVIL_ADDRESS, ANVIL_KEY};
    use crate::dispenser::{DEFAULT_DISPENSE_TIMEOUT, DispenseSettings, Dispenser};
    use crate::http::router as app_router;
    use crate::http::testing::{decode, get_json, post_json};

    const DEAD: &str = "0x000000000000000000000000000000000000dEaD";

    fn ether(value: &str) -> U256 {
        parse_ether_amount(value).unwrap()
    }

    fn app_with(chain: Option<Arc<StubChain>>, cooldown: Option<Duration>) -> Router {
        let chain = chain.map(|chain| chain as Arc<dyn ChainClient>);
        let credential = LocalKeyCredential::from_hex(ANVIL_KEY).unwrap();
        let dispenser = Dispenser::new(
            chain.clone(),
            Some(Arc::new(credential)),
            DispenseSettings {
                amount: ether("0.05"),
                timeout: DEFAULT_DISPENSE_TIMEOUT,
                cooldown,
            },
        );
        app_router(AppState::new(
            Arc::new(dispenser),
            chain,
            None,
            Duration::from_secs(10),
        ))
    }

    fn app(chain: &Arc<StubChain>) -> Router {
        app_with(Some(chain.clone()), None)
    }

    #[tokio::test]
    async fn valid_request_returns_pending_hash() {
        let chain = Arc::new(StubChain::with_balance(ether("1.0")));
        let router = app(&chain);

        let (status, body) =
            post_json(&router, "/api/faucet", json!({ "address": DEAD }), None).await;

        assert_eq!(status, StatusCode::OK);
        let body: DispenseResponseBody = decode(body);
        assert_eq!(body.status, StatusKind::Pending);
        assert!(parse_tx_hash(&body.hash).is_ok());
        assert_eq!(
            body.message,
            format!("Transaction submitted. Sending 0.05 ETH to {DEAD}")
        );
        assert_eq!(chain.transfers().len(), 1);
        assert_eq!(chain.receipt_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn bad_address_is_rejected_before_chain_access() {
        let chain = Arc::new(StubChain::with_balance(ether("1.0")));
        let router = app(&chain);

        let (status, body) = post_json(
            &router,
            "/api/faucet",
            json!({ "address": "not-an-address" }),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid Ethereum address format");

        let (status, body) = post_json(&router, "/api/faucet", json!({}), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Ethereum address is required");

        assert_eq!(chain.total_calls(), 0);
    }

    #[tokio::test]
    async fn low_balance_reports_current_balance() {
        let chain = Arc::new(StubChain::with_balance(ether("0.01")));
        let router = app(&chain);

        let (status, body) =
            post_json(&router, "/api/faucet", json!({ "address": DEAD }), None).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body["error"],
            "Insufficient funds in faucet wallet. Current balance: 0.01 ETH"
        );
        assert_eq!(chain.submit_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dispense_error_statuses() {
        let chain = Arc::new(StubChain::with_balance(ether("1.0")));
        chain.set_unreachable();
        let (status, body) =
            post_json(&app(&chain), "/api/faucet", json!({ "address": DEAD }), None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body["error"],
            "Could not connect to Ethereum network. Please check your RPC URL."
        );

        let (status, body) =
            post_json(&app_with(None, None), "/api/faucet", json!({ "address": DEAD }), None)
                .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Ethereum provider not properly configured");

        let healthy = Arc::new(StubChain::with_balance(ether("1.0")));
        let router = app_with(Some(healthy), Some(Duration::from_secs(3600)));
        let (status, body) =
            post_json(&router, "/api/faucet", json!({ "address": DEAD }), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["nextEligibleAt"].is_string());
        let (status, body) =
            post_json(&router, "/api/faucet", json!({ "address": DEAD }), None).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert!(body["error"].as_str().unwrap().contains("60 minutes"));
    }

    #[tokio::test]
    async fn malformed_body_is_a_bad_request() {
        let chain = Arc::new(StubChain::with_balance(ether("1.0")));
        let (status, body) =
            post_json(&app(&chain), "/api/faucet", json!({ "address": 42 }), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(
            body["error"]
                .as_str()
                .unwrap()
                .starts_with("Failed to process request")
        );
    }

    #[tokio::test]
    async fn status_moves_from_pending_to_success() {
        let chain = Arc::new(StubChain::with_balance(ether("1.0")));
        let router = app(&chain);
        let (_, body) = post_json(&router, "/api/faucet", json!({ "address": DEAD }), None).await;
        let hash = body["hash"].as_str().unwrap().to_string();

        let (status, first) =
            post_json(&router, "/api/transaction-status", json!({ "hash": hash }), None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, second) =
            post_json(&router, "/api/transaction-status", json!({ "hash": hash }), None).await;
        assert_eq!(first, second);
        let pending: StatusResponseBody = decode(first);
        assert_eq!(pending.status, StatusKind::Pending);
        assert_eq!(pending.message, "Transaction is still pending");
        assert_eq!(pending.block_number, None);

        chain.confirm(parse_tx_hash(&hash).unwrap(), 7_000_001);
        for _ in 0..2 {
            let (status, body) =
                post_json(&router, "/api/transaction-status", json!({ "hash": hash }), None)
                    .await;
            assert_eq!(status, StatusCode::OK);
            let mined: StatusResponseBody = decode(body);
            assert_eq!(mined.status, StatusKind::Success);
            assert_eq!(mined.block_number, Some(7_000_001));
            assert_eq!(mined.message, "Transaction successfully mined");
        }
    }

    #[tokio::test]
    async fn status_lookup_failure_reads_as_pending() {
        let chain = Arc::new(StubChain::with_balance(ether("1.0")));
        chain.fail_receipts_with(crate::chain::ChainError::Timeout);
        let hash = format!("0x{}", "ab".repeat(32));

        let (status, body) = post_json(
            &app(&chain),
            "/api/transaction-status",
            json!({ "hash": hash }),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "pending");
        assert_eq!(
            body["message"],
            "Transaction status unknown, it may still be pending"
        );
    }

    #[tokio::test]
    async fn status_rejects_bad_hashes() {
        let chain = Arc::new(StubChain::with_balance(ether("1.0")));
        let router = app(&chain);

        let (status, body) = post_json(&router, "/api/transaction-status", json!({}), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Transaction hash is required");

        let (status, _) = post_json(
            &router,
            "/api/transaction-status",
            json!({ "hash": "0x1234" }),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(chain.total_calls(), 0);

        let hash = format!("0x{}", "ab".repeat(32));
        let (status, body) = post_json(
            &app_with(None, None),
            "/api/transaction-status",
            json!({ "hash": hash }),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "RPC URL not configured");
    }

    #[tokio::test]
    async fn faucet_status_reports_dispenser() {
        let chain = Arc::new(StubChain::with_balance(ether("1.0")));
        let (status, body) = get_json(&app(&chain), "/api/faucet/status").await;

        assert_eq!(status, StatusCode::OK);
        let body: FaucetStatusResponse = decode(body);
        assert_eq!(body.faucet_address, ANVIL_ADDRESS);
        assert_eq!(body.balance_formatted, "1 ETH");
        assert_eq!(body.drip_amount_formatted, "0.05 ETH");
        assert_eq!(body.drips_available, "20");
        assert_eq!(body.block_number, 7_000_000);
        assert_eq!(body.cooldown_minutes, None);
    }
}
