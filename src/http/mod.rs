use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::{Request, State};
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderName, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::models::faucet::ErrorBody;
use crate::state::AppState;

mod faucet;

/// Header carrying the access password when the gate is enabled.
pub const PASSWORD_HEADER: HeaderName = HeaderName::from_static("x-faucet-password");

pub fn router(state: AppState) -> Router {
    assert!(
        state.start_time.elapsed() < Duration::from_secs(86_400),
        "Application uptime exceeds 24 hours before router creation"
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE, PASSWORD_HEADER])
        .max_age(Duration::from_secs(3600));

    let gated = faucet::router().route_layer(middleware::from_fn_with_state(
        state.clone(),
        require_password,
    ));
    let api_router = gated.merge(faucet::auth_router());

    Router::new()
        .route("/health", get(health_live))
        .route("/health/ready", get(health_ready))
        .nest("/api", api_router)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn require_password(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, HttpError> {
    if let Some(expected) = &state.access_password {
        let supplied = request
            .headers()
            .get(&PASSWORD_HEADER)
            .and_then(|value| value.to_str().ok());
        if supplied != Some(expected.expose()) {
            return Err(HttpError::new(
                StatusCode::UNAUTHORIZED,
                "Unauthorized".to_string(),
            ));
        }
    }
    Ok(next.run(request).await)
}

async fn health_live(State(state): State<AppState>) -> Result<Json<HealthResponse>, HttpError> {
    let uptime = state.start_time.elapsed().as_secs();
    assert!(
        uptime <= 31_536_000,
        "Uptime exceeds one year without restart"
    );
    let response = HealthResponse {
        status: "live",
        uptime_seconds: uptime,
    };
    Ok(Json(response))
}

async fn health_ready(State(state): State<AppState>) -> Result<Json<ReadyResponse>, HttpError> {
    let chain = state.chain.as_ref().ok_or_else(|| {
        HttpError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "RPC URL not configured".to_string(),
        )
    })?;
    let latest_block = chain
        .block_number()
        .await
        .map_err(|err| {
            HttpError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                format!("Chain not ready: {err}"),
            )
        })?;

    let rpc_timeout_ms =
        u64::try_from(state.rpc_timeout.as_millis()).expect("RPC timeout exceeds u64 bounds");

    let response = ReadyResponse {
        status: "ready",
        latest_block,
        rpc_timeout_ms,
        signer_configured: state.dispenser.dispenser_address().is_some(),
        password_required: state.access_password.is_some(),
    };
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
struct ReadyResponse {
    status: &'static str,
    latest_block: u64,
    rpc_timeout_ms: u64,
    signer_configured: bool,
    password_required: bool,
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    message: String,
}

impl HttpError {
    pub fn new(status: StatusCode, message: String) -> Self {
        assert!(status != StatusCode::OK, "Error status cannot be 200");
        assert!(!message.is_empty(), "Error message cannot be empty");
        Self { status, message }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        info!("HTTP error: {}", self.message);
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}
