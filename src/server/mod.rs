//! Read-only HTTP API over the cache.
//!
//! Uses `axum` for routing with CORS support. Only reconciled state is
//! served; nothing here waits on the background components.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::core::flow::CoinQueryService;
use crate::core::types::{CoinId, Trades};
use crate::error::AppError;

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub queries: CoinQueryService,
}

/// Error body returned by every failing route
struct ApiError(AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_not_found() {
            StatusCode::NOT_FOUND
        } else {
            error!(error = %self.0, "API request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/coins", get(coins_handler))
        .route("/trades/:coin_id", get(trades_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server.
///
/// Blocks until the server shuts down.
pub async fn start_server(state: AppState, port: u16) -> anyhow::Result<()> {
    let app = router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(address = %addr, "Starting read API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// GET /health
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().timestamp_millis(),
    }))
}

/// GET /coins: IDs of every cached coin that is not banned
async fn coins_handler(State(state): State<AppState>) -> Result<Json<Vec<CoinId>>, ApiError> {
    Ok(Json(state.queries.list_coins()?))
}

/// GET /trades/{coin_id}
async fn trades_handler(
    State(state): State<AppState>,
    Path(coin_id): Path<String>,
) -> Result<Json<Trades>, ApiError> {
    Ok(Json(state.queries.list_trades(&CoinId::new(coin_id))?))
}
