//! HTTP surface: the two WebSocket endpoints plus a health check.

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::relay::{client, streamer};
use crate::state::AppState;

/// Build the relay router from the configured paths.
pub fn router(state: AppState) -> Router {
    let config = state.config.clone();
    let server = &config.server;

    Router::new()
        .route(&server.streamer_path, get(streamer::streamer_ws))
        .route(&server.client_path, get(client::client_ws))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(tower::limit::ConcurrencyLimitLayer::new(server.max_connections))
        .with_state(state)
}

/// GET /health: streamer attachment, in-flight requests, open sockets.
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.broker.status();
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "streamer": status.streamer,
        "pending_requests": status.pending_requests,
        "open_connections": state.open_connections(),
    }))
}
