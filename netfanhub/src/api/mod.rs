use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::websocket::{websocket_handler, Hub};

/// Build the router: the fan-out channel at `ws_path` plus a health probe.
/// Any other path falls through to axum's 404.
pub fn router(hub: Hub, ws_path: &str) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route(ws_path, get(websocket_handler))
        .layer(cors)
        .with_state(hub)
}

async fn health(State(hub): State<Hub>) -> (StatusCode, Json<serde_json::Value>) {
    let connections = hub.registry().count().await;
    (
        StatusCode::OK,
        Json(json!({"status": "ok", "connections": connections})),
    )
}
