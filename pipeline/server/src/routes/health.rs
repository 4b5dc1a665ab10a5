use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

const SERVICE_NAME: &str = "zyron-server";
const CODENAME: &str = "Zyron AI";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/version", get(version))
}

async fn root() -> Json<Value> {
    Json(json!({ "status": "Zyron AI is alive" }))
}

/// Liveness plus a provider reachability probe. Always 200; an unreachable
/// provider is reported, not treated as a server failure.
async fn health(State(state): State<AppState>) -> Json<Value> {
    let reachable = state.backend.health_check().await;
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": SERVICE_NAME,
        "backend": {
            "name": state.backend.name(),
            "model": state.backend.model(),
            "reachable": reachable,
        },
    }))
}

async fn version() -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "codename": CODENAME,
        "status": "operational",
    }))
}
