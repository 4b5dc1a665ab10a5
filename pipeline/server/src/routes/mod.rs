use axum::Router;
use tower_http::trace::TraceLayer;

use crate::cors::cors_layer;
use crate::state::AppState;

pub mod chat;
pub mod conversations;
pub mod health;

/// Assemble the full router with middleware
pub fn build(state: AppState) -> Router {
    let cors = cors_layer(state.server.cors_allowed_origins.as_deref());

    Router::new()
        .merge(health::router())
        .merge(chat::router())
        .merge(conversations::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
