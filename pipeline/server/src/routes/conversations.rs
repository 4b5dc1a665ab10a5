use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/conversations/{id}/messages", get(messages))
        .route("/users/{user_id}/conversations", get(user_conversations))
}

async fn messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let conversation_id = Uuid::parse_str(id.trim())
        .map_err(|_| ApiError::BadRequest("Invalid conversation id".to_owned()))?;
    let messages = state.store.fetch_messages(conversation_id).await?;
    Ok(Json(json!({
        "conversation_id": conversation_id,
        "messages": messages,
    })))
}

async fn user_conversations(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if user_id.trim().is_empty() {
        return Err(ApiError::BadRequest("User id is required".to_owned()));
    }
    let conversations = state.store.list_conversations(&user_id).await?;
    Ok(Json(json!({
        "user_id": user_id,
        "conversations": conversations,
    })))
}
