//! `POST /chat`
//!
//! Validates the request, loads history for authenticated callers, starts
//! the provider stream and answers with a `text/event-stream` body. The
//! provider's first failure (before any token) is a 502; later failures
//! arrive in-band as a final `data: {"error": ...}` frame.
//!
//! Turns are stored only when the provider stream completes. A caller that
//! disconnects mid-answer leaves no partial turn behind.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use zyron_core::backend::CHANNEL_CAPACITY;
use zyron_core::session::CONVERSATION_ID_HEADER;
use zyron_core::wire::{frame_stream, SSE_CACHE_CONTROL, SSE_CONTENT_TYPE};
use zyron_core::{
    ConversationStore, HistoryTurn, LlmRequest, MessageRole, StreamingToken,
};

use crate::error::ApiError;
use crate::state::AppState;

const ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/chat",
        post(chat).options(preflight).fallback(method_not_allowed),
    )
}

/// Body of `POST /chat`
#[derive(Debug, Default, Deserialize)]
pub struct ChatBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
}

async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = payload?;

    let message = body.message.unwrap_or_default();
    if message.trim().is_empty() {
        return Err(ApiError::BadRequest("Message is required".to_owned()));
    }
    if message.len() > state.server.max_message_bytes {
        return Err(ApiError::BadRequest(format!(
            "Message exceeds {} bytes",
            state.server.max_message_bytes
        )));
    }

    let user_id = body.user_id.filter(|id| !id.trim().is_empty());
    debug!(
        authenticated = user_id.is_some(),
        has_authorization = headers.contains_key(header::AUTHORIZATION),
        bytes = message.len(),
        "chat request"
    );

    let (conversation_id, history) = match &user_id {
        Some(user_id) => {
            let conversation = state
                .store
                .get_or_create(user_id, body.conversation_id)
                .await?;
            let messages = state.store.fetch_messages(conversation.id).await?;
            let skip = messages.len().saturating_sub(state.server.history_limit);
            let history: Vec<HistoryTurn> =
                messages[skip..].iter().map(HistoryTurn::from).collect();
            (Some(conversation.id), history)
        }
        None => (None, Vec::new()),
    };

    let provider = &state.provider;
    let request = LlmRequest::new(message.clone(), provider.model.clone())
        .with_max_tokens(provider.max_tokens)
        .with_temperature(provider.temperature)
        .with_system(provider.system_prompt.clone())
        .with_history(history);

    let upstream = state
        .backend
        .send_streaming(&request)
        .await
        .map_err(|e| ApiError::Upstream(format!("{e:#}")))?;

    let tokens = match conversation_id {
        Some(id) => persist_on_complete(Arc::clone(&state.store), id, message, upstream),
        None => upstream,
    };

    info!(
        backend = state.backend.name(),
        conversation_id = ?conversation_id,
        "streaming answer"
    );

    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(SSE_CONTENT_TYPE));
    response_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(SSE_CACHE_CONTROL));
    response_headers.insert(ACCEL_BUFFERING, HeaderValue::from_static("no"));
    if let Some(id) = conversation_id {
        if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
            response_headers.insert(HeaderName::from_static(CONVERSATION_ID_HEADER), value);
        }
    }

    Ok((response_headers, Body::from_stream(frame_stream(tokens))).into_response())
}

/// Forward tokens to the response and store the turn once the provider
/// completes
///
/// Stops without storing when the provider fails or the response body is
/// dropped. Dropping `upstream` on the way out stops the provider task.
fn persist_on_complete(
    store: Arc<dyn ConversationStore>,
    conversation_id: Uuid,
    user_message: String,
    mut upstream: mpsc::Receiver<StreamingToken>,
) -> mpsc::Receiver<StreamingToken> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    tokio::spawn(async move {
        while let Some(token) = upstream.recv().await {
            match token {
                StreamingToken::Token(_) => {
                    if tx.send(token).await.is_err() {
                        debug!(%conversation_id, "client went away, turn not stored");
                        return;
                    }
                }
                StreamingToken::Complete { ref message } => {
                    if let Err(e) = store_turn(&*store, conversation_id, &user_message, message).await
                    {
                        error!(%conversation_id, error = %e, "failed to store turn");
                    }
                    let _ = tx.send(token).await;
                    return;
                }
                StreamingToken::Error(ref message) => {
                    warn!(%conversation_id, error = %message, "provider failed mid-stream");
                    let _ = tx.send(token).await;
                    return;
                }
            }
        }
        debug!(%conversation_id, "provider closed without completing, turn not stored");
    });

    rx
}

async fn store_turn(
    store: &dyn ConversationStore,
    conversation_id: Uuid,
    user_message: &str,
    answer: &str,
) -> Result<(), zyron_core::StoreError> {
    store
        .create_message(conversation_id, MessageRole::User, user_message)
        .await?;
    store
        .create_message(conversation_id, MessageRole::Assistant, answer)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use zyron_core::InMemoryConversationStore;

    async fn drain(mut rx: mpsc::Receiver<StreamingToken>) -> Vec<StreamingToken> {
        let mut out = Vec::new();
        while let Some(token) = rx.recv().await {
            out.push(token);
        }
        out
    }

    #[tokio::test]
    async fn test_persist_stores_turn_on_complete() {
        let store = Arc::new(InMemoryConversationStore::new());
        let conversation = store.get_or_create("u1", None).await.unwrap();

        let (tx, upstream) = mpsc::channel(8);
        tx.send(StreamingToken::Token("Hi".into())).await.unwrap();
        tx.send(StreamingToken::Complete { message: "Hi".into() })
            .await
            .unwrap();
        drop(tx);

        let rx = persist_on_complete(store.clone(), conversation.id, "Hello".into(), upstream);
        let tokens = drain(rx).await;
        assert_eq!(tokens.len(), 2);

        let messages = store.fetch_messages(conversation.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[0].content, "Hello");
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert_eq!(messages[1].content, "Hi");
    }

    #[tokio::test]
    async fn test_persist_skips_failed_stream() {
        let store = Arc::new(InMemoryConversationStore::new());
        let conversation = store.get_or_create("u1", None).await.unwrap();

        let (tx, upstream) = mpsc::channel(8);
        tx.send(StreamingToken::Token("par".into())).await.unwrap();
        tx.send(StreamingToken::Error("overloaded".into()))
            .await
            .unwrap();
        drop(tx);

        let rx = persist_on_complete(store.clone(), conversation.id, "Hello".into(), upstream);
        let tokens = drain(rx).await;
        assert_eq!(tokens.last(), Some(&StreamingToken::Error("overloaded".into())));
        assert!(store.fetch_messages(conversation.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persist_skips_when_client_disconnects() {
        let store = Arc::new(InMemoryConversationStore::new());
        let conversation = store.get_or_create("u1", None).await.unwrap();

        let (tx, upstream) = mpsc::channel(8);
        let rx = persist_on_complete(store.clone(), conversation.id, "Hello".into(), upstream);
        drop(rx);

        // The forwarding task exits on its first failed send
        tx.send(StreamingToken::Token("a".into())).await.unwrap();
        tx.closed().await;
        let _ = tx
            .send(StreamingToken::Complete { message: "a".into() })
            .await;

        assert!(store.fetch_messages(conversation.id).await.unwrap().is_empty());
    }
}
