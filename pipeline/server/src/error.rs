//! HTTP error type
//!
//! Every handler returns `Result<T, ApiError>`. Errors render as
//! `{"error": "<message>"}` with a matching status. Internal failures are
//! logged in full and answered with a generic message.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use zyron_core::StoreError;

/// Errors in the request lifecycle
#[derive(Debug, Error)]
pub enum ApiError {
    /// The caller sent an invalid request
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The route exists but not for this method
    #[error("method not allowed")]
    MethodNotAllowed,

    /// The provider failed before streaming started
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Conversation store failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            Self::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                "Method not allowed".to_owned(),
            ),
            Self::Upstream(m) => {
                error!(error = %m, "provider request failed");
                (StatusCode::BAD_GATEWAY, m.clone())
            }
            Self::Store(StoreError::NotFound(id)) => {
                (StatusCode::NOT_FOUND, format!("Conversation not found: {id}"))
            }
            Self::Store(e) => {
                error!(error = %e, "conversation store error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}
