//! Chat Transport
//!
//! The controller opens one response body per attempt through
//! [`ChatTransport`]. [`HttpTransport`] is the real implementation; tests
//! substitute scripted transports.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::{HeaderValue, ACCEPT};
use thiserror::Error;
use uuid::Uuid;

use super::ChatRequest;
use crate::config::ClientSettings;
use crate::wire::{ERROR_FIELD, SSE_CONTENT_TYPE};

/// Response header carrying the conversation the server stored the turn in
pub const CONVERSATION_ID_HEADER: &str = "x-conversation-id";

/// Transport failures
///
/// All of these are candidates for retry; [`super::RetryPolicy`] decides.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The request could not be sent or no response arrived
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The server answered with a non-2xx status
    #[error("Server returned {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Message from the JSON error body, or the status reason
        message: String,
    },

    /// Reading the response body failed mid-stream
    #[error("Response stream failed: {0}")]
    Body(String),
}

/// Response body as a stream of byte chunks
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// An opened streaming response
pub struct OpenedStream {
    /// Conversation the server associated with this turn, if any
    pub conversation_id: Option<Uuid>,
    /// Response body
    pub body: ByteStream,
}

impl OpenedStream {
    /// Wrap a body with no conversation id
    pub fn new(body: ByteStream) -> Self {
        Self {
            conversation_id: None,
            body,
        }
    }
}

/// Opens streaming chat responses
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send the request and return the response body once headers arrive
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the connection fails or the server
    /// answers with a non-2xx status.
    async fn open(&self, request: &ChatRequest) -> Result<OpenedStream, TransportError>;
}

// ============================================================================
// HTTP Transport
// ============================================================================

/// `POST {api_url}/chat` over reqwest
#[derive(Clone, Debug)]
pub struct HttpTransport {
    http_client: reqwest::Client,
    endpoint: String,
    auth_token: Option<String>,
}

impl HttpTransport {
    /// Create a transport for the given API base URL
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_url: &str, connect_timeout: Duration) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;

        Ok(Self {
            http_client,
            endpoint: chat_endpoint(api_url),
            auth_token: None,
        })
    }

    /// Create a transport from client settings
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_settings(settings: &ClientSettings) -> anyhow::Result<Self> {
        Self::new(&settings.api_url, settings.connect_timeout)
    }

    /// Attach a bearer credential to every request
    #[must_use]
    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token.filter(|t| !t.is_empty());
        self
    }

    /// The chat endpoint URL
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn chat_endpoint(api_url: &str) -> String {
    format!("{}/chat", api_url.trim_end_matches('/'))
}

/// Pull the `error` field out of a JSON error body, falling back to the raw
/// text or the status reason
fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get(ERROR_FIELD)?.as_str().map(String::from))
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        })
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn open(&self, request: &ChatRequest) -> Result<OpenedStream, TransportError> {
        let mut builder = self
            .http_client
            .post(&self.endpoint)
            .header(ACCEPT, HeaderValue::from_static(SSE_CONTENT_TYPE))
            .json(request);

        if let Some(ref token) = self.auth_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                message: error_message(status, &body),
            });
        }

        let conversation_id = response
            .headers()
            .get(CONVERSATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok());

        tracing::debug!(status = %status, ?conversation_id, "Chat stream opened");

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::Body(e.to_string())))
            .boxed();

        Ok(OpenedStream {
            conversation_id,
            body,
        })
    }
}
