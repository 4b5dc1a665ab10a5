//! Chat Session
//!
//! Client-side ownership of one streaming chat turn at a time.
//!
//! # State Machine
//!
//! ```text
//!            send                 headers received           body ends
//!   Idle ───────────► Sending ─────────────────────► Streaming ─────────► Completed
//!                      ▲   │                              │
//!                      │   │ transport error              │ transport error
//!                      │   │ (retries left: wait 2^n s)   │ (retries left)
//!                      └───┴──────────────────────────────┘
//!                          │ retries exhausted, non-retryable status,
//!                          │ or in-band upstream error
//!                          ▼
//!                        Failed
//!
//!   Sending / Streaming ── abort ──► Aborted
//! ```
//!
//! A new `send` supersedes any session still in flight: the old one is
//! cancelled and ends without notifying its observer.

mod controller;
mod retry;
mod transport;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use controller::SessionController;
pub use retry::RetryPolicy;
pub use transport::{
    ByteStream, ChatTransport, HttpTransport, OpenedStream, TransportError,
    CONVERSATION_ID_HEADER,
};

/// Body of `POST /chat`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The user's message; must not be blank
    pub message: String,
    /// Authenticated user, enables persistence on the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Conversation to continue
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<Uuid>,
}

impl ChatRequest {
    /// Create a guest request
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            user_id: None,
            conversation_id: None,
        }
    }

    /// Set the authenticated user
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the conversation to continue
    #[must_use]
    pub fn with_conversation(mut self, conversation_id: Option<Uuid>) -> Self {
        self.conversation_id = conversation_id;
        self
    }
}

/// Lifecycle of a session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing sent yet
    #[default]
    Idle,
    /// Request in flight, or waiting to retry
    Sending,
    /// Response headers received, reading the body
    Streaming,
    /// Body ended normally
    Completed,
    /// Cancelled by the caller
    Aborted,
    /// Ended with a visible error
    Failed,
}

impl SessionState {
    /// Whether the session has ended
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::Failed)
    }

    /// Whether a request is in flight
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Sending | Self::Streaming)
    }
}

/// How a session ended without an error
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The full assembled response
    Completed(String),
    /// The caller aborted; `partial` is what had arrived in the last attempt
    Aborted {
        /// Text received before the abort
        partial: String,
    },
    /// A newer `send` replaced this session
    Superseded,
}

/// Session failures surfaced to the caller
#[derive(Debug, Error)]
pub enum SessionError {
    /// The request was rejected before any I/O
    #[error("{0}")]
    Validation(String),

    /// The transport failed and retries did not help
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server reported a provider failure in-band
    #[error("{0}")]
    Upstream(String),
}

/// Receives the progress of a session
///
/// All methods default to no-ops. Callbacks run on the task driving
/// [`SessionController::send`] and are never called after an abort or
/// supersede is observed.
pub trait SessionObserver: Send + Sync {
    /// A decoded text fragment, in arrival order
    fn on_fragment(&self, _fragment: &str) {}

    /// The full response, called once
    fn on_complete(&self, _response: &str) {}

    /// The session failed
    fn on_error(&self, _error: &SessionError) {}

    /// A retry is scheduled; text shown for the failed attempt is stale
    fn on_retry(&self, _attempt: u32, _delay: Duration, _error: &TransportError) {}

    /// The caller aborted the session
    fn on_abort(&self) {}
}

/// Observer that ignores everything
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}
