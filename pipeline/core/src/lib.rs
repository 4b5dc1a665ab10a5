//! Zyron Core - Streaming Chat Pipeline
//!
//! This crate carries a chat answer from a text-generation provider to the
//! person reading it, one fragment at a time. It has no HTTP server and no
//! UI of its own; the `zyron-server` and `zyron-chat` binaries sit on top.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────── server ────────────────────────────┐
//! │  LlmBackend ──StreamingToken──► wire::encoder ──► data: "..."  │
//! │  (Anthropic / Ollama / Echo)                          │         │
//! └───────────────────────────────────────────────────────┼─────────┘
//!                                                          │ HTTP body,
//!                                                          │ arbitrary chunks
//! ┌──────────────────────────── client ───────────────────┼─────────┐
//! │  SessionController                                     ▼         │
//! │    ├── ChatTransport (HttpTransport) ── bytes ─► wire::reader    │
//! │    ├── wire::parser ◄── complete lines ──────────────┘           │
//! │    ├── RetryPolicy (1s, 2s, ... backoff)                         │
//! │    └── SessionObserver ◄── fragments, completion, errors         │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`SessionController`]: one in-flight chat turn with abort and retry
//! - [`FrameReader`] / [`FrameParser`]: body bytes to text fragments
//! - [`LlmBackend`]: provider abstraction used by the server
//! - [`ConversationStore`]: history for authenticated users
//! - [`ZyronConfig`]: layered TOML / environment / CLI configuration
//!
//! # Quick Start
//!
//! ```ignore
//! use zyron_core::{ChatRequest, HttpTransport, SessionController, SessionObserver};
//!
//! struct Print;
//! impl SessionObserver for Print {
//!     fn on_fragment(&self, text: &str) { print!("{text}"); }
//! }
//!
//! let transport = HttpTransport::new("http://localhost:8000", Duration::from_secs(10))?;
//! let controller = SessionController::new(transport);
//! controller.send(ChatRequest::new("Bonjour"), &Print).await?;
//! ```

#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss)]

pub mod backend;
pub mod config;
pub mod conversation;
pub mod session;
pub mod wire;

// Re-exports for convenience
pub use backend::{
    AnthropicBackend, EchoBackend, HistoryTurn, LlmBackend, LlmRequest, OllamaBackend,
    StreamingToken,
};
pub use config::{
    default_config_path, load_config, load_config_from_path, ClientSettings, ConfigError,
    ConfigOverrides, ConfigSource, ProviderKind, ProviderSettings, ServerSettings, ZyronConfig,
    ZyronToml,
};
pub use conversation::{
    Conversation, ConversationMessage, ConversationStore, InMemoryConversationStore, MessageRole,
    StoreError,
};
pub use session::{
    ChatRequest, ChatTransport, HttpTransport, NoopObserver, OpenedStream, RetryPolicy,
    SessionController, SessionError, SessionObserver, SessionOutcome, SessionState,
    TransportError,
};
pub use wire::{Frame, FrameParser, FrameReader, LineBuffer, MalformedFramePolicy};
