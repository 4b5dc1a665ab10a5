//! LLM Backend Traits
//!
//! Trait definitions for the text-generation providers behind the chat
//! endpoint. The server only ever talks to [`LlmBackend`]; provider details
//! (API formats, auth, stream framing) stay inside each implementation.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::conversation::{ConversationMessage, MessageRole};

/// Token stream events from LLM backends
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamingToken {
    /// A text delta from the response
    Token(String),
    /// Response completed successfully
    Complete {
        /// The complete message (concatenation of all tokens)
        message: String,
    },
    /// The provider failed after streaming began
    Error(String),
}

/// A previous turn sent to the provider as context
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryTurn {
    /// Who said it
    pub role: MessageRole,
    /// What was said
    pub content: String,
}

impl From<&ConversationMessage> for HistoryTurn {
    fn from(message: &ConversationMessage) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

/// Configuration for LLM requests
#[derive(Clone, Debug)]
pub struct LlmRequest {
    /// The user's message
    pub prompt: String,
    /// Model to use (backend-specific identifier)
    pub model: String,
    /// Maximum tokens in response (0 = backend default)
    pub max_tokens: u32,
    /// Temperature (0.0-1.0, higher = more creative)
    pub temperature: f32,
    /// System prompt
    pub system: Option<String>,
    /// Earlier turns of the conversation, oldest first
    pub history: Vec<HistoryTurn>,
}

impl Default for LlmRequest {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            model: String::new(),
            max_tokens: 0,
            temperature: 0.7,
            system: None,
            history: Vec::new(),
        }
    }
}

impl LlmRequest {
    /// Create a new request with prompt and model
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    /// Set temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 1.0);
        self
    }

    /// Set system prompt
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set conversation history
    #[must_use]
    pub fn with_history(mut self, history: Vec<HistoryTurn>) -> Self {
        self.history = history;
        self
    }

    /// Set max tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// LLM Backend trait
///
/// Implement this trait to add support for a different provider.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Backend name (e.g., "Anthropic", "Ollama")
    fn name(&self) -> &str;

    /// Model used when a request does not name one
    fn model(&self) -> &str;

    /// Check if the backend is healthy and reachable
    async fn health_check(&self) -> bool;

    /// Send a request and get a streaming response
    ///
    /// An `Err` means the request failed before any token was produced.
    /// Afterwards the channel carries tokens, then exactly one `Complete` or
    /// `Error`, and is closed.
    async fn send_streaming(
        &self,
        request: &LlmRequest,
    ) -> anyhow::Result<mpsc::Receiver<StreamingToken>>;
}
