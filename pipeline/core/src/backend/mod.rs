//! LLM Backend Integration
//!
//! Abstracted access to text-generation providers through a common trait.
//!
//! # Available Backends
//!
//! - **Anthropic**: Messages API with SSE streaming (default)
//! - **Ollama**: Local LLM server, newline-delimited JSON
//! - **Echo**: Offline, echoes the prompt or plays back a script
//!
//! # Usage
//!
//! ```ignore
//! use zyron_core::backend::{self, LlmBackend, LlmRequest};
//!
//! let backend = backend::from_settings(&config.provider)?;
//! let request = LlmRequest::new("Hello!", backend.model());
//! let rx = backend.send_streaming(&request).await?;
//! ```

mod anthropic;
mod echo;
mod ollama;
mod traits;

use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

use crate::config::{ProviderKind, ProviderSettings};
use crate::wire::LineBuffer;

pub use anthropic::AnthropicBackend;
pub use echo::EchoBackend;
pub use ollama::OllamaBackend;
pub use traits::{HistoryTurn, LlmBackend, LlmRequest, StreamingToken};

/// Token channel capacity
pub const CHANNEL_CAPACITY: usize = 100;

/// Build the configured backend
///
/// # Errors
///
/// Returns an error if the provider needs an API key and the configured
/// environment variable is unset, or if the HTTP client cannot be built.
pub fn from_settings(settings: &ProviderSettings) -> anyhow::Result<Arc<dyn LlmBackend>> {
    from_settings_with_env(settings, |key| std::env::var(key).ok())
}

/// Build the configured backend with an explicit environment lookup
///
/// # Errors
///
/// See [`from_settings`].
pub fn from_settings_with_env<F>(
    settings: &ProviderSettings,
    env: F,
) -> anyhow::Result<Arc<dyn LlmBackend>>
where
    F: Fn(&str) -> Option<String>,
{
    let backend: Arc<dyn LlmBackend> = match settings.kind {
        ProviderKind::Anthropic => {
            let api_key = env(&settings.api_key_env)
                .filter(|k| !k.trim().is_empty())
                .with_context(|| {
                    format!(
                        "Anthropic provider needs an API key in ${}",
                        settings.api_key_env
                    )
                })?;
            Arc::new(AnthropicBackend::from_settings(settings, api_key)?)
        }
        ProviderKind::Ollama => Arc::new(OllamaBackend::from_settings(settings)?),
        ProviderKind::Echo => Arc::new(EchoBackend::new()),
    };

    tracing::info!(
        backend = backend.name(),
        model = backend.model(),
        "LLM backend configured"
    );
    Ok(backend)
}

// ============================================================================
// Shared stream pump
// ============================================================================

/// What one provider line means
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum LineEvent {
    /// A text delta
    Token(String),
    /// The provider finished the response
    Done,
    /// The provider reported a failure
    Error(String),
    /// Nothing to forward
    Skip,
}

/// Forward a provider response body as tokens
///
/// Splits the body into lines with a [`LineBuffer`], classifies each line
/// and sends the result to `tx`. Sends exactly one `Complete` or `Error` as
/// the last token; stops early if the receiver is dropped.
pub(crate) async fn pump_lines<S, E, F>(
    body: S,
    mut lines: LineBuffer,
    tx: mpsc::Sender<StreamingToken>,
    mut classify: F,
) where
    S: Stream<Item = Result<Bytes, E>> + Send,
    E: std::fmt::Display + Send,
    F: FnMut(&str) -> LineEvent + Send,
{
    let mut body = std::pin::pin!(body);
    let mut full_response = String::new();

    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => {
                for line in lines.push(&bytes) {
                    if !forward(classify(&line), &mut full_response, &tx).await {
                        return;
                    }
                }
            }
            Err(e) => {
                let _ = tx.send(StreamingToken::Error(e.to_string())).await;
                return;
            }
        }
    }

    if let Some(line) = lines.finish() {
        if !forward(classify(&line), &mut full_response, &tx).await {
            return;
        }
    }

    // Stream ended without a done signal
    tracing::debug!(len = full_response.len(), "Provider stream closed without completion event");
    let _ = tx
        .send(StreamingToken::Complete {
            message: full_response,
        })
        .await;
}

/// Send one classified line; returns false when the stream is over
async fn forward(
    event: LineEvent,
    full_response: &mut String,
    tx: &mpsc::Sender<StreamingToken>,
) -> bool {
    match event {
        LineEvent::Token(text) if text.is_empty() => true,
        LineEvent::Token(text) => {
            full_response.push_str(&text);
            // Receiver dropped, stop streaming
            tx.send(StreamingToken::Token(text)).await.is_ok()
        }
        LineEvent::Done => {
            let _ = tx
                .send(StreamingToken::Complete {
                    message: std::mem::take(full_response),
                })
                .await;
            false
        }
        LineEvent::Error(message) => {
            let _ = tx.send(StreamingToken::Error(message)).await;
            false
        }
        LineEvent::Skip => true,
    }
}
