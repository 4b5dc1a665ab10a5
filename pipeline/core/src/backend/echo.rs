//! Echo Backend
//!
//! Offline provider for local development and tests. By default it streams
//! the prompt back word by word; a script replaces that with fixed tokens,
//! optionally followed by a mid-stream error.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::traits::{LlmBackend, LlmRequest, StreamingToken};
use super::CHANNEL_CAPACITY;

#[derive(Clone, Debug)]
enum Mode {
    Echo,
    Script {
        tokens: Vec<String>,
        error: Option<String>,
    },
    Unavailable(String),
}

/// Provider that needs no network
#[derive(Clone, Debug)]
pub struct EchoBackend {
    mode: Mode,
}

impl Default for EchoBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl EchoBackend {
    /// Echo each prompt back
    #[must_use]
    pub fn new() -> Self {
        Self { mode: Mode::Echo }
    }

    /// Play back fixed tokens for every request
    pub fn scripted<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: Mode::Script {
                tokens: tokens.into_iter().map(Into::into).collect(),
                error: None,
            },
        }
    }

    /// End a script with a provider error instead of completing
    #[must_use]
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.mode = match self.mode {
            Mode::Script { tokens, .. } => Mode::Script {
                tokens,
                error: Some(message),
            },
            Mode::Echo | Mode::Unavailable(_) => Mode::Script {
                tokens: Vec::new(),
                error: Some(message),
            },
        };
        self
    }

    /// Fail every request before streaming starts
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            mode: Mode::Unavailable(message.into()),
        }
    }
}

/// Split text into words, keeping the separating whitespace on each word
fn words(text: &str) -> Vec<String> {
    text.split_inclusive(char::is_whitespace)
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl LlmBackend for EchoBackend {
    fn name(&self) -> &'static str {
        "Echo"
    }

    fn model(&self) -> &'static str {
        "echo"
    }

    async fn health_check(&self) -> bool {
        !matches!(self.mode, Mode::Unavailable(_))
    }

    async fn send_streaming(
        &self,
        request: &LlmRequest,
    ) -> anyhow::Result<mpsc::Receiver<StreamingToken>> {
        let (tokens, error) = match &self.mode {
            Mode::Echo => (words(&request.prompt), None),
            Mode::Script { tokens, error } => (tokens.clone(), error.clone()),
            Mode::Unavailable(message) => anyhow::bail!("{message}"),
        };

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let mut full_response = String::new();
            for token in tokens {
                full_response.push_str(&token);
                if tx.send(StreamingToken::Token(token)).await.is_err() {
                    return;
                }
            }

            let last = match error {
                Some(message) => StreamingToken::Error(message),
                None => StreamingToken::Complete {
                    message: full_response,
                },
            };
            let _ = tx.send(last).await;
        });

        Ok(rx)
    }
}
