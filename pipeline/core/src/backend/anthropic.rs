//! Anthropic Backend Implementation
//!
//! Streams from the Messages API (`POST /v1/messages` with `stream: true`).
//! The response is itself an SSE stream; only the `data:` lines matter:
//!
//! ```text
//! content_block_delta / text_delta  -> token
//! message_stop                      -> complete
//! error                             -> error
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use super::traits::{LlmBackend, LlmRequest, StreamingToken};
use super::{pump_lines, LineEvent, CHANNEL_CAPACITY};
use crate::config::ProviderSettings;
use crate::wire::{LineBuffer, FRAME_PREFIX};

const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 2000;

/// Anthropic Messages API client
#[derive(Clone)]
pub struct AnthropicBackend {
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    system: Option<String>,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for AnthropicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicBackend")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<ApiMessage<'a>>,
    temperature: f32,
    stream: bool,
}

impl AnthropicBackend {
    /// Create a backend for the public API
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> anyhow::Result<Self> {
        Self::build(
            "https://api.anthropic.com",
            api_key.into(),
            model.into(),
            Duration::from_secs(60),
        )
    }

    /// Create from provider settings
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_settings(settings: &ProviderSettings, api_key: String) -> anyhow::Result<Self> {
        let mut backend = Self::build(
            settings.base_url(),
            api_key,
            settings.model.clone(),
            settings.request_timeout,
        )?;
        backend.max_tokens = settings.max_tokens;
        backend.temperature = settings.temperature;
        backend.system = Some(settings.system_prompt.clone());
        Ok(backend)
    }

    fn build(
        base_url: &str,
        api_key: String,
        model: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: 0.7,
            system: None,
            http_client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }

    fn models_url(&self) -> String {
        format!("{}/v1/models", self.base_url)
    }

    fn request_body<'a>(&'a self, request: &'a LlmRequest) -> MessagesRequest<'a> {
        let mut messages: Vec<ApiMessage<'a>> = request
            .history
            .iter()
            .map(|turn| ApiMessage {
                role: turn.role.as_str(),
                content: &turn.content,
            })
            .collect();
        messages.push(ApiMessage {
            role: "user",
            content: &request.prompt,
        });

        MessagesRequest {
            model: if request.model.is_empty() {
                &self.model
            } else {
                &request.model
            },
            max_tokens: if request.max_tokens > 0 {
                request.max_tokens
            } else {
                self.max_tokens
            },
            system: request.system.as_deref().or(self.system.as_deref()),
            messages,
            temperature: request.temperature,
            stream: true,
        }
    }
}

/// Classify one line of the Messages API event stream
fn classify_line(line: &str) -> LineEvent {
    let Some(payload) = line.strip_prefix(FRAME_PREFIX) else {
        return LineEvent::Skip;
    };

    let Ok(event) = serde_json::from_str::<serde_json::Value>(payload) else {
        tracing::debug!(len = payload.len(), "Skipping unparsable Anthropic event");
        return LineEvent::Skip;
    };

    match event.get("type").and_then(|t| t.as_str()) {
        Some("content_block_delta") => {
            let delta = &event["delta"];
            if delta.get("type").and_then(|t| t.as_str()) == Some("text_delta") {
                delta
                    .get("text")
                    .and_then(|t| t.as_str())
                    .map_or(LineEvent::Skip, |t| LineEvent::Token(t.to_string()))
            } else {
                LineEvent::Skip
            }
        }
        Some("message_stop") => LineEvent::Done,
        Some("error") => {
            let message = event["error"]
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("Anthropic stream error");
            LineEvent::Error(message.to_string())
        }
        _ => LineEvent::Skip,
    }
}

/// Pull a readable message out of an API error body
fn api_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value["error"]
        .get("message")
        .and_then(|m| m.as_str())
        .map(String::from)
}

#[async_trait]
impl LlmBackend for AnthropicBackend {
    fn name(&self) -> &'static str {
        "Anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> bool {
        self.http_client
            .get(self.models_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .is_ok_and(|r| r.status().is_success())
    }

    async fn send_streaming(
        &self,
        request: &LlmRequest,
    ) -> anyhow::Result<mpsc::Receiver<StreamingToken>> {
        let body = self.request_body(request);
        tracing::debug!(
            model = body.model,
            history = request.history.len(),
            "Sending Anthropic request"
        );

        let response = self
            .http_client
            .post(self.messages_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            let message = api_error_message(&text).unwrap_or(text);
            anyhow::bail!("Anthropic returned {status}: {message}");
        }

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(pump_lines(
            response.bytes_stream(),
            LineBuffer::for_frames(),
            tx,
            classify_line,
        ));

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HistoryTurn;
    use crate::conversation::MessageRole;

    fn backend() -> AnthropicBackend {
        AnthropicBackend::new("sk-test", "claude-sonnet-4-20250514").unwrap()
    }

    #[test]
    fn test_request_body_includes_history() {
        let backend = backend();
        let request = LlmRequest::new("And now?", "")
            .with_system("Be brief")
            .with_history(vec![
                HistoryTurn {
                    role: MessageRole::User,
                    content: "Hi".into(),
                },
                HistoryTurn {
                    role: MessageRole::Assistant,
                    content: "Hello!".into(),
                },
            ]);

        let json = serde_json::to_value(backend.request_body(&request)).unwrap();

        assert_eq!(json["model"], "claude-sonnet-4-20250514");
        assert_eq!(json["max_tokens"], 2000);
        assert_eq!(json["system"], "Be brief");
        assert_eq!(json["stream"], true);
        assert_eq!(
            json["messages"],
            serde_json::json!([
                {"role": "user", "content": "Hi"},
                {"role": "assistant", "content": "Hello!"},
                {"role": "user", "content": "And now?"},
            ])
        );
    }

    #[test]
    fn test_request_body_omits_missing_system() {
        let json = serde_json::to_value(backend().request_body(&LlmRequest::new("Hi", ""))).unwrap();
        assert!(json.get("system").is_none());
    }

    #[test]
    fn test_classify_line() {
        assert_eq!(
            classify_line(
                r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Bon"}}"#
            ),
            LineEvent::Token("Bon".into())
        );
        assert_eq!(
            classify_line(r#"data: {"type":"message_stop"}"#),
            LineEvent::Done
        );
        assert_eq!(
            classify_line(
                r#"data: {"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#
            ),
            LineEvent::Error("Overloaded".into())
        );
        assert_eq!(classify_line("event: content_block_delta"), LineEvent::Skip);
        assert_eq!(classify_line(r#"data: {"type":"ping"}"#), LineEvent::Skip);
        assert_eq!(
            classify_line(
                r#"data: {"type":"content_block_delta","delta":{"type":"input_json_delta","partial_json":"{"}}"#
            ),
            LineEvent::Skip
        );
    }

    #[test]
    fn test_api_error_message() {
        assert_eq!(
            api_error_message(r#"{"type":"error","error":{"type":"invalid_request_error","message":"bad model"}}"#),
            Some("bad model".to_string())
        );
        assert_eq!(api_error_message("<html>"), None);
    }

    #[test]
    fn test_debug_redacts_key() {
        let rendered = format!("{:?}", backend());
        assert!(!rendered.contains("sk-test"));
    }
}
