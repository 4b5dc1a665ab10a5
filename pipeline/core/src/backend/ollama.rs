//! Ollama Backend Implementation
//!
//! LLM backend for Ollama (local LLM server).
//!
//! # Ollama API
//!
//! - `/api/generate` - Generate completions, streamed as one JSON object per line
//! - `/api/tags` - List available models (used for health checks)
//!
//! Conversation history is flattened into the prompt since the generate
//! endpoint takes a single string.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::traits::{LlmBackend, LlmRequest, StreamingToken};
use super::{pump_lines, LineEvent, CHANNEL_CAPACITY};
use crate::config::ProviderSettings;
use crate::wire::LineBuffer;

/// Ollama backend client
#[derive(Clone, Debug)]
pub struct OllamaBackend {
    /// Base URL, e.g. `http://localhost:11434`
    base_url: String,
    /// Default model
    model: String,
    /// Default sampling settings
    max_tokens: u32,
    temperature: f32,
    system: Option<String>,
    /// HTTP client
    http_client: reqwest::Client,
}

impl OllamaBackend {
    /// Create a new Ollama backend
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> anyhow::Result<Self> {
        Self::with_timeout(base_url, model, Duration::from_secs(120))
    }

    fn with_timeout(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            max_tokens: 0,
            temperature: 0.7,
            system: None,
            http_client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    /// Create from provider settings
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_settings(settings: &ProviderSettings) -> anyhow::Result<Self> {
        let mut backend =
            Self::with_timeout(settings.base_url(), &settings.model, settings.request_timeout)?;
        backend.max_tokens = settings.max_tokens;
        backend.temperature = settings.temperature;
        backend.system = Some(settings.system_prompt.clone());
        Ok(backend)
    }

    /// Get generate endpoint URL
    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    /// Get tags endpoint URL
    fn tags_url(&self) -> String {
        format!("{}/api/tags", self.base_url)
    }

    /// Build the full prompt including system prompt and history
    fn build_prompt(&self, request: &LlmRequest) -> String {
        let mut full_prompt = String::new();

        if let Some(system) = request.system.as_ref().or(self.system.as_ref()) {
            full_prompt.push_str(system);
            full_prompt.push_str("\n\n");
        }

        for turn in &request.history {
            full_prompt.push_str(turn.role.as_str());
            full_prompt.push_str(": ");
            full_prompt.push_str(&turn.content);
            full_prompt.push('\n');
        }

        full_prompt.push_str(&request.prompt);
        full_prompt
    }

    fn request_body(&self, request: &LlmRequest) -> serde_json::Value {
        let model = if request.model.is_empty() {
            &self.model
        } else {
            &request.model
        };
        let max_tokens = if request.max_tokens > 0 {
            request.max_tokens
        } else {
            self.max_tokens
        };

        let mut options = serde_json::Map::new();
        options.insert("temperature".to_string(), serde_json::json!(request.temperature));
        if max_tokens > 0 {
            options.insert("num_predict".to_string(), serde_json::json!(max_tokens));
        }

        serde_json::json!({
            "model": model,
            "prompt": self.build_prompt(request),
            "stream": true,
            "options": options,
        })
    }
}

/// Classify one NDJSON line from `/api/generate`
fn classify_line(line: &str) -> LineEvent {
    let line = line.trim();
    if line.is_empty() {
        return LineEvent::Skip;
    }

    let Ok(data) = serde_json::from_str::<serde_json::Value>(line) else {
        tracing::debug!(len = line.len(), "Skipping unparsable Ollama line");
        return LineEvent::Skip;
    };

    if let Some(error) = data.get("error").and_then(|e| e.as_str()) {
        return LineEvent::Error(error.to_string());
    }

    if data
        .get("done")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false)
    {
        return LineEvent::Done;
    }

    data.get("response")
        .and_then(|r| r.as_str())
        .map_or(LineEvent::Skip, |t| LineEvent::Token(t.to_string()))
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    fn name(&self) -> &'static str {
        "Ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> bool {
        self.http_client
            .get(self.tags_url())
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .is_ok_and(|r| r.status().is_success())
    }

    async fn send_streaming(
        &self,
        request: &LlmRequest,
    ) -> anyhow::Result<mpsc::Receiver<StreamingToken>> {
        let response = self
            .http_client
            .post(self.generate_url())
            .json(&self.request_body(request))
            .send()
            .await?;

        // Check for HTTP errors
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama returned {status}: {body}");
        }

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(pump_lines(
            response.bytes_stream(),
            LineBuffer::new(),
            tx,
            classify_line,
        ));

        Ok(rx)
    }
}
