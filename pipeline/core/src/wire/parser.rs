//! Frame Parser
//!
//! Turns one complete line into a text fragment, an in-band error, or
//! nothing. Parsing never fails: a payload that is not valid JSON degrades
//! according to [`MalformedFramePolicy`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ERROR_FIELD, FRAME_PREFIX, TEXT_FIELD};

/// Result of parsing one frame line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// A piece of assistant text
    Fragment(String),
    /// The server reported an upstream failure after streaming began
    Error(String),
}

/// What to do with a `data: ` line whose payload is not valid JSON
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedFramePolicy {
    /// Emit the raw payload text as a fragment (legacy servers sent plain text)
    #[default]
    Passthrough,
    /// Log the payload and emit nothing
    Drop,
}

impl std::str::FromStr for MalformedFramePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "passthrough" => Ok(Self::Passthrough),
            "drop" => Ok(Self::Drop),
            other => Err(format!("unknown malformed frame policy: {other}")),
        }
    }
}

/// Stateless line parser
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameParser {
    policy: MalformedFramePolicy,
}

impl FrameParser {
    /// Create a parser with the given malformed-frame policy
    #[must_use]
    pub fn new(policy: MalformedFramePolicy) -> Self {
        Self { policy }
    }

    /// The configured malformed-frame policy
    #[must_use]
    pub fn policy(&self) -> MalformedFramePolicy {
        self.policy
    }

    /// Parse one complete line
    ///
    /// Lines without the `data: ` prefix (blank separators, comments,
    /// keep-alives) yield `None`, as do empty fragments.
    #[must_use]
    pub fn parse_line(&self, line: &str) -> Option<Frame> {
        let payload = line.strip_prefix(FRAME_PREFIX)?;

        match serde_json::from_str::<Value>(payload) {
            Ok(Value::String(text)) => non_empty(text).map(Frame::Fragment),
            Ok(Value::Object(map)) => {
                if let Some(error) = map.get(ERROR_FIELD) {
                    let message = match error {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    return Some(Frame::Error(message));
                }
                map.get(TEXT_FIELD)
                    .and_then(Value::as_str)
                    .and_then(|text| non_empty(text.to_string()))
                    .map(Frame::Fragment)
            }
            Ok(Value::Null) => None,
            // Numbers, booleans and arrays are not produced by the encoder;
            // keep their literal text rather than losing it.
            Ok(_) => non_empty(payload.to_string()).map(Frame::Fragment),
            Err(e) => self.malformed(payload, &e),
        }
    }

    fn malformed(&self, payload: &str, error: &serde_json::Error) -> Option<Frame> {
        match self.policy {
            MalformedFramePolicy::Passthrough => {
                tracing::debug!(error = %error, len = payload.len(), "Frame is not JSON, passing raw text through");
                non_empty(payload.to_string()).map(Frame::Fragment)
            }
            MalformedFramePolicy::Drop => {
                tracing::warn!(error = %error, payload = %truncate(payload, 80), "Dropping malformed frame");
                None
            }
        }
    }
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
