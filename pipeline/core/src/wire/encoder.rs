//! Wire Encoder
//!
//! Bridges an upstream token stream to an SSE response body. Each token is
//! JSON-encoded so that newlines, quotes and control characters cannot break
//! the line-oriented framing.
//!
//! # Frame Format
//!
//! ```text
//! data: "Hello"\n\n            <- text fragment (JSON string)
//! data: {"error":"..."}\n\n    <- final frame after an upstream failure
//! ```
//!
//! A successful stream ends with the connection closing; there is no
//! terminator frame.

use bytes::Bytes;
use futures::Stream;
use serde_json::json;
use tokio::sync::mpsc;

use super::{ERROR_FIELD, FRAME_PREFIX, FRAME_TERMINATOR};
use crate::backend::StreamingToken;

/// Encode one text fragment as a frame
#[must_use]
pub fn encode_fragment(text: &str) -> String {
    // Serializing a &str cannot fail
    let payload = serde_json::to_string(text).unwrap_or_default();
    format!("{FRAME_PREFIX}{payload}{FRAME_TERMINATOR}")
}

/// Encode an upstream failure as the final in-band frame
#[must_use]
pub fn encode_error(message: &str) -> String {
    let payload = json!({ ERROR_FIELD: message });
    format!("{FRAME_PREFIX}{payload}{FRAME_TERMINATOR}")
}

/// Stateless frame encoder
#[derive(Debug, Default)]
pub struct FrameEncoder;

impl FrameEncoder {
    /// Create a new encoder
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Encode a backend token into the bytes of one frame
    ///
    /// Returns `None` for tokens that produce no output: empty text and the
    /// completion marker.
    #[must_use]
    pub fn encode(&self, token: &StreamingToken) -> Option<Bytes> {
        match token {
            StreamingToken::Token(text) if text.is_empty() => None,
            StreamingToken::Token(text) => Some(Bytes::from(encode_fragment(text))),
            StreamingToken::Error(message) => Some(Bytes::from(encode_error(message))),
            StreamingToken::Complete { .. } => None,
        }
    }
}

/// Convert a backend token channel into an SSE body stream
///
/// The stream ends after the first `Complete` or `Error` token, or when the
/// sender is dropped. An `Error` token becomes one final error frame.
pub fn frame_stream(
    rx: mpsc::Receiver<StreamingToken>,
) -> impl Stream<Item = Result<Bytes, std::convert::Infallible>> + Send + 'static {
    futures::stream::unfold(Some(rx), |state| async move {
        let mut rx = state?;
        let encoder = FrameEncoder::new();
        loop {
            let token = rx.recv().await?;
            let terminal = !matches!(token, StreamingToken::Token(_));
            match encoder.encode(&token) {
                Some(bytes) => {
                    let next = if terminal { None } else { Some(rx) };
                    return Some((Ok(bytes), next));
                }
                None if terminal => return None,
                None => continue,
            }
        }
    })
}
