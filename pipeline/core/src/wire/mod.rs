//! SSE Wire Codec
//!
//! The chat endpoint streams assistant text as server-sent events. Every text
//! delta becomes one frame whose payload is a JSON-encoded string:
//!
//! ```text
//!   Server                                           Client
//!   ──────                                           ──────
//!   token "Hi\n"  ──► encoder ──► data: "Hi\n"\n\n ──► reader ──► parser ──► "Hi\n"
//!                                  (bytes may be split anywhere in transit)
//! ```
//!
//! - [`encoder`]: backend tokens to frame bytes (server side)
//! - [`reader`]: response body bytes to complete lines (client side)
//! - [`parser`]: one line to a [`Frame`] (client side)
//!
//! A structured payload, a JSON object with a `text` field, is accepted as an
//! alternative to the bare string. An object with an `error` field is the
//! in-band failure frame written after an upstream error.

pub mod encoder;
pub mod parser;
pub mod reader;

pub use encoder::{encode_error, encode_fragment, frame_stream, FrameEncoder};
pub use parser::{Frame, FrameParser, MalformedFramePolicy};
pub use reader::{FrameReader, LineBuffer};

/// Prefix of every frame line
pub const FRAME_PREFIX: &str = "data: ";

/// Blank line that terminates a frame
pub const FRAME_TERMINATOR: &str = "\n\n";

/// Text field of a structured payload
pub const TEXT_FIELD: &str = "text";

/// Error field of the in-band failure payload
pub const ERROR_FIELD: &str = "error";

/// Media type of the streaming response
pub const SSE_CONTENT_TYPE: &str = "text/event-stream";

/// Cache policy of the streaming response
pub const SSE_CACHE_CONTROL: &str = "no-cache, no-transform";
