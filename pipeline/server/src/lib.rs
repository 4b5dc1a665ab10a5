//! Zyron Server
//!
//! HTTP front end for the streaming chat pipeline. `POST /chat` hands the
//! message to the configured [`zyron_core::LlmBackend`] and streams the answer
//! back as `data: "<fragment>"` frames. Authenticated callers (those that
//! send a `user_id`) get their turns stored and replayed as context.
//!
//! ```text
//! POST /chat ──► validate ──► store.get_or_create ──► backend.send_streaming
//!                                                          │
//!                          persist_on_complete ◄───────────┘
//!                                   │
//!                          frame_stream ──► text/event-stream body
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cors;
pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::build;
pub use state::AppState;
