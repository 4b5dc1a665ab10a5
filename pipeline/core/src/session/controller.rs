//! Session Controller
//!
//! Drives one chat turn: open the stream, read lines, parse frames,
//! accumulate the response and report progress to a [`SessionObserver`].
//! Transport failures are retried with exponential backoff. Every suspension
//! point (connect, next body chunk, backoff delay) races the session's
//! cancellation token, so an abort takes effect at the next poll.

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{
    ChatRequest, ChatTransport, RetryPolicy, SessionError, SessionObserver, SessionOutcome,
    SessionState, TransportError,
};
use crate::wire::{Frame, FrameParser, FrameReader};

/// Mutable bookkeeping for the current session
#[derive(Debug, Default)]
struct ActiveSession {
    /// Incremented by every `send`; stale sessions compare against it
    generation: u64,
    state: SessionState,
    token: CancellationToken,
    error: Option<String>,
    conversation_id: Option<Uuid>,
    /// Generation hit by the last `abort`, kept after a newer `send` starts
    aborted: Option<u64>,
}

/// Result of one attempt
enum Attempt {
    Completed,
    Cancelled,
    Transport(TransportError),
    Upstream(String),
}

/// Owns at most one in-flight chat session
pub struct SessionController<T> {
    transport: T,
    retry: RetryPolicy,
    parser: FrameParser,
    active: Mutex<ActiveSession>,
}

impl<T: ChatTransport> SessionController<T> {
    /// Create a controller with the default retry policy and frame parser
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            retry: RetryPolicy::default(),
            parser: FrameParser::default(),
            active: Mutex::new(ActiveSession::default()),
        }
    }

    /// Set the retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the frame parser
    #[must_use]
    pub fn with_parser(mut self, parser: FrameParser) -> Self {
        self.parser = parser;
        self
    }

    /// The underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.active.lock().state
    }

    /// Whether a request is in flight (including backoff waits)
    pub fn is_loading(&self) -> bool {
        self.active.lock().state.is_active()
    }

    /// Error text of the last failed session, cleared by the next `send`
    pub fn error(&self) -> Option<String> {
        self.active.lock().error.clone()
    }

    /// Conversation id most recently reported by the server
    pub fn conversation_id(&self) -> Option<Uuid> {
        self.active.lock().conversation_id
    }

    /// Cancel the in-flight session
    ///
    /// Stops the body read or pending retry promptly. Calling it again, or
    /// with nothing in flight, does nothing.
    pub fn abort(&self) {
        let mut active = self.active.lock();
        if active.state.is_active() {
            active.state = SessionState::Aborted;
            active.aborted = Some(active.generation);
            active.token.cancel();
            tracing::info!(generation = active.generation, "Session aborted");
        }
    }

    /// Send a message and stream the response into `observer`
    ///
    /// Any session still in flight is cancelled first and ends silently.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Validation`] if the message is blank; nothing is
    ///   sent and the observer is not called.
    /// - [`SessionError::Transport`] once retries are exhausted or the
    ///   failure is not retryable.
    /// - [`SessionError::Upstream`] if the server reports a provider failure
    ///   in the stream.
    pub async fn send(
        &self,
        request: ChatRequest,
        observer: &dyn SessionObserver,
    ) -> Result<SessionOutcome, SessionError> {
        if request.message.trim().is_empty() {
            return Err(SessionError::Validation("Message is required".to_string()));
        }

        let (generation, token) = self.begin();
        let mut attempt: u32 = 0;

        loop {
            let mut buffer = String::new();

            let error = match self
                .run_attempt(&request, generation, &token, observer, &mut buffer)
                .await
            {
                Attempt::Completed => {
                    if !self.transition(generation, SessionState::Completed) {
                        return Ok(self.cancelled(generation, observer, buffer));
                    }
                    tracing::debug!(generation, len = buffer.len(), "Session completed");
                    observer.on_complete(&buffer);
                    return Ok(SessionOutcome::Completed(buffer));
                }
                Attempt::Cancelled => return Ok(self.cancelled(generation, observer, buffer)),
                Attempt::Upstream(message) => SessionError::Upstream(message),
                Attempt::Transport(error) => {
                    if attempt < self.retry.max_retries && self.retry.should_retry(&error) {
                        let delay = self.retry.backoff_for_attempt(attempt);
                        attempt += 1;

                        if !self.transition(generation, SessionState::Sending) {
                            return Ok(self.cancelled(generation, observer, String::new()));
                        }
                        tracing::warn!(
                            generation,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "Chat request failed, retrying"
                        );
                        observer.on_retry(attempt, delay, &error);

                        tokio::select! {
                            biased;
                            () = token.cancelled() => {
                                return Ok(self.cancelled(generation, observer, String::new()));
                            }
                            () = tokio::time::sleep(delay) => {}
                        }
                        continue;
                    }
                    SessionError::Transport(error)
                }
            };

            if !self.fail(generation, &error) {
                return Ok(self.cancelled(generation, observer, buffer));
            }
            tracing::warn!(generation, attempts = attempt + 1, error = %error, "Session failed");
            observer.on_error(&error);
            return Err(error);
        }
    }

    /// One request/response cycle
    async fn run_attempt(
        &self,
        request: &ChatRequest,
        generation: u64,
        token: &CancellationToken,
        observer: &dyn SessionObserver,
        buffer: &mut String,
    ) -> Attempt {
        let opened = tokio::select! {
            biased;
            () = token.cancelled() => return Attempt::Cancelled,
            opened = self.transport.open(request) => opened,
        };

        let opened = match opened {
            Ok(opened) => opened,
            Err(e) => return Attempt::Transport(e),
        };

        if !self.streaming(generation, opened.conversation_id) {
            return Attempt::Cancelled;
        }

        let mut reader = FrameReader::new(opened.body);
        loop {
            let line = tokio::select! {
                biased;
                () = token.cancelled() => return Attempt::Cancelled,
                line = reader.next_line() => line,
            };

            let line = match line {
                None => return Attempt::Completed,
                Some(Err(e)) => return Attempt::Transport(e),
                Some(Ok(line)) => line,
            };

            match self.parser.parse_line(&line) {
                Some(Frame::Fragment(text)) => {
                    if token.is_cancelled() {
                        return Attempt::Cancelled;
                    }
                    buffer.push_str(&text);
                    observer.on_fragment(&text);
                }
                Some(Frame::Error(message)) => return Attempt::Upstream(message),
                None => {}
            }
        }
    }

    /// Start a new session, cancelling the previous one
    fn begin(&self) -> (u64, CancellationToken) {
        let mut active = self.active.lock();
        if active.state.is_active() {
            active.token.cancel();
            tracing::debug!(generation = active.generation, "Superseding in-flight session");
        }

        active.generation += 1;
        active.token = CancellationToken::new();
        active.state = SessionState::Sending;
        active.error = None;
        (active.generation, active.token.clone())
    }

    /// Move the current session to `state`
    ///
    /// Returns false if the session was superseded or aborted meanwhile.
    fn transition(&self, generation: u64, state: SessionState) -> bool {
        let mut active = self.active.lock();
        if active.generation != generation || active.token.is_cancelled() {
            return false;
        }
        active.state = state;
        true
    }

    fn streaming(&self, generation: u64, conversation_id: Option<Uuid>) -> bool {
        let mut active = self.active.lock();
        if active.generation != generation || active.token.is_cancelled() {
            return false;
        }
        active.state = SessionState::Streaming;
        if conversation_id.is_some() {
            active.conversation_id = conversation_id;
        }
        true
    }

    fn fail(&self, generation: u64, error: &SessionError) -> bool {
        let mut active = self.active.lock();
        if active.generation != generation || active.token.is_cancelled() {
            return false;
        }
        active.state = SessionState::Failed;
        active.error = Some(error.to_string());
        true
    }

    /// Resolve a cancelled session as either aborted or superseded
    ///
    /// An aborted session reports the abort even when a newer `send` has
    /// already started.
    fn cancelled(
        &self,
        generation: u64,
        observer: &dyn SessionObserver,
        partial: String,
    ) -> SessionOutcome {
        let aborted = self.active.lock().aborted == Some(generation);
        if aborted {
            observer.on_abort();
            SessionOutcome::Aborted { partial }
        } else {
            tracing::debug!(generation, "Superseded session ended");
            SessionOutcome::Superseded
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{NoopObserver, OpenedStream};
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::StreamExt;

    struct StaticTransport(&'static str);

    #[async_trait]
    impl ChatTransport for StaticTransport {
        async fn open(&self, _request: &ChatRequest) -> Result<OpenedStream, TransportError> {
            let chunk: Result<Bytes, TransportError> = Ok(Bytes::from_static(self.0.as_bytes()));
            Ok(OpenedStream::new(futures::stream::iter(vec![chunk]).boxed()))
        }
    }

    #[tokio::test]
    async fn test_state_after_completion() {
        let controller = SessionController::new(StaticTransport("data: \"ok\"\n\n"));
        assert_eq!(controller.state(), SessionState::Idle);

        let outcome = controller
            .send(ChatRequest::new("ping"), &NoopObserver)
            .await
            .unwrap();

        assert_eq!(outcome, SessionOutcome::Completed("ok".into()));
        assert_eq!(controller.state(), SessionState::Completed);
        assert!(!controller.is_loading());
        assert!(controller.error().is_none());
    }

    #[tokio::test]
    async fn test_abort_when_idle_is_noop() {
        let controller = SessionController::new(StaticTransport(""));
        controller.abort();
        controller.abort();
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_upstream_error_sets_error_text() {
        let controller =
            SessionController::new(StaticTransport("data: \"par\"\n\ndata: {\"error\":\"overloaded\"}\n\n"));

        let result = controller.send(ChatRequest::new("ping"), &NoopObserver).await;

        assert!(matches!(result, Err(SessionError::Upstream(ref m)) if m == "overloaded"));
        assert_eq!(controller.state(), SessionState::Failed);
        assert_eq!(controller.error(), Some("overloaded".to_string()));
    }
}
