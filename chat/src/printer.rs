//! Terminal output for a chat session
//!
//! [`Printer`] is the session observer. Its callbacks are synchronous, so it
//! only queues [`Output`] events; [`write_output`] drains the queue on its own
//! task with async writes. Answer text goes to stdout and notices to stderr,
//! so `zyron-chat "question" > answer.txt` captures only the answer.

use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use zyron_core::{SessionError, SessionObserver, TransportError};

/// One thing to show
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Answer text, printed as-is
    Fragment(String),
    /// The answer is finished
    EndOfAnswer,
    /// Status line for stderr
    Notice(String),
    /// Input prompt
    Prompt,
}

/// Session observer that queues terminal output
#[derive(Debug, Clone)]
pub struct Printer {
    tx: mpsc::UnboundedSender<Output>,
}

impl Printer {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Output>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn prompt(&self) {
        self.emit(Output::Prompt);
    }

    pub fn notice(&self, text: impl Into<String>) {
        self.emit(Output::Notice(text.into()));
    }

    fn emit(&self, output: Output) {
        // The writer only goes away at shutdown
        let _ = self.tx.send(output);
    }
}

impl SessionObserver for Printer {
    fn on_fragment(&self, fragment: &str) {
        self.emit(Output::Fragment(fragment.to_owned()));
    }

    fn on_complete(&self, _response: &str) {
        self.emit(Output::EndOfAnswer);
    }

    fn on_error(&self, error: &SessionError) {
        self.notice(format!("error: {error}"));
    }

    fn on_retry(&self, attempt: u32, delay: Duration, error: &TransportError) {
        self.notice(format!(
            "{error}; retrying in {:.1}s (attempt {attempt})",
            delay.as_secs_f32()
        ));
    }

    fn on_abort(&self) {
        self.notice("stopped");
    }
}

/// Drain queued output until every [`Printer`] is dropped
pub async fn write_output<O, E>(
    mut rx: mpsc::UnboundedReceiver<Output>,
    out: &mut O,
    err: &mut E,
) -> std::io::Result<()>
where
    O: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    let mut mid_line = false;

    while let Some(output) = rx.recv().await {
        match output {
            Output::Fragment(text) => {
                if text.is_empty() {
                    continue;
                }
                out.write_all(text.as_bytes()).await?;
                out.flush().await?;
                mid_line = !text.ends_with('\n');
            }
            Output::EndOfAnswer => {
                if mid_line {
                    out.write_all(b"\n").await?;
                    out.flush().await?;
                    mid_line = false;
                }
            }
            Output::Notice(text) => {
                if mid_line {
                    out.write_all(b"\n").await?;
                    out.flush().await?;
                    mid_line = false;
                }
                err.write_all(format!("[{text}]\n").as_bytes()).await?;
                err.flush().await?;
            }
            Output::Prompt => {
                out.write_all(b"> ").await?;
                out.flush().await?;
            }
        }
    }

    Ok(())
}
