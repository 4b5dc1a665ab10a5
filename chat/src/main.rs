//! Zyron Chat - terminal client
//!
//! # Usage
//!
//! ```bash
//! # Interactive; Ctrl+C stops the current answer, Ctrl+C at the prompt exits
//! zyron-chat
//!
//! # One question, answer on stdout
//! zyron-chat "Explique-moi les closures en Rust"
//!
//! # Keep history on the server
//! zyron-chat --user-id u-42 --url https://zyron.example
//!
//! # Verbose logging (stderr)
//! RUST_LOG=zyron_core=debug zyron-chat
//! ```

mod printer;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use zyron_core::{
    load_config_from_path, ChatRequest, ConfigOverrides, FrameParser, HttpTransport,
    SessionController, SessionOutcome,
};

use printer::{write_output, Printer};

/// Zyron Chat - streams answers from a Zyron server
#[derive(Parser, Debug)]
#[command(name = "zyron-chat")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Message to send; omit for interactive mode
    message: Vec<String>,

    /// Zyron server base URL
    #[arg(short = 'u', long, value_name = "URL")]
    url: Option<String>,

    /// Bearer token (defaults to the variable named by client.auth_token_env)
    #[arg(short = 't', long, value_name = "TOKEN")]
    token: Option<String>,

    /// User id; enables server-side history
    #[arg(long, env = "ZYRON_USER_ID", value_name = "ID")]
    user_id: Option<String>,

    /// Continue an existing conversation
    #[arg(long, value_name = "UUID")]
    conversation: Option<Uuid>,

    /// Retries after a failed request
    #[arg(short = 'r', long, value_name = "N")]
    max_retries: Option<u32>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "ZYRON_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let mut config = load_config_from_path(args.config.clone())?;
    ConfigOverrides::new()
        .with_api_url(args.url.clone())
        .with_max_retries(args.max_retries)
        .apply(&mut config);
    config.validate()?;

    let token = args
        .token
        .clone()
        .or_else(|| std::env::var(&config.client.auth_token_env).ok());
    let transport = HttpTransport::from_settings(&config.client)?.with_auth_token(token);
    tracing::debug!(endpoint = transport.endpoint(), "chat client ready");

    let controller = SessionController::new(transport)
        .with_retry(config.client.retry.clone())
        .with_parser(FrameParser::new(config.client.malformed_frames));

    let (printer, rx) = Printer::channel();
    let writer = tokio::spawn(async move {
        let mut out = tokio::io::stdout();
        let mut err = tokio::io::stderr();
        write_output(rx, &mut out, &mut err).await
    });

    let session = Session {
        controller,
        printer,
        user_id: args.user_id.filter(|id| !id.trim().is_empty()),
    };

    let failed = if args.message.is_empty() {
        session.interactive(args.conversation).await?;
        false
    } else {
        let message = args.message.join(" ");
        !session.turn(&message, args.conversation).await
    };

    drop(session);
    writer.await??;

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

struct Session {
    controller: SessionController<HttpTransport>,
    printer: Printer,
    user_id: Option<String>,
}

impl Session {
    /// Send one message; Ctrl+C aborts the answer. Returns `false` on failure.
    async fn turn(&self, message: &str, conversation_id: Option<Uuid>) -> bool {
        let mut request = ChatRequest::new(message);
        if let Some(user_id) = &self.user_id {
            request = request.with_user(user_id.clone());
        }
        let request = request.with_conversation(conversation_id);

        let send = self.controller.send(request, &self.printer);
        tokio::pin!(send);

        let result = loop {
            tokio::select! {
                result = &mut send => break result,
                _ = tokio::signal::ctrl_c() => self.controller.abort(),
            }
        };

        match result {
            Ok(SessionOutcome::Completed(_) | SessionOutcome::Aborted { .. }) => true,
            Ok(SessionOutcome::Superseded) => false,
            Err(e) => {
                // Validation errors never reach the observer
                if matches!(e, zyron_core::SessionError::Validation(_)) {
                    self.printer.notice(e.to_string());
                }
                false
            }
        }
    }

    /// Read lines from stdin until EOF, `/quit` or Ctrl+C at the prompt
    async fn interactive(&self, mut conversation_id: Option<Uuid>) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            self.printer.prompt();
            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => None,
            };
            let Some(line) = line else {
                break;
            };

            let message = line.trim();
            if message.is_empty() {
                continue;
            }
            if message == "/quit" || message == "/exit" {
                break;
            }
            if message == "/new" {
                conversation_id = None;
                self.printer.notice("new conversation");
                continue;
            }

            self.turn(message, conversation_id).await;
            if self.user_id.is_some() {
                conversation_id = self.controller.conversation_id().or(conversation_id);
            }
        }

        Ok(())
    }
}
