//! Zyron Server - streaming chat endpoint
//!
//! # Usage
//!
//! ```bash
//! # Anthropic (reads ANTHROPIC_API_KEY)
//! zyron-server
//!
//! # Local Ollama on another port
//! zyron-server --provider ollama --model llama3.2 --bind 0.0.0.0:8080
//!
//! # With config file, JSON logs
//! zyron-server --config /etc/zyron/zyron.toml --log-json
//!
//! # Verbose logging
//! RUST_LOG=debug zyron-server
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Graceful shutdown

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use zyron_core::{
    backend, load_config_from_path, ConfigOverrides, InMemoryConversationStore, ProviderKind,
};
use zyron_server::{build, AppState};

/// Zyron Server - streams chat answers over text/event-stream
#[derive(Parser, Debug)]
#[command(name = "zyron-server")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "ZYRON_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Socket address to listen on
    #[arg(short = 'b', long, value_name = "ADDR")]
    bind: Option<String>,

    /// Comma-separated allowed CORS origins
    #[arg(long, value_name = "ORIGINS")]
    cors_origins: Option<String>,

    /// Text-generation provider (anthropic, ollama, echo)
    #[arg(short = 'p', long, value_name = "KIND")]
    provider: Option<ProviderKind>,

    /// Model identifier
    #[arg(short = 'm', long, value_name = "MODEL")]
    model: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config_from_path(args.config.clone())?;
    ConfigOverrides::new()
        .with_bind_address(args.bind)
        .with_cors_allowed_origins(args.cors_origins)
        .with_provider(args.provider)
        .with_model(args.model)
        .with_log_json(args.log_json)
        .apply(&mut config);
    config.validate()?;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,zyron_server=info,zyron_core=info,tower_http=info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);
    if config.server.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        source = %config.source(),
        "zyron-server starting"
    );

    let backend = backend::from_settings(&config.provider)?;
    let store = Arc::new(InMemoryConversationStore::new());

    let addr = config.server.bind_address.clone();
    let state = AppState::new(config.server, config.provider, backend, store);
    let app = build(state);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("zyron-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received");
}
