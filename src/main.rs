//! claude-relay: OpenAI-compatible chat completions in front of the Claude CLI.
//!
//! `serve` starts the relay server; `check` verifies the CLI binary is
//! reachable and exits.

use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use claude_relay::backend::cli::ClaudeCli;
use claude_relay::config::{Cli, Command, Config, ServeArgs};
use claude_relay::server::openai_api::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Check { claude_path } => check(claude_path),
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    // Initialize tracing/logging.
    let filter = if args.verbose {
        "claude_relay=debug,tower_http=debug"
    } else {
        "claude_relay=info,tower_http=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .init();

    info!("claude-relay v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration and apply flag/env overrides.
    let mut config = Config::load(&args.config)?;
    config.apply_overrides(&args);
    let config = Arc::new(config);

    info!(
        listen = %config.server.listen,
        cli_path = %config.backend.cli_path,
        timeout_secs = config.backend.timeout_secs,
        aliases = config.models.len(),
        "Configuration loaded"
    );

    // Locate the CLI. A missing binary leaves the relay serving in a
    // degraded state: health reports it, completions return 503.
    let backend = match ClaudeCli::new(&config.backend) {
        Ok(backend) => {
            info!(path = %backend.path().display(), "Claude CLI found");
            Some(backend)
        }
        Err(e) => {
            warn!("{e}");
            None
        }
    };

    // Build application state and the HTTP router.
    let state = Arc::new(AppState {
        config: config.clone(),
        backend,
        start_time: Instant::now(),
    });
    let app = build_router(state);

    // Start the server.
    let listen_addr = config.server.listen.clone();
    info!(addr = %listen_addr, "Starting server");

    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Chat endpoint: http://{listen_addr}/v1/chat/completions");

    axum::serve(listener, app).await?;

    Ok(())
}

fn check(claude_path: Option<String>) -> anyhow::Result<()> {
    let configured = claude_path
        .or_else(|| std::env::var("CLAUDE_CLI_PATH").ok().filter(|p| !p.is_empty()))
        .unwrap_or_else(|| "claude".to_string());

    match ClaudeCli::locate(&configured) {
        Some(path) => {
            println!("Claude CLI: {}", path.display());
            println!("Status: OK");
            Ok(())
        }
        None => anyhow::bail!(
            "Claude CLI not found at '{configured}'; install it or set CLAUDE_CLI_PATH"
        ),
    }
}
