//! temporal-mcp - MCP server for Temporal workflow histories

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;

use temporal_mcp::config::{AppConfig, DEFAULT_CONFIG_FILE};
use temporal_mcp::logging::{LogFormat, OpTimer, init_tracing};
use temporal_mcp::mcp::{http::serve_http, stdio::serve_stdio};
use temporal_mcp::{TemporalHttpBackend, build_server};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    /// Newline-delimited JSON-RPC on stdin/stdout.
    Stdio,
    /// JSON-RPC over `POST /mcp`.
    Http,
}

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "temporal-mcp")]
#[command(about = "MCP server exposing Temporal workflow histories")]
#[command(version)]
struct Args {
    /// Transport to serve MCP on.
    #[arg(long, env = "MCP_TRANSPORT", value_enum, default_value = "stdio")]
    transport: Transport,

    /// Log level, used when RUST_LOG is unset.
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log_level: String,

    /// Log format: pretty or json.
    #[arg(long, env = "LOG_FORMAT", default_value = "pretty")]
    log_format: LogFormat,

    /// Config file path, with or without extension.
    #[arg(short, long, env = "TEMPORAL_MCP_CONFIG")]
    config: Option<String>,

    /// History-reading guide served to clients.
    #[arg(long)]
    instructions: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is not an error.
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    init_tracing(&args.log_level, args.log_format);
    tracing::info!("Starting temporal-mcp v{}", env!("CARGO_PKG_VERSION"));

    let timer = OpTimer::new("config", "load");
    let mut config = AppConfig::load_from(Some(
        args.config.as_deref().unwrap_or(DEFAULT_CONFIG_FILE),
    ))
    .context("failed to load configuration")?;
    if let Some(path) = args.instructions {
        config.instructions_path = Some(path);
    }
    let instructions: Arc<str> = config.load_instructions()?.into();
    timer.finish();

    let backend = TemporalHttpBackend::from_config(&config.temporal)
        .context("failed to create Temporal client")?;
    tracing::info!(
        address = %config.temporal.address,
        namespace = %config.temporal.namespace,
        "Temporal backend configured"
    );

    let shutdown = CancellationToken::new();
    let server = Arc::new(build_server(
        &config,
        Arc::new(backend),
        instructions,
        shutdown.clone(),
    ));

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    match args.transport {
        Transport::Stdio => serve_stdio(server, shutdown).await?,
        Transport::Http => serve_http(server, &config.server.bind_address(), shutdown).await?,
    }

    tracing::info!("Server shut down gracefully");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        }
    }
}
