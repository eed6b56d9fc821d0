//! script-gateway CLI entry point.
//!
//! Loads configuration, applies command-line overrides, and runs the
//! gateway HTTP server.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use script_gateway_common::{ConfigFile, Strategy, StrategyConfig};
use script_gateway_server::{AppState, GatewayServer, ServerConfig};

/// URL-rewriting gateway in front of a script interpreter.
#[derive(Debug, Parser)]
#[command(name = "script-gateway", version, about)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Document root (overrides `gateway.docroot`).
    #[arg(short, long, env = "GATEWAY_DOCROOT")]
    docroot: Option<PathBuf>,

    /// Rewrite strategy name (overrides `gateway.rewrite`).
    #[arg(short, long, env = "GATEWAY_REWRITE")]
    rewrite: Option<String>,

    /// Bind address (overrides `server.bind_addr`).
    #[arg(short, long, env = "BIND_ADDR")]
    bind: Option<SocketAddr>,

    /// Interpreter executable (overrides `interpreter.program`).
    #[arg(short, long, env = "GATEWAY_INTERPRETER")]
    interpreter: Option<String>,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "LOG_FORMAT")]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,script_gateway=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_format);

    info!("Starting script-gateway");

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => ConfigFile::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ConfigFile::default(),
    };

    if let Some(docroot) = cli.docroot {
        config.gateway.docroot = Some(docroot);
    }
    if let Some(rewrite) = cli.rewrite {
        config.gateway.rewrite = Some(StrategyConfig::Named(rewrite));
    }
    if let Some(program) = cli.interpreter {
        config.interpreter.program = program;
    }

    let mut server_config =
        ServerConfig::from_file(&config.server).context("Invalid [server] configuration")?;
    if let Some(bind) = cli.bind {
        server_config = server_config.with_bind_addr(bind);
    }

    let state = AppState::from_config(&config.gateway, &config.interpreter)
        .context("Invalid gateway configuration")?;

    info!(
        docroot = %state.docroot().display(),
        strategy = state.rewriter().strategy().map_or("direct", Strategy::as_str),
        interpreter = %config.interpreter.program,
        bind_addr = %server_config.bind_addr,
        "Configuration loaded"
    );

    info!("Reserved endpoints:");
    info!("  GET  /_gateway/health     - Health check");
    info!("  GET  /_gateway/ready      - Readiness check");
    info!("  GET  /_gateway/scripts    - List cached scripts");

    let server = GatewayServer::bind(state, &server_config)
        .await
        .context("Failed to start server")?;
    server.run().await.context("Server failed")?;

    Ok(())
}
