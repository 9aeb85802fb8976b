use std::net::IpAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use parley::agent::{Agent, AgentKind};
use parley::auth::StaticTokenAuthenticator;
use parley::chat::ChatService;
use parley::config::Config;
use parley::llm::{FallbackPolicy, ProviderFactory};
use parley::registry::ConnectionRegistry;
use parley::server::{self, AppState};
use parley::store::MemoryStore;

// ============================================================================
// CLI Types
// ============================================================================

/// Parley - a self-hosted chat orchestration server
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Path to configuration file
        #[arg(short, long, default_value = "parley.yaml")]
        config: String,

        /// Host to bind to (overrides config file)
        #[arg(long)]
        host: Option<IpAddr>,

        /// Port to listen on (overrides config file)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> std::process::ExitCode {
    init_tracing();

    match run().await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, host, port } => serve(&config, host, port).await,
    }
}

async fn serve(config_path: &str, host: Option<IpAddr>, port: Option<u16>) -> Result<()> {
    let config = Config::load(config_path)
        .await
        .with_context(|| format!("loading '{config_path}'"))?;

    let host = host
        .map(|h| h.to_string())
        .unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    let policy = if config.llm.strict_credentials {
        FallbackPolicy::Strict
    } else {
        FallbackPolicy::AvailabilityOverStrictness
    };
    let factory = Arc::new(
        ProviderFactory::new(policy)
            .with_mock_delay(std::time::Duration::from_millis(config.llm.mock_delay_ms)),
    );

    let persona = match config.chat.agent.as_deref() {
        Some(name) => name
            .parse::<AgentKind>()
            .map_err(|e| anyhow::anyhow!(e))
            .context("invalid chat.agent")?,
        None => AgentKind::default(),
    };

    let store = Arc::new(MemoryStore::new());
    let agent = Agent::new(persona, factory, store.clone());
    let chat = ChatService::new(store.clone(), agent);

    let state = AppState {
        store,
        chat,
        connections: Arc::new(ConnectionRegistry::new()),
        auth: Arc::new(StaticTokenAuthenticator::from_config(&config.auth)),
        keep_alive_interval_seconds: config.server.keep_alive_interval_seconds,
    };

    let app = server::build_app(state, config.server.request_timeout_seconds);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(addr = %addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

// ============================================================================
// Initialization
// ============================================================================

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
