//! # Argus Server
//!
//! Admission and orchestration backend for an OSINT scan dashboard.
//!
//! ## Overview
//!
//! The server sits between a browser dashboard and a set of external
//! data collectors and provides:
//!
//! - **Admission control**: per-account rate limiting and atomic credit
//!   reservation before any work is queued
//! - **Orchestration**: a fixed worker pool driving collectors with
//!   retry, timeout, and cooperative cancellation policy
//! - **Observability of work**: task lifecycle via polling and live
//!   WebSocket push, both backed by the same task store
//!
//! ## Architecture
//!
//! The server is built on Axum and keeps all state in process: the
//! ledger, rate limiter, task store, and notifier are the in-memory
//! components of `argus-core`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use argus_config::{Config, ConfigLoad, ConfigLoader};
use argus_server::{collectors, infra::wiring, routes};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "argus-server")]
#[command(about = "OSINT scan admission and orchestration server")]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, env = "ARGUS_CONFIG")]
    config: Option<PathBuf>,

    /// Server port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long)]
    host: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let env_file_loaded = dotenvy::dotenv().is_ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    // Quieter defaults; override via RUST_LOG.
                    "info,tower_http=warn".into()
                }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_runtime_config(&cli, env_file_loaded)?;

    let registry = Arc::new(collectors::default_registry());
    info!(
        collectors = registry.list().len(),
        workers = config.dispatcher.workers,
        rate_limit = config.admission.rate_limit,
        rate_window = ?config.admission.rate_window,
        terminal_ttl = ?config.retention.terminal_ttl,
        "orchestration configuration in effect"
    );

    let state = wiring::wire_app_state(config.clone(), registry);
    let app = routes::create_router(state);

    let addr: SocketAddr =
        format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .context("invalid server host/port")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutdown complete");
    Ok(())
}

fn load_runtime_config(
    cli: &Cli,
    env_file_loaded: bool,
) -> anyhow::Result<Arc<Config>> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_path(path);
    }
    let ConfigLoad {
        mut config,
        warnings,
    } = loader.load().context("failed to load configuration")?;

    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(host) = cli.host.clone() {
        config.server.host = host;
    }
    config.metadata.env_file_loaded = env_file_loaded;

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "configuration loaded from file");
    }
    for warning in &warnings.items {
        match &warning.hint {
            Some(hint) => {
                warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => warn!(message = %warning.message, "configuration warning"),
        }
    }

    Ok(Arc::new(config))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown signal received, draining");
}
