//! Satchel server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use satchel_core::config::AppConfig;
use satchel_server::{AppState, create_router};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long the panic hook waits for staged archives to be released.
const PANIC_CLEANUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Satchel - signed blob and archive-entry download gateway
#[derive(Parser, Debug)]
#[command(name = "satcheld")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "SATCHEL_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Satchel v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    satchel_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let storage = satchel_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    tracing::info!(backend = storage.backend_name(), "Storage backend initialized");

    // Fail before accepting requests if the store is unreachable
    storage
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!("Storage backend connectivity verified");

    let sweep_interval = config.mounts.sweep_interval();
    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;

    let state = AppState::build(config, storage)
        .await
        .context("failed to initialize mount cache")?;

    // Staged archives must not outlive the process, even on panic
    let mounts = state.mounts.clone();
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_hook(info);
        // The panicking thread may hold a registry shard; never wait forever
        match mounts.shutdown_within(PANIC_CLEANUP_TIMEOUT) {
            Some(destroyed) => {
                eprintln!("satcheld: panic, released {destroyed} mounted archives")
            }
            None => eprintln!("satcheld: panic, mount registry locked, exiting without cleanup"),
        }
        std::process::exit(1);
    }));

    let sweeper = state.mounts.clone().spawn_sweeper(sweep_interval);
    tracing::info!(
        interval_secs = sweep_interval.as_secs(),
        "Mount sweeper spawned"
    );

    let mounts = state.mounts.clone();
    let app = create_router(state);

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    sweeper.abort();
    let destroyed = mounts.shutdown();
    tracing::info!(destroyed, "Mount cache shut down");

    served.context("server error")
}

/// Load configuration from the optional TOML file and `SATCHEL_` env vars.
fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();

    if std::path::Path::new(path).exists() {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("No config file found at {}", path);
    }

    let has_env_config =
        std::env::vars().any(|(key, _)| key.starts_with("SATCHEL_") && key != "SATCHEL_CONFIG");
    if !has_env_config && !std::path::Path::new(path).exists() {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: satcheld --config /path/to/config.toml\n  \
             2. Environment variables: SATCHEL_AUTH__SECRET=... \
             SATCHEL_STORAGE__TYPE=filesystem SATCHEL_STORAGE__PATH=/var/lib/satchel satcheld\n\n\
             See config/server.example.toml for example configuration."
        );
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("SATCHEL_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    Ok(config)
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", err);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!("failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
