//! splitwave-svc - heuristic instrument detection and track rendering service

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use splitwave_common::config::{ConfigOverrides, ServiceConfig};
use splitwave_svc::store::SessionStore;
use splitwave_svc::AppState;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for splitwave-svc
#[derive(Parser, Debug)]
#[command(name = "splitwave-svc")]
#[command(about = "Heuristic instrument detection and separation service")]
#[command(version)]
struct Args {
    /// Folder holding the session registry and artifacts
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Minutes of inactivity before a session is swept
    #[arg(long)]
    retention_minutes: Option<u64>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ServiceConfig::resolve(&ConfigOverrides {
        config_file: args.config,
        root_folder: args.root_folder,
        host: args.host,
        port: args.port,
        retention_minutes: args.retention_minutes,
    })
    .context("Failed to load configuration")?;

    let default_filter = format!("splitwave_svc={0},splitwave_common={0},tower_http=info", config.logging.level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting splitwave-svc v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE"),
    );
    info!("Root folder: {}", config.root_folder.display());
    info!(
        retention_minutes = config.retention_minutes,
        processing_timeout_seconds = config.processing_timeout_seconds,
        max_upload_bytes = config.max_upload_bytes,
        "Limits"
    );

    let store = SessionStore::open(&config)
        .await
        .context("Failed to open session store")?;

    let report = store.sweep(config.retention_minutes).await;
    info!(removed = report.removed.len(), orphans = report.orphans_removed, "Startup sweep done");

    let addr = config.bind_address();
    let app = splitwave_svc::build_router(AppState::new(store, config));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
