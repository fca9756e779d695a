//! crm-import - bulk record import service
//!
//! Accepts CSV uploads of customers or leads, previews them, and submits
//! each row to the CRM REST API with live progress over SSE.

use anyhow::{Context, Result};
use clap::Parser;
use crm_common::config::ConfigResolver;
use crm_common::events::EventBus;
use crm_import::services::HttpRecordStore;
use crm_import::AppState;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const MODULE_NAME: &str = "crm-import";

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "crm-import")]
#[command(about = "Bulk customer and lead import service for the CRM")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Configuration is needed for the log level, so it loads before tracing
    let config = ConfigResolver::new(MODULE_NAME)
        .load(args.config.as_deref())
        .context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "crm_import={level},crm_common={level},tower_http={level}",
                    level = config.logging.level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting {} v{}", MODULE_NAME, env!("CARGO_PKG_VERSION"));
    info!("Remote store: {}", config.remote.base_url);

    let store = HttpRecordStore::new(&config.remote)
        .map_err(|e| anyhow::anyhow!("Failed to create record store client: {}", e))?;

    let event_bus = EventBus::new(config.events.capacity);
    info!("Event bus initialized (capacity {})", config.events.capacity);

    let retention = Duration::from_secs(config.sessions.retention_seconds);
    let state = AppState::new(event_bus, Arc::new(store)).with_session_retention(retention);
    info!("Import sessions retained for {}s when idle", config.sessions.retention_seconds);
    let app = crm_import::build_router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
