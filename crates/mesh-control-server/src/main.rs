//! Mesh control plane server
//!
//! Wires the adapter registry, operation dispatcher and sync ingestion
//! pipeline to their production collaborators (gRPC adapters, NATS, SQLite)
//! and serves the HTTP API.

mod settings;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use mesh_control_api::{build_router, AppState};
use mesh_control_service::adapters::{GrpcAdapterConnector, NatsSubscription, SqlObjectStore};
use mesh_control_service::{ConfiguredContexts, ControlPlane, ControlPlaneDeps, TcpProbe};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use settings::Settings;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Mesh control plane: adapter registry, operation dispatch and sync ingestion
#[derive(Parser, Debug)]
#[command(name = "mesh-control-server", version, about, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "MESHCTL_CONFIG")]
    config: Option<PathBuf>,

    /// Override the HTTP bind address
    #[arg(long, env = "MESHCTL_BIND")]
    bind: Option<String>,

    /// Log output format
    #[arg(long, env = "MESHCTL_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(cli.log_format);

    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(bind) = cli.bind {
        settings.http.bind_address = bind;
    }
    settings
        .control_plane
        .validate()
        .context("Invalid control plane configuration")?;

    let plane = Arc::new(build_control_plane(&settings).await?);

    if plane.status().start().await {
        info!(controller = %plane.status().name(), "Sync ingestion started");
    }

    let app = build_router(AppState::from_arc(plane.clone()));
    let listener = tokio::net::TcpListener::bind(&settings.http.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", settings.http.bind_address))?;

    info!(address = %settings.http.bind_address, "Mesh control plane listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Shutting down");
    plane.shutdown().await;
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

async fn build_control_plane(settings: &Settings) -> anyhow::Result<ControlPlane> {
    let config = &settings.control_plane;

    let store = SqlObjectStore::connect(&settings.database.url)
        .await
        .context("Failed to open object store")?;

    let subscription = NatsSubscription::connect(
        &settings.broker.url,
        &config.ingestion.subject,
        &config.ingestion.queue_group,
    )
    .await
    .context("Failed to subscribe to broker")?;

    let contexts = ConfiguredContexts::from_settings(&config.clusters);
    if contexts.is_empty() {
        warn!("No cluster contexts configured; operations will be rejected");
    }

    Ok(ControlPlane::new(
        config,
        ControlPlaneDeps {
            connector: Arc::new(GrpcAdapterConnector::default()),
            probe: Arc::new(TcpProbe::new(config.registry.probe_timeout())),
            store: Arc::new(store),
            subscription: Box::new(subscription),
            contexts: Arc::new(contexts),
        },
    ))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
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
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
