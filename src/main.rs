//! Waypoint - Entry Point
//!
//! Starts the HTTP server and the admission background services with
//! graceful shutdown support.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use waypoint::api::{ApiServer, AppState};
use waypoint::config::{Config, LogConfig};
use waypoint::proxy::{AdmissionGuard, EgressPool, HttpTransport, ProxyHandler, ProxyHandlerConfig};
use waypoint::services::{
    ActivitySweepConfig, ActivitySweepHandle, ActivitySweepService, BlockExpiryHandle,
    BlockExpiryService,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("loading configuration")?;
    init_tracing(&config.log);

    info!("Starting Waypoint");

    let pool = Arc::new(EgressPool::new(config.upstream.egress_pool.clone()));
    info!(entries = pool.len(), "Egress pool loaded");

    let transport = HttpTransport::new(&config.upstream, &pool).context("building HTTP clients")?;
    let handler = Arc::new(ProxyHandler::new(
        Arc::new(transport),
        pool,
        ProxyHandlerConfig::from(&config.upstream),
    ));
    let guard = AdmissionGuard::new(config.admission.clone());

    let (shutdown_tx, _) = watch::channel(false);

    // Lift blocks as they expire
    let (expiry_handle, expiry_shutdown) = BlockExpiryHandle::new();
    let expiry_service = BlockExpiryService::new(guard.blocks());
    let expiry_task = tokio::spawn(async move {
        expiry_service.run(expiry_shutdown).await;
    });

    // Prune stale activity
    let (sweep_handle, sweep_shutdown) = ActivitySweepHandle::new();
    let sweep_service = ActivitySweepService::new(
        guard.clone(),
        ActivitySweepConfig {
            interval: Duration::from_secs(config.admission.sweep_interval_secs),
        },
    );
    let sweep_task = tokio::spawn(async move {
        sweep_service.run(sweep_shutdown).await;
    });

    let listen_addr = config.listen_addr();
    let api_server = ApiServer::new(AppState::new(config, guard, handler));
    let api_shutdown = shutdown_tx.subscribe();
    let api_task = tokio::spawn(async move {
        if let Err(e) = api_server.run(api_shutdown).await {
            error!("Server error: {}", e);
        }
    });

    info!("Server started on {}", listen_addr);

    shutdown_signal().await;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    expiry_handle.shutdown();
    sweep_handle.shutdown();

    let _ = tokio::join!(api_task, expiry_task, sweep_task);

    info!("Waypoint stopped");
    Ok(())
}

/// Install the global subscriber: `RUST_LOG` wins over `LOG_LEVEL`
fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("waypoint={},tower_http=info", log.level).into());

    let registry = tracing_subscriber::registry().with(filter);

    if log.format.eq_ignore_ascii_case("pretty") {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
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
