//! HTTP server using Axum
//!
//! Serves the link builder, the proxy endpoint and the stats/health views.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tokio::sync::watch;
use tracing::{info, instrument};

use crate::config::Config;
use crate::error::{Result, WaypointError};
use crate::proxy::{AdmissionGuard, ProxyHandler};

use super::routes;

/// Shared state for request handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub guard: AdmissionGuard,
    pub handler: Arc<ProxyHandler>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Config, guard: AdmissionGuard, handler: Arc<ProxyHandler>) -> Self {
        Self {
            config: Arc::new(config),
            guard,
            handler,
            started_at: Instant::now(),
        }
    }
}

/// API server
pub struct ApiServer {
    state: AppState,
}

impl ApiServer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Build the router
    pub fn build_router(&self) -> Router {
        routes::create_router(self.state.clone())
    }

    /// Run the server until `shutdown` flips
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr: SocketAddr = self.state.config.listen_addr().parse().map_err(|e| {
            WaypointError::InvalidConfig(format!(
                "invalid listen address {}: {}",
                self.state.config.listen_addr(),
                e
            ))
        })?;

        let router = self.build_router();

        info!("Waypoint listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
        .map_err(|e| WaypointError::Internal(e.to_string()))?;

        info!("Waypoint server shut down");
        Ok(())
    }
}
