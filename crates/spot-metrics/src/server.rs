//! Metrics server.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use spot_core::StatusHandle;
use tokio::net::TcpListener;
use tracing::info;

use crate::error::{MetricsError, Result};
use crate::prometheus::PrometheusRegistry;
use crate::routes::{ServerState, create_router};

/// Serves `/metrics`, `/healthz` and `/status`.
#[derive(Debug, Clone)]
pub struct MetricsServer {
    state: Arc<ServerState>,
}

impl MetricsServer {
    /// Creates a server exposing `registry` and the controller `status`.
    #[must_use]
    pub fn new(registry: PrometheusRegistry, status: StatusHandle) -> Self {
        Self {
            state: Arc::new(ServerState::new(registry, status)),
        }
    }

    /// Creates the router without starting the server.
    pub fn router(&self) -> axum::Router {
        create_router(Arc::clone(&self.state))
    }

    /// Listens on `addr` until the server fails.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails or the server stops.
    pub async fn serve(&self, addr: SocketAddr) -> Result<()> {
        self.serve_with_shutdown(addr, std::future::pending()).await
    }

    /// Listens on `addr` until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails or the server stops with an error.
    pub async fn serve_with_shutdown<F>(&self, addr: SocketAddr, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| MetricsError::BindFailed(addr, e))?;
        self.serve_on(listener, shutdown).await
    }

    /// Serves on an already bound listener until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if the server stops with an error.
    pub async fn serve_on<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(addr) = listener.local_addr() {
            info!(addr = %addr, "metrics server listening");
        }

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(MetricsError::Serve)?;

        info!("metrics server shut down");
        Ok(())
    }
}
