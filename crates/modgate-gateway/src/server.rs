//! Gateway server setup and startup.
//!
//! [`GatewayServer`] composes the Axum router, registers the routes, and
//! starts the HTTP listener.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::relay::{SandboxProvider, WorkerRelay};
use crate::state::AppState;

/// The modgate HTTP gateway.
pub struct GatewayServer {
    state: Arc<AppState>,
}

impl GatewayServer {
    /// Create a gateway relaying to the worker hosts named in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidConfig`] if the configuration fails
    /// validation.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let config = Arc::new(config);
        let relay = WorkerRelay::new(Arc::clone(&config));
        Self::from_parts(config, Arc::new(relay))
    }

    /// Create a gateway with a custom [`SandboxProvider`].
    pub fn with_provider(config: GatewayConfig, provider: Arc<dyn SandboxProvider>) -> Result<Self> {
        Self::from_parts(Arc::new(config), provider)
    }

    fn from_parts(config: Arc<GatewayConfig>, provider: Arc<dyn SandboxProvider>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            state: Arc::new(AppState::new(config, provider)),
        })
    }

    /// The address this server will bind to.
    pub fn addr(&self) -> &str {
        &self.state.config.bind
    }

    /// Build the Axum router with all routes registered.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/platforms", get(api::platforms))
            .route("/{platform}/run", post(api::run))
            .route("/{platform}/asm", post(api::asm))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(&self.state))
    }

    /// Bind the configured address and serve until shut down.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP listener cannot be bound.
    pub async fn start(self) -> Result<()> {
        let addr = self.addr().to_owned();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| GatewayError::Bind { addr, source })?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let local = listener.local_addr()?;
        tracing::info!(
            addr = %local,
            platforms = ?self.state.config.platforms,
            concurrency_limit = self.state.config.concurrency_limit,
            "starting gateway"
        );

        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modgate_core::Platform;

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let config = GatewayConfig::new().with_platforms([Platform::X64]).with_concurrency_limit(0);
        assert!(matches!(
            GatewayServer::new(config),
            Err(GatewayError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn addr_comes_from_config() {
        let config = GatewayConfig::new()
            .with_platforms([Platform::X64])
            .with_bind("127.0.0.1:5999");
        let server = GatewayServer::new(config).unwrap();
        assert_eq!(server.addr(), "127.0.0.1:5999");
    }
}
