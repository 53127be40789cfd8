//! Shared application state for the gateway.
//!
//! [`AppState`] is wrapped in an `Arc` and shared across all request
//! handlers. Apart from the admission permits it is read-only after startup.

use std::sync::Arc;

use modgate_core::Platform;

use crate::admission::AdmissionGate;
use crate::config::GatewayConfig;
use crate::relay::SandboxProvider;

/// Shared state accessible from every Axum handler.
#[derive(Clone)]
pub struct AppState {
    /// Gateway configuration.
    pub config: Arc<GatewayConfig>,

    /// Permits bounding the relays in flight.
    pub admission: AdmissionGate,

    /// Where modules are sent.
    pub provider: Arc<dyn SandboxProvider>,
}

impl AppState {
    pub fn new(config: Arc<GatewayConfig>, provider: Arc<dyn SandboxProvider>) -> Self {
        let admission = AdmissionGate::new(config.concurrency_limit);
        Self {
            config,
            admission,
            provider,
        }
    }

    /// Resolve a route segment to a platform this gateway serves.
    pub fn supported_platform(&self, name: &str) -> Option<Platform> {
        let platform = name.parse::<Platform>().ok()?;
        self.config.platforms.contains(&platform).then_some(platform)
    }
}
