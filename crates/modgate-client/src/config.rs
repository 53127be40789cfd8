//! Client configuration.

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::{DispatchError, Result};

/// Settings for discovery and dispatch, read from the `[client]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Gateway base URLs, in registration order.
    pub backends: Vec<String>,

    /// Largest response body kept from a gateway, in bytes. Anything beyond
    /// is discarded.
    ///
    /// Default: **1 MiB**.
    pub max_response_size: usize,

    /// Timeout for each `/platforms` discovery request, in milliseconds.
    ///
    /// Default: **10 000 ms**.
    pub discovery_timeout_ms: u64,

    /// Timeout for each dispatch attempt, in milliseconds.
    ///
    /// Default: **60 000 ms**.
    pub request_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backends: Vec::new(),
            max_response_size: 1024 * 1024,
            discovery_timeout_ms: 10_000,
            request_timeout_ms: 60_000,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one more gateway.
    pub fn with_backend(mut self, address: impl Into<String>) -> Self {
        self.backends.push(address.into());
        self
    }

    pub fn with_max_response_size(mut self, bytes: usize) -> Self {
        self.max_response_size = bytes;
        self
    }

    pub fn with_discovery_timeout_ms(mut self, ms: u64) -> Self {
        self.discovery_timeout_ms = ms;
        self
    }

    pub fn with_request_timeout_ms(mut self, ms: u64) -> Self {
        self.request_timeout_ms = ms;
        self
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Parse every configured backend address.
    pub fn backend_urls(&self) -> Result<Vec<Url>> {
        self.backends
            .iter()
            .map(|address| {
                Url::parse(address.trim()).map_err(|e| DispatchError::InvalidBackend {
                    address: address.clone(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = ClientConfig::default();
        assert!(cfg.backends.is_empty());
        assert_eq!(cfg.max_response_size, 1024 * 1024);
        assert_eq!(cfg.discovery_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.request_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn backend_urls_keep_registration_order() {
        let cfg = ClientConfig::new()
            .with_backend("http://a.example:5000")
            .with_backend(" http://b.example:5000/ ");
        let urls = cfg.backend_urls().unwrap();
        assert_eq!(urls[0].host_str(), Some("a.example"));
        assert_eq!(urls[1].host_str(), Some("b.example"));
    }

    #[test]
    fn invalid_backend_is_reported() {
        let err = ClientConfig::new().with_backend("not a url").backend_urls().unwrap_err();
        assert!(matches!(err, DispatchError::InvalidBackend { .. }));
    }
}
