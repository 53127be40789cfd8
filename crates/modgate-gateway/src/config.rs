//! Gateway configuration.
//!
//! [`GatewayConfig`] is read from the `[gateway]` table of the config file
//! and validated once at startup by [`GatewayConfig::validate`].

use std::time::Duration;

use serde::Deserialize;

use modgate_core::{OperationKind, Platform};

use crate::error::{GatewayError, Result};

/// Settings for one gateway instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Address the HTTP server binds to.
    ///
    /// Default: **`0.0.0.0:5000`**.
    pub bind: String,

    /// Platforms this gateway serves. Defaults to the platform of the
    /// machine it runs on.
    pub platforms: Vec<Platform>,

    /// Relays allowed in flight at once. Requests beyond this are rejected
    /// with `429`, never queued.
    ///
    /// Default: **8**.
    pub concurrency_limit: usize,

    /// Largest worker output returned to the requester, in bytes. Longer
    /// output is cut off silently.
    ///
    /// Default: **1 MiB**.
    pub max_output_size: usize,

    /// Largest module accepted, in bytes.
    ///
    /// Default: **8 MiB**.
    pub max_module_size: usize,

    /// Address of the execute worker host.
    pub run_worker: String,

    /// Address of the disassemble worker host.
    pub asm_worker: String,

    /// Timeout for connecting to a worker host, in milliseconds.
    ///
    /// Default: **5 000 ms**.
    pub connect_timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".into(),
            platforms: Platform::host().into_iter().collect(),
            concurrency_limit: 8,
            max_output_size: 1024 * 1024,
            max_module_size: 8 * 1024 * 1024,
            run_worker: "127.0.0.1:7000".into(),
            asm_worker: "127.0.0.1:7001".into(),
            connect_timeout_ms: 5_000,
        }
    }
}

impl GatewayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bind(mut self, bind: impl Into<String>) -> Self {
        self.bind = bind.into();
        self
    }

    pub fn with_platforms(mut self, platforms: impl IntoIterator<Item = Platform>) -> Self {
        self.platforms = platforms.into_iter().collect();
        self
    }

    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    pub fn with_max_output_size(mut self, bytes: usize) -> Self {
        self.max_output_size = bytes;
        self
    }

    pub fn with_max_module_size(mut self, bytes: usize) -> Self {
        self.max_module_size = bytes;
        self
    }

    /// Point the worker host for `kind` at `addr`.
    pub fn with_worker(mut self, kind: OperationKind, addr: impl Into<String>) -> Self {
        match kind {
            OperationKind::Execute => self.run_worker = addr.into(),
            OperationKind::Disassemble => self.asm_worker = addr.into(),
        }
        self
    }

    pub fn with_connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = ms;
        self
    }

    /// Address of the worker host serving `kind`.
    pub fn worker_addr(&self, kind: OperationKind) -> &str {
        match kind {
            OperationKind::Execute => &self.run_worker,
            OperationKind::Disassemble => &self.asm_worker,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Reject configurations the gateway cannot run with.
    pub fn validate(&self) -> Result<()> {
        let reason = if self.platforms.is_empty() {
            "at least one platform must be configured"
        } else if self.concurrency_limit == 0 {
            "concurrency_limit must be greater than zero"
        } else if self.max_output_size == 0 {
            "max_output_size must be greater than zero"
        } else {
            return Ok(());
        };
        Err(GatewayError::InvalidConfig {
            reason: reason.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = GatewayConfig::default();
        assert_eq!(cfg.bind, "0.0.0.0:5000");
        assert_eq!(cfg.concurrency_limit, 8);
        assert_eq!(cfg.max_output_size, 1024 * 1024);
        assert_eq!(cfg.max_module_size, 8 * 1024 * 1024);
        assert_eq!(cfg.worker_addr(OperationKind::Execute), "127.0.0.1:7000");
        assert_eq!(cfg.worker_addr(OperationKind::Disassemble), "127.0.0.1:7001");
        assert_eq!(cfg.connect_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn validate_accepts_sane_config() {
        let cfg = GatewayConfig::new().with_platforms([Platform::Arm64]);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let base = GatewayConfig::new().with_platforms([Platform::X64]);
        assert!(base.clone().with_platforms([]).validate().is_err());
        assert!(base.clone().with_concurrency_limit(0).validate().is_err());
        assert!(base.with_max_output_size(0).validate().is_err());
    }

    #[test]
    fn deserialize_with_partial_fields() {
        let cfg: GatewayConfig =
            serde_json::from_str(r#"{"platforms": ["arm64", "ia32"], "concurrency_limit": 2}"#).unwrap();
        assert_eq!(cfg.platforms, vec![Platform::Arm64, Platform::X86]);
        assert_eq!(cfg.concurrency_limit, 2);
        assert_eq!(cfg.max_output_size, 1024 * 1024);
    }
}
