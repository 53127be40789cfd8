//! Configuration file loading.
//!
//! Layers, lowest precedence first: built-in defaults, the TOML file,
//! environment variables (after `.env` has been applied), command-line flags.
//! Flags are applied by the subcommands themselves.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use modgate_client::ClientConfig;
use modgate_gateway::GatewayConfig;
use modgate_worker::WorkerConfig;

/// Config file used when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "modgate.toml";

/// Comma-separated gateway base URLs for the client.
pub const ENV_BACKENDS: &str = "MODGATE_BACKENDS";

/// Bind address of the gateway.
pub const ENV_GATEWAY_BIND: &str = "MODGATE_GATEWAY_BIND";

/// Everything the `modgate` binary can be configured with.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModgateConfig {
    pub gateway: GatewayConfig,
    pub client: ClientConfig,
    pub worker: WorkerConfig,
}

impl ModgateConfig {
    /// Load the config file and apply environment overrides.
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::from_file(&default)?
                } else {
                    tracing::debug!("no {DEFAULT_CONFIG_FILE} found, using defaults");
                    Self::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration loaded from file");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply overrides from `lookup`, normally the process environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(backends) = lookup(ENV_BACKENDS) {
            self.client.backends = split_list(&backends);
        }
        if let Some(bind) = lookup(ENV_GATEWAY_BIND) {
            let bind = bind.trim();
            if !bind.is_empty() {
                self.gateway.bind = bind.to_owned();
            }
        }
    }
}

/// Split a comma-separated list, dropping blanks.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use modgate_core::{OperationKind, Platform};

    use super::*;

    const SAMPLE: &str = r#"
        [gateway]
        bind = "127.0.0.1:5050"
        platforms = ["arm64", "x64"]
        concurrency_limit = 4

        [client]
        backends = ["http://a:5000", "http://b:5000"]
        max_response_size = 2048

        [worker]
        run_bind = "127.0.0.1:7100"
        max_fuel = 5000
    "#;

    #[test]
    fn parse_full_file() {
        let config = ModgateConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.gateway.bind, "127.0.0.1:5050");
        assert_eq!(config.gateway.platforms, vec![Platform::Arm64, Platform::X64]);
        assert_eq!(config.gateway.concurrency_limit, 4);
        assert_eq!(config.gateway.max_output_size, 1024 * 1024);
        assert_eq!(config.client.backends.len(), 2);
        assert_eq!(config.client.max_response_size, 2048);
        assert_eq!(config.worker.bind_for(OperationKind::Execute), "127.0.0.1:7100");
        assert_eq!(config.worker.bind_for(OperationKind::Disassemble), "127.0.0.1:7001");
        assert_eq!(config.worker.sandbox.max_fuel, 5000);
    }

    #[test]
    fn empty_file_gives_defaults() {
        let config = ModgateConfig::from_toml("").unwrap();
        assert_eq!(config.gateway.bind, "0.0.0.0:5000");
        assert!(config.client.backends.is_empty());
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(ModgateConfig::from_toml("[gateway\nbind = 1").is_err());
        assert!(ModgateConfig::from_toml("[gateway]\nplatforms = [\"sparc\"]").is_err());
    }

    #[test]
    fn load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = ModgateConfig::from_file(file.path()).unwrap();
        assert_eq!(config.gateway.concurrency_limit, 4);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(ModgateConfig::load(Some(&missing)).is_err());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = ModgateConfig::from_toml(SAMPLE).unwrap();
        config.apply_env(|key| match key {
            ENV_BACKENDS => Some(" http://c:5000 , ,http://d:5000".into()),
            ENV_GATEWAY_BIND => Some("0.0.0.0:6000".into()),
            _ => None,
        });
        assert_eq!(config.client.backends, vec!["http://c:5000", "http://d:5000"]);
        assert_eq!(config.gateway.bind, "0.0.0.0:6000");
    }

    #[test]
    fn absent_env_leaves_config_alone() {
        let mut config = ModgateConfig::from_toml(SAMPLE).unwrap();
        config.apply_env(|_| None);
        assert_eq!(config.gateway.bind, "127.0.0.1:5050");
        assert_eq!(config.client.backends.len(), 2);
    }
}
