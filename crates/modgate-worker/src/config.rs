//! Worker configuration.
//!
//! [`SandboxConfig`] controls the resource limits applied to every module a
//! worker process loads. [`WorkerConfig`] adds the listen addresses of the
//! two worker hosts. Sensible defaults are provided via [`Default`], a
//! builder-style API allows callers to customise individual fields fluently,
//! and both types deserialize from the `[worker]` table of the config file.

use serde::Deserialize;

use modgate_core::OperationKind;

/// Resource limits for a single worker process.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Maximum linear memory a module may allocate, in bytes.
    ///
    /// Default: **64 MiB**.
    pub max_memory: usize,

    /// Maximum wall-clock time for one request, in milliseconds. Enforced by
    /// the worker host, which kills the worker process when it expires.
    ///
    /// Default: **10 000 ms**.
    pub max_execution_ms: u64,

    /// Maximum fuel (abstract instruction count) for one execution.
    ///
    /// Default: **1 000 000 000**.
    pub max_fuel: u64,

    /// Largest decoded module the worker accepts, in bytes.
    ///
    /// Default: **16 MiB**.
    pub max_module_size: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_memory: 64 * 1024 * 1024,
            max_execution_ms: 10_000,
            max_fuel: 1_000_000_000,
            max_module_size: 16 * 1024 * 1024,
        }
    }
}

impl SandboxConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum memory limit (in bytes).
    pub fn with_max_memory(mut self, bytes: usize) -> Self {
        self.max_memory = bytes;
        self
    }

    /// Set the maximum execution time (in milliseconds).
    pub fn with_max_execution_ms(mut self, ms: u64) -> Self {
        self.max_execution_ms = ms;
        self
    }

    /// Set the maximum fuel (instruction count).
    pub fn with_max_fuel(mut self, fuel: u64) -> Self {
        self.max_fuel = fuel;
        self
    }

    /// Set the maximum accepted module size (in bytes).
    pub fn with_max_module_size(mut self, bytes: usize) -> Self {
        self.max_module_size = bytes;
        self
    }
}

/// Worker host settings: where each kind listens, plus the sandbox limits
/// handed to every worker process.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Listen address of the execute worker host.
    pub run_bind: String,
    /// Listen address of the disassemble worker host.
    pub asm_bind: String,
    /// Limits for each worker process.
    #[serde(flatten)]
    pub sandbox: SandboxConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            run_bind: "127.0.0.1:7000".into(),
            asm_bind: "127.0.0.1:7001".into(),
            sandbox: SandboxConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Listen address for the host serving `kind`.
    pub fn bind_for(&self, kind: OperationKind) -> &str {
        match kind {
            OperationKind::Execute => &self.run_bind,
            OperationKind::Disassemble => &self.asm_bind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = SandboxConfig::default();
        assert_eq!(cfg.max_memory, 64 * 1024 * 1024);
        assert_eq!(cfg.max_execution_ms, 10_000);
        assert_eq!(cfg.max_fuel, 1_000_000_000);
        assert_eq!(cfg.max_module_size, 16 * 1024 * 1024);
    }

    #[test]
    fn builder_chaining() {
        let cfg = SandboxConfig::new()
            .with_max_memory(1024)
            .with_max_execution_ms(50)
            .with_max_fuel(10)
            .with_max_module_size(99);
        assert_eq!(cfg.max_memory, 1024);
        assert_eq!(cfg.max_execution_ms, 50);
        assert_eq!(cfg.max_fuel, 10);
        assert_eq!(cfg.max_module_size, 99);
    }

    #[test]
    fn bind_for_each_kind() {
        let cfg = WorkerConfig::default();
        assert_eq!(cfg.bind_for(OperationKind::Execute), "127.0.0.1:7000");
        assert_eq!(cfg.bind_for(OperationKind::Disassemble), "127.0.0.1:7001");
    }
}
