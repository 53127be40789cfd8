//! Worker error types.
//!
//! All worker subsystems surface errors through [`SandboxError`], which is the
//! single error type returned by every public API in this crate.

use modgate_core::FrameError;

/// Unified error type for the worker process and worker host.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// The request frame could not be read or decoded.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Wasm module failed to compile (e.g. invalid bytecode).
    #[error("wasm compilation error: {0}")]
    Compilation(String),

    /// Wasm module could not be instantiated (e.g. missing imports).
    #[error("wasm instantiation error: {0}")]
    Instantiation(String),

    /// The module does not export a `_start` entry point.
    #[error("module has no `_start` entry point")]
    MissingEntryPoint,

    /// A Wasm trap was raised during execution.
    #[error("wasm trap: {0}")]
    Trap(String),

    /// Execution ran out of fuel.
    #[error("fuel exhausted after {limit} units")]
    FuelExhausted {
        /// The configured fuel budget.
        limit: u64,
    },

    /// The compiled image could not be read or disassembled.
    #[error("disassembly error: {0}")]
    Disassembly(String),

    /// The host architecture has no disassembler.
    #[error("unsupported host architecture: {0}")]
    UnsupportedHost(String),

    /// An I/O error occurred (stdin/stdout, sockets, child processes).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the worker crate.
pub type Result<T> = std::result::Result<T, SandboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compilation_error_display() {
        let err = SandboxError::Compilation("bad magic".into());
        assert_eq!(err.to_string(), "wasm compilation error: bad magic");
    }

    #[test]
    fn fuel_exhausted_display() {
        let err = SandboxError::FuelExhausted { limit: 5000 };
        assert_eq!(err.to_string(), "fuel exhausted after 5000 units");
    }

    #[test]
    fn frame_error_converts() {
        let err = SandboxError::from(FrameError::Truncated);
        assert!(err.to_string().starts_with("frame error:"));
    }

    #[test]
    fn io_error_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file gone");
        let err = SandboxError::from(io_err);
        assert!(err.to_string().contains("file gone"));
    }
}
