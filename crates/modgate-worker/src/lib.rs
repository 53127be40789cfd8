//! modgate worker.
//!
//! Two halves live here:
//!
//! - **Worker process** -- [`run_worker`] serves one framed module read from
//!   stdin with a fresh [`SandboxRuntime`], either executing it or printing
//!   its disassembly.
//! - **Worker host** -- [`WorkerHost`] listens on the local address of one
//!   operation kind and starts a worker process per connection, resetting
//!   the connection when the process fails.
//!
//! Supporting modules:
//!
//! - **[`config`]** -- [`SandboxConfig`] limits and [`WorkerConfig`] listen
//!   addresses.
//! - **[`prepare`]** -- member descriptors, instantiation hints and the
//!   preparation pass that runs ahead of disassembly.
//! - **[`disasm`]** -- compiled image parsing and capstone rendering.
//! - **[`error`]** -- [`SandboxError`].

pub mod config;
pub mod disasm;
pub mod error;
pub mod exec;
pub mod host;
pub mod prepare;
pub mod runtime;

pub use config::{SandboxConfig, WorkerConfig};
pub use error::{Result, SandboxError};
pub use exec::run_worker;
pub use host::{WorkerCommand, WorkerHost};
pub use prepare::{InstantiationHint, MemberDescriptor, PreparedMember};
pub use runtime::{PrepareSummary, SandboxRuntime};
