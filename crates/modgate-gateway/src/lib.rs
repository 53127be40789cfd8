//! modgate gateway.
//!
//! An HTTP service that accepts modules for the platforms it serves, applies
//! admission control, and relays each admitted request to the local worker
//! host of the requested kind.
//!
//! - `GET /platforms` -- JSON list of served platforms.
//! - `POST /{platform}/run` -- execute the module in the body.
//! - `POST /{platform}/asm` -- disassemble the module in the body.

pub mod admission;
pub mod api;
pub mod config;
pub mod error;
pub mod relay;
pub mod server;
pub mod state;

pub use admission::AdmissionGate;
pub use config::GatewayConfig;
pub use error::{GatewayError, RelayError, Result};
pub use relay::{SandboxProvider, WorkerRelay};
pub use server::GatewayServer;
pub use state::AppState;
