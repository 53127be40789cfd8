//! modgate client.
//!
//! Callers never talk to workers. They hand a module and a target platform
//! to a [`DispatchClient`], which picks a gateway through the
//! [`EndpointRegistry`] and retries briefly when gateways are saturated.
//!
//! - **[`registry`]** -- one-shot discovery and per-platform round robin.
//! - **[`dispatch`]** -- request, response classification and retry.
//! - **[`config`]** -- [`ClientConfig`].
//! - **[`error`]** -- [`DispatchError`].

pub mod config;
pub mod dispatch;
pub mod error;
pub mod registry;

pub use config::ClientConfig;
pub use dispatch::{DispatchClient, MAX_ATTEMPTS, MAX_DIAGNOSTIC_SIZE};
pub use error::{DispatchError, Result};
pub use registry::{EndpointRegistry, EndpointSet, RouteTable, route_url};
