//! Gateway error types.
//!
//! [`RelayError`] covers a single relay to a worker and maps onto an HTTP
//! status; [`GatewayError`] covers startup and serving.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Failure of one relay to a worker host.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The module exceeds the configured size limit.
    #[error("module exceeds {limit} bytes")]
    ModuleTooLarge { limit: usize },

    /// The request body could not be read from the requester.
    #[error("failed to read request body: {reason}")]
    RequestBody { reason: String },

    /// The worker host could not be reached.
    #[error("worker unavailable: {reason}")]
    WorkerUnavailable { reason: String },

    /// The worker broke or reset the connection.
    #[error("worker failed: {reason}")]
    WorkerFailed { reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// HTTP status reported to the requester.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::ModuleTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RequestBody { .. } => StatusCode::BAD_REQUEST,
            Self::WorkerUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::WorkerFailed { .. } | Self::Io(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Message returned to the requester. Transport details stay in the log.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::ModuleTooLarge { .. } => "The module is too large.",
            Self::RequestBody { .. } => "The request body could not be read.",
            Self::WorkerUnavailable { .. } => "The worker is unavailable.",
            Self::WorkerFailed { .. } | Self::Io(_) => "The worker failed to process the module.",
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (self.status(), self.public_message()).into_response()
    }
}

/// Failure to start or run the gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid gateway configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for gateway startup operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
