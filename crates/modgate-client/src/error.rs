//! Client-side error types.
//!
//! [`DispatchError`] is what callers of the dispatch client see. The display
//! strings are meant to be shown to end users as-is, so they carry the
//! platform name and status but never transport internals.

use modgate_core::Platform;
use reqwest::StatusCode;

/// Failure of a dispatch or discovery operation.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No reachable gateway advertises the platform.
    #[error("No backend available for the {platform} platform.")]
    NoEndpoint { platform: Platform },

    /// Every attempt was rejected for lack of capacity.
    #[error("The backend is currently overloaded. Please try again later.")]
    Overloaded { attempts: usize },

    /// The gateway rejected the platform.
    #[error("{message}")]
    PlatformUnsupported { message: String },

    /// The gateway answered with an unexpected status.
    #[error("The backend returned {}.", describe_status(.status, .message))]
    Backend {
        status: StatusCode,
        message: Option<String>,
    },

    /// The request could not be sent or its response could not be read.
    #[error("request failed: {reason}")]
    Request { reason: String },

    /// A configured gateway address is not a usable URL.
    #[error("invalid backend address `{address}`: {reason}")]
    InvalidBackend { address: String, reason: String },
}

fn describe_status(status: &StatusCode, message: &Option<String>) -> String {
    match message {
        Some(message) => format!("{} {message}", status.as_u16()),
        None => status.as_u16().to_string(),
    }
}

impl From<reqwest::Error> for DispatchError {
    fn from(e: reqwest::Error) -> Self {
        Self::Request {
            reason: e.to_string(),
        }
    }
}

/// Convenience alias for client operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_endpoint_names_the_platform() {
        let err = DispatchError::NoEndpoint {
            platform: Platform::Arm64,
        };
        assert_eq!(err.to_string(), "No backend available for the arm64 platform.");
    }

    #[test]
    fn overloaded_message() {
        let err = DispatchError::Overloaded { attempts: 3 };
        assert_eq!(
            err.to_string(),
            "The backend is currently overloaded. Please try again later."
        );
    }

    #[test]
    fn backend_message_with_and_without_diagnostic() {
        let bare = DispatchError::Backend {
            status: StatusCode::BAD_GATEWAY,
            message: None,
        };
        assert_eq!(bare.to_string(), "The backend returned 502.");

        let detailed = DispatchError::Backend {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            message: Some("module too large".into()),
        };
        assert_eq!(
            detailed.to_string(),
            "The backend returned 413 module too large."
        );
    }
}
