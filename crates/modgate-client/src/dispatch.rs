//! Dispatch client.
//!
//! [`DispatchClient`] sends a module to a gateway serving the requested
//! platform and returns the gateway's output. Each attempt picks the next
//! endpoint from the registry; only overload (`429`) is retried, up to
//! [`MAX_ATTEMPTS`] attempts in total. Every other outcome is final.

use std::time::Duration;

use bytes::Bytes;
use modgate_core::{OperationKind, Platform};
use reqwest::StatusCode;
use url::Url;

use crate::config::ClientConfig;
use crate::error::{DispatchError, Result};
use crate::registry::{EndpointRegistry, route_url};

/// Attempts made before giving up on an overloaded platform.
pub const MAX_ATTEMPTS: usize = 3;

/// Bytes of an error body kept as the diagnostic message.
pub const MAX_DIAGNOSTIC_SIZE: usize = 512;

const PLATFORM_UNSUPPORTED: &str = "The specified platform is not supported.";

/// Result of a single attempt.
#[derive(Debug)]
enum ExecutionOutcome {
    Success(Vec<u8>),
    Overloaded,
    BackendError {
        status: StatusCode,
        message: Option<String>,
    },
    PlatformUnsupported {
        message: String,
    },
}

/// Sends modules to gateways and classifies their answers.
#[derive(Clone)]
pub struct DispatchClient {
    registry: EndpointRegistry,
    http: reqwest::Client,
    max_response_size: usize,
    request_timeout: Duration,
}

impl DispatchClient {
    pub fn new(registry: EndpointRegistry, http: reqwest::Client, config: &ClientConfig) -> Self {
        Self {
            registry,
            http,
            max_response_size: config.max_response_size,
            request_timeout: config.request_timeout(),
        }
    }

    /// Build the HTTP client and registry from `config`. Discovery starts
    /// on the first lookup unless [`EndpointRegistry::spawn_discovery`] is
    /// called earlier.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| DispatchError::Request {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        let registry = EndpointRegistry::new(config.backend_urls()?, http.clone(), config.discovery_timeout());
        Ok(Self::new(registry, http, config))
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    /// Execute a module on `platform` and return its output.
    pub async fn run(&self, platform: Platform, module: Bytes) -> Result<String> {
        self.dispatch(platform, OperationKind::Execute, module).await
    }

    /// Disassemble a module for `platform`.
    pub async fn asm(&self, platform: Platform, module: Bytes) -> Result<String> {
        self.dispatch(platform, OperationKind::Disassemble, module).await
    }

    /// Dispatch and decode the output as UTF-8, replacing invalid sequences.
    pub async fn dispatch(&self, platform: Platform, operation: OperationKind, module: Bytes) -> Result<String> {
        let output = self.dispatch_bytes(platform, operation, module).await?;
        Ok(String::from_utf8_lossy(&output).into_owned())
    }

    /// Dispatch and return the raw output, at most `max_response_size` bytes.
    pub async fn dispatch_bytes(
        &self,
        platform: Platform,
        operation: OperationKind,
        module: Bytes,
    ) -> Result<Vec<u8>> {
        for attempt in 1..=MAX_ATTEMPTS {
            let endpoint = self
                .registry
                .next_endpoint(platform)
                .await
                .ok_or(DispatchError::NoEndpoint { platform })?;

            match self.attempt(&endpoint, platform, operation, module.clone()).await? {
                ExecutionOutcome::Success(output) => {
                    tracing::debug!(%platform, %operation, %endpoint, attempt, bytes = output.len(), "dispatch succeeded");
                    return Ok(output);
                }
                ExecutionOutcome::Overloaded => {
                    tracing::debug!(%platform, %operation, %endpoint, attempt, "gateway overloaded");
                }
                ExecutionOutcome::PlatformUnsupported { message } => {
                    return Err(DispatchError::PlatformUnsupported { message });
                }
                ExecutionOutcome::BackendError { status, message } => {
                    tracing::info!(%platform, %operation, %endpoint, %status, "gateway returned an error");
                    return Err(DispatchError::Backend { status, message });
                }
            }
        }

        Err(DispatchError::Overloaded {
            attempts: MAX_ATTEMPTS,
        })
    }

    async fn attempt(
        &self,
        endpoint: &Url,
        platform: Platform,
        operation: OperationKind,
        module: Bytes,
    ) -> Result<ExecutionOutcome> {
        let url = route_url(endpoint, platform, operation)?;
        let response = self
            .http
            .post(url)
            .timeout(self.request_timeout)
            .body(module)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(ExecutionOutcome::Success(
                read_capped(response, self.max_response_size).await?,
            ));
        }

        let outcome = match status {
            StatusCode::TOO_MANY_REQUESTS => ExecutionOutcome::Overloaded,
            StatusCode::BAD_REQUEST => ExecutionOutcome::PlatformUnsupported {
                message: diagnostic(response)
                    .await
                    .unwrap_or_else(|| PLATFORM_UNSUPPORTED.to_owned()),
            },
            _ => ExecutionOutcome::BackendError {
                status,
                message: diagnostic(response).await,
            },
        };
        Ok(outcome)
    }
}

/// Read at most `limit` body bytes, stopping exactly at the limit.
async fn read_capped(mut response: reqwest::Response, limit: usize) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let room = limit - body.len();
        if chunk.len() >= room {
            body.extend_from_slice(&chunk[..room]);
            break;
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Short diagnostic from an error body; `None` when the body is empty or
/// unreadable.
async fn diagnostic(response: reqwest::Response) -> Option<String> {
    let body = read_capped(response, MAX_DIAGNOSTIC_SIZE).await.ok()?;
    let text = String::from_utf8_lossy(&body).trim().to_owned();
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_backends_means_no_endpoint() {
        let client = DispatchClient::from_config(&ClientConfig::default()).unwrap();
        let err = client
            .run(Platform::X64, Bytes::from_static(b"\0asm"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NoEndpoint { platform: Platform::X64 }));
    }

    #[test]
    fn invalid_backend_fails_construction() {
        let config = ClientConfig::new().with_backend("::nope::");
        assert!(DispatchClient::from_config(&config).is_err());
    }
}
