//! Relaying modules to worker hosts.
//!
//! [`SandboxProvider`] is the seam between the HTTP layer and the workers.
//! [`WorkerRelay`] is the production implementation: one TCP connection per
//! request to the worker host of the requested kind, the body streamed as a
//! frame, and the raw output read back up to the configured cap.
//!
//! The write side of the worker connection stays open until the output has
//! been read. The worker host treats a closed request side as cancellation.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::Instrument;
use uuid::Uuid;

use modgate_core::{FrameEncoder, OperationKind, Platform};

use crate::config::GatewayConfig;
use crate::error::RelayError;

/// Runs a module somewhere and returns its output.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    async fn relay(&self, platform: Platform, operation: OperationKind, module: Body) -> Result<Vec<u8>, RelayError>;
}

/// Relays to the local worker hosts over TCP.
#[derive(Debug, Clone)]
pub struct WorkerRelay {
    config: Arc<GatewayConfig>,
}

impl WorkerRelay {
    pub fn new(config: Arc<GatewayConfig>) -> Self {
        Self { config }
    }

    async fn connect(&self, addr: &str) -> Result<TcpStream, RelayError> {
        match tokio::time::timeout(self.config.connect_timeout(), TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(RelayError::WorkerUnavailable {
                reason: format!("{addr}: {e}"),
            }),
            Err(_) => Err(RelayError::WorkerUnavailable {
                reason: format!("{addr}: connect timed out"),
            }),
        }
    }
}

#[async_trait]
impl SandboxProvider for WorkerRelay {
    async fn relay(&self, platform: Platform, operation: OperationKind, module: Body) -> Result<Vec<u8>, RelayError> {
        let span = tracing::info_span!("relay", relay_id = %Uuid::now_v7(), %platform, %operation);

        async move {
            let addr = self.config.worker_addr(operation);
            let mut stream = self.connect(addr).await?;
            let (mut reader, mut writer) = stream.split();

            let sent = send_frame(&mut writer, module, self.config.max_module_size).await?;
            let output = read_output(&mut reader, self.config.max_output_size).await?;

            tracing::info!(module_bytes = sent, output_bytes = output.len(), "relay finished");
            Ok::<_, RelayError>(output)
        }
        .instrument(span)
        .await
    }
}

/// Stream `module` to the worker as one frame. Returns the raw module size.
pub async fn send_frame<W>(writer: &mut W, module: Body, limit: usize) -> Result<usize, RelayError>
where
    W: AsyncWrite + Unpin,
{
    let mut encoder = FrameEncoder::new();
    let mut text = String::new();
    let mut chunks = module.into_data_stream();

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|e| RelayError::RequestBody {
            reason: e.to_string(),
        })?;
        if encoder.consumed() + chunk.len() > limit {
            return Err(RelayError::ModuleTooLarge { limit });
        }

        text.clear();
        encoder.push(&chunk, &mut text);
        writer.write_all(text.as_bytes()).await.map_err(worker_failed)?;
    }

    let size = encoder.consumed();
    text.clear();
    encoder.finish(&mut text);
    writer.write_all(text.as_bytes()).await.map_err(worker_failed)?;
    writer.flush().await.map_err(worker_failed)?;
    Ok(size)
}

/// Read the worker's output until it closes, keeping at most `limit` bytes.
pub async fn read_output<R>(reader: &mut R, limit: usize) -> Result<Vec<u8>, RelayError>
where
    R: AsyncRead + Unpin,
{
    let mut output = Vec::new();
    reader
        .take(limit as u64)
        .read_to_end(&mut output)
        .await
        .map_err(worker_failed)?;
    Ok(output)
}

fn worker_failed(e: std::io::Error) -> RelayError {
    RelayError::WorkerFailed { reason: e.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncBufReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn send_frame_encodes_body() {
        let mut wire = Vec::new();
        let sent = send_frame(&mut wire, Body::from("hello"), 1024).await.unwrap();
        assert_eq!(sent, 5);
        assert_eq!(wire, b"aGVsbG8=\n");
    }

    #[tokio::test]
    async fn send_frame_rejects_oversized_module() {
        let mut wire = Vec::new();
        let err = send_frame(&mut wire, Body::from(vec![0u8; 64]), 16).await.unwrap_err();
        assert!(matches!(err, RelayError::ModuleTooLarge { limit: 16 }));
    }

    #[tokio::test]
    async fn read_output_stops_at_limit() {
        let data = vec![7u8; 100];
        let output = read_output(&mut data.as_slice(), 40).await.unwrap();
        assert_eq!(output.len(), 40);

        let output = read_output(&mut data.as_slice(), 1000).await.unwrap();
        assert_eq!(output.len(), 100);
    }

    #[tokio::test]
    async fn relay_round_trip_through_fake_worker() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = socket.into_split();
            let mut line = String::new();
            tokio::io::BufReader::new(reader).read_line(&mut line).await.unwrap();
            writer.write_all(line.trim_end().as_bytes()).await.unwrap();
            writer.shutdown().await.unwrap();
        });

        let config = GatewayConfig::new().with_worker(OperationKind::Execute, addr.to_string());
        let relay = WorkerRelay::new(Arc::new(config));
        let output = relay
            .relay(Platform::X64, OperationKind::Execute, Body::from("abc"))
            .await
            .unwrap();
        assert_eq!(output, b"YWJj");
    }

    #[tokio::test]
    async fn unreachable_worker_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = GatewayConfig::new().with_worker(OperationKind::Disassemble, addr.to_string());
        let err = WorkerRelay::new(Arc::new(config))
            .relay(Platform::X64, OperationKind::Disassemble, Body::from("abc"))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::WorkerUnavailable { .. }));
    }
}
