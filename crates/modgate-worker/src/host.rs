//! Worker host.
//!
//! The gateway reaches workers through a [`WorkerHost`], one per operation
//! kind, listening on a fixed local address. Each accepted connection gets a
//! fresh worker process: the connection is piped into the process's stdin and
//! the process's stdout is piped back. The host never loads a module itself.
//!
//! Connection outcomes as seen by the peer:
//!
//! - the worker exits with status 0: the write side is shut down after the
//!   last output byte, so the peer reads a clean end of stream;
//! - the worker exits with a failure status, crashes or exceeds the time
//!   limit: the connection is reset, so the peer sees an error instead of a
//!   short success;
//! - the peer closes its side first: the request is treated as cancelled and
//!   the worker process is killed.

use std::ffi::OsString;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::ReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::process::{Child, ChildStdin, Command};

use modgate_core::OperationKind;

use crate::error::{Result, SandboxError};

const FORWARD_BUFFER_SIZE: usize = 8192;

/// How to start one worker process.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append an argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn spawn(&self) -> std::io::Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
    }
}

/// How a single relay ended.
enum RelayEnd {
    /// The worker closed its stdout.
    Finished(std::io::Result<u64>),
    /// The peer went away before the worker finished.
    Cancelled,
}

/// Accepts connections for one operation kind and runs a worker per
/// connection.
#[derive(Debug, Clone)]
pub struct WorkerHost {
    kind: OperationKind,
    command: Arc<WorkerCommand>,
    time_limit: Duration,
}

impl WorkerHost {
    pub fn new(kind: OperationKind, command: WorkerCommand, time_limit: Duration) -> Self {
        Self {
            kind,
            command: Arc::new(command),
            time_limit,
        }
    }

    /// The operation kind this host serves.
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Bind `addr` and serve until the listener fails.
    pub async fn bind_and_serve(self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let local = listener.local_addr()?;
        tracing::info!(kind = %self.kind, addr = %local, "worker host listening");

        loop {
            let (socket, peer) = listener.accept().await?;
            let host = self.clone();
            tokio::spawn(async move {
                if let Err(e) = host.handle(socket, peer).await {
                    tracing::warn!(kind = %host.kind, %peer, error = %e, "worker relay failed");
                }
            });
        }
    }

    async fn handle(&self, mut socket: TcpStream, peer: SocketAddr) -> Result<()> {
        let mut child = self.command.spawn()?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SandboxError::Io(std::io::Error::other("worker stdin not piped")))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| SandboxError::Io(std::io::Error::other("worker stdout not piped")))?;

        tracing::debug!(kind = %self.kind, %peer, pid = ?child.id(), "worker process started");

        let relay = {
            let (mut reader, mut writer) = socket.split();
            tokio::time::timeout(self.time_limit, async {
                tokio::select! {
                    copied = tokio::io::copy(&mut stdout, &mut writer) => RelayEnd::Finished(copied),
                    () = forward_request(&mut reader, &mut stdin) => RelayEnd::Cancelled,
                }
            })
            .await
        };

        match relay {
            Err(_) => {
                tracing::warn!(kind = %self.kind, %peer, limit = ?self.time_limit, "worker exceeded time limit");
                terminate(&mut child).await;
                reset(socket);
            }
            Ok(RelayEnd::Cancelled) => {
                tracing::debug!(kind = %self.kind, %peer, "peer closed the connection, killing worker");
                terminate(&mut child).await;
            }
            Ok(RelayEnd::Finished(Err(e))) => {
                tracing::debug!(kind = %self.kind, %peer, error = %e, "output relay broke");
                terminate(&mut child).await;
                reset(socket);
            }
            Ok(RelayEnd::Finished(Ok(bytes))) => {
                let status = child.wait().await?;
                if status.success() {
                    tracing::debug!(kind = %self.kind, %peer, bytes, "worker finished");
                    socket.shutdown().await?;
                } else {
                    tracing::info!(kind = %self.kind, %peer, bytes, %status, "worker failed");
                    reset(socket);
                }
            }
        }

        Ok(())
    }
}

/// Copy the request from the peer into the worker's stdin.
///
/// Only returns once the peer has closed its side (or the socket failed);
/// the worker closing its stdin early just stops the forwarding.
async fn forward_request(reader: &mut ReadHalf<'_>, stdin: &mut ChildStdin) {
    let mut buffer = [0u8; FORWARD_BUFFER_SIZE];
    let mut forwarding = true;

    loop {
        match reader.read(&mut buffer).await {
            Ok(0) | Err(_) => return,
            Ok(n) => {
                if forwarding && stdin.write_all(&buffer[..n]).await.is_err() {
                    forwarding = false;
                }
            }
        }
    }
}

async fn terminate(child: &mut Child) {
    if let Err(e) = child.kill().await {
        tracing::debug!(error = %e, "failed to kill worker process");
    }
}

/// Close the connection with a reset so the peer cannot mistake a failed
/// run for a short successful one.
fn reset(socket: TcpStream) {
    #[allow(deprecated)]
    if let Err(e) = socket.set_linger(Some(Duration::ZERO)) {
        tracing::debug!(error = %e, "failed to set linger before reset");
    }
    drop(socket);
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn start_host(script: &str, limit: Duration) -> SocketAddr {
        let command = WorkerCommand::new("sh").arg("-c").arg(script);
        let host = WorkerHost::new(OperationKind::Execute, command, limit);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(host.serve(listener));
        addr
    }

    async fn request(addr: SocketAddr, frame: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut stream = TcpStream::connect(addr).await?;
        stream.write_all(frame).await?;
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await?;
        Ok(out)
    }

    #[tokio::test]
    async fn successful_worker_closes_cleanly() {
        let addr = start_host("head -n 1 > /dev/null; printf 'hello'", Duration::from_secs(5)).await;
        let out = request(addr, b"QUJD\n").await.unwrap();
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn silent_worker_yields_empty_output() {
        let addr = start_host("head -n 1 > /dev/null", Duration::from_secs(5)).await;
        let out = request(addr, b"\n").await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn failing_worker_resets_connection() {
        let addr = start_host("head -n 1 > /dev/null; printf 'partial'; exit 3", Duration::from_secs(5)).await;
        assert!(request(addr, b"QUJD\n").await.is_err());
    }

    #[tokio::test]
    async fn slow_worker_is_killed_at_time_limit() {
        let addr = start_host("head -n 1 > /dev/null; sleep 30", Duration::from_millis(200)).await;
        let started = std::time::Instant::now();
        assert!(request(addr, b"QUJD\n").await.is_err());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn host_keeps_serving_after_a_failure() {
        let addr = start_host("head -n 1 > /dev/null; printf 'ok'", Duration::from_secs(5)).await;
        let _ = TcpStream::connect(addr).await.unwrap();
        assert_eq!(request(addr, b"\n").await.unwrap(), b"ok");
        assert_eq!(request(addr, b"\n").await.unwrap(), b"ok");
    }
}
