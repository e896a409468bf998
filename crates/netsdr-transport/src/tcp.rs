//! TCP control transport.
//!
//! This module provides [`TcpTransport`], which implements the
//! [`ControlChannel`] trait for the receiver's TCP control port (50000 by
//! default on NetSDR hardware).
//!
//! TCP has no message boundaries, so the transport does not try to find
//! any: every chunk returned by a socket read is forwarded as-is over the
//! inbound channel. Frame reassembly is the session's job.
//!
//! # Example
//!
//! ```no_run
//! use netsdr_core::ControlChannel;
//! use netsdr_transport::TcpTransport;
//!
//! # async fn example() -> netsdr_core::Result<()> {
//! let mut transport = TcpTransport::new("192.168.1.50:50000");
//! let mut inbound = transport.connect().await?;
//!
//! // Ask for the receiver name (CurrentControlItem / 0x0001).
//! transport.send(&[0x04, 0x20, 0x01, 0x00]).await?;
//!
//! if let Some(chunk) = inbound.recv().await {
//!     println!("{} bytes back", chunk.len());
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use netsdr_core::error::{Error, Result};
use netsdr_core::transport::ControlChannel;

/// Default connection timeout (5 seconds).
///
/// Generous for a LAN-attached receiver, short enough that an unreachable
/// address fails promptly.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Inbound channel capacity, in chunks.
const INBOUND_CAPACITY: usize = 64;

/// Socket read buffer size. One full frame is at most 8191 bytes.
const READ_BUF_SIZE: usize = 8192;

/// TCP control transport.
///
/// Created unconnected; [`ControlChannel::connect`] opens the socket and
/// spawns a reader task that feeds the returned inbound channel.
#[derive(Debug)]
pub struct TcpTransport {
    /// The address string, `host:port`.
    addr: String,
    /// Maximum time to wait for the TCP handshake.
    connect_timeout: Duration,
    /// Write half of the socket, `None` while disconnected.
    writer: Option<OwnedWriteHalf>,
    /// Background reader task.
    reader_task: Option<JoinHandle<()>>,
    /// Cleared by the reader task when the peer closes the socket.
    connected: Arc<AtomicBool>,
}

impl TcpTransport {
    /// Create an unconnected transport for `addr` using the default timeout.
    ///
    /// The `addr` parameter should be a `host:port` string, e.g.
    /// `"192.168.1.50:50000"` or `"localhost:50000"`.
    pub fn new(addr: impl Into<String>) -> Self {
        Self::with_timeout(addr, DEFAULT_CONNECT_TIMEOUT)
    }

    /// Create an unconnected transport with a specific connect timeout.
    pub fn with_timeout(addr: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout,
            writer: None,
            reader_task: None,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get the address string this transport connects to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Drop the socket halves and stop the reader without a graceful shutdown.
    fn teardown(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        self.writer = None;
    }
}

#[async_trait]
impl ControlChannel for TcpTransport {
    async fn connect(&mut self) -> Result<mpsc::Receiver<Bytes>> {
        if self.writer.is_some() {
            // Either still connected or the peer dropped us; start clean.
            self.teardown();
        }

        tracing::debug!(
            addr = %self.addr,
            timeout_ms = self.connect_timeout.as_millis(),
            "Connecting to TCP endpoint"
        );

        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| {
                tracing::error!(addr = %self.addr, "TCP connection timed out");
                Error::Timeout
            })?
            .map_err(|e| {
                tracing::error!(addr = %self.addr, error = %e, "TCP connection failed");
                map_connect_error(e, &self.addr)
            })?;

        // Control messages are small and latency-sensitive.
        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(
                addr = %self.addr,
                error = %e,
                "Failed to set TCP_NODELAY (continuing anyway)"
            );
        }

        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);

        self.connected.store(true, Ordering::SeqCst);
        let connected = Arc::clone(&self.connected);
        let addr = self.addr.clone();
        self.reader_task = Some(tokio::spawn(read_loop(read_half, tx, connected, addr)));
        self.writer = Some(write_half);

        tracing::info!(addr = %self.addr, "TCP connection established");
        Ok(rx)
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            tracing::debug!(addr = %self.addr, "Closing TCP connection");

            if let Err(e) = writer.shutdown().await {
                tracing::warn!(
                    addr = %self.addr,
                    error = %e,
                    "Failed to shutdown TCP stream (continuing anyway)"
                );
            }

            tracing::info!(addr = %self.addr, "TCP connection closed");
        }
        self.teardown();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.writer.is_some() && self.connected.load(Ordering::SeqCst)
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }
        let writer = self.writer.as_mut().ok_or(Error::NotConnected)?;

        tracing::trace!(
            addr = %self.addr,
            bytes = data.len(),
            data = ?data,
            "Sending data"
        );

        writer.write_all(data).await.map_err(|e| {
            tracing::error!(addr = %self.addr, error = %e, "Failed to send data");
            map_io_error(e)
        })?;

        writer.flush().await.map_err(|e| {
            tracing::error!(addr = %self.addr, error = %e, "Failed to flush TCP stream");
            map_io_error(e)
        })?;

        Ok(())
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if self.writer.is_some() {
            tracing::debug!(addr = %self.addr, "TcpTransport dropped, closing connection");
        }
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
    }
}

/// Forward every socket read to the inbound channel until EOF or error.
async fn read_loop(
    mut reader: OwnedReadHalf,
    tx: mpsc::Sender<Bytes>,
    connected: Arc<AtomicBool>,
    addr: String,
) {
    let mut buf = vec![0u8; READ_BUF_SIZE];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                tracing::warn!(addr = %addr, "Peer closed connection (0 bytes read)");
                break;
            }
            Ok(n) => {
                tracing::trace!(addr = %addr, bytes = n, data = ?&buf[..n], "Received data");
                if tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                    tracing::debug!(addr = %addr, "Inbound receiver dropped, stopping reader");
                    break;
                }
            }
            Err(e) => {
                tracing::error!(addr = %addr, error = %e, "Failed to receive data");
                break;
            }
        }
    }

    connected.store(false, Ordering::SeqCst);
}

/// Map a connection-time I/O error to the appropriate [`Error`] variant.
fn map_connect_error(e: std::io::Error, addr: &str) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionRefused => {
            Error::Transport(format!("connection refused: {}", addr))
        }
        _ => Error::Io(e),
    }
}

/// Map a data-path I/O error to the appropriate [`Error`] variant.
fn map_io_error(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::ConnectionAborted => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}
