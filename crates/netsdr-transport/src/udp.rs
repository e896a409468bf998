//! UDP streaming transport.
//!
//! This module provides [`UdpTransport`], which implements the
//! [`StreamChannel`] trait for the receiver's I/Q data stream (UDP port
//! 60000 by default on NetSDR hardware). The socket is only bound between
//! [`start_listening`](StreamChannel::start_listening) and
//! [`stop_listening`](StreamChannel::stop_listening), so the port is free
//! whenever the stream is idle.
//!
//! # Example
//!
//! ```no_run
//! use netsdr_core::StreamChannel;
//! use netsdr_transport::UdpTransport;
//!
//! # async fn example() -> netsdr_core::Result<()> {
//! let mut transport = UdpTransport::new("0.0.0.0:60000");
//! transport.start_listening().await?;
//!
//! let mut buf = [0u8; 8192];
//! let n = transport.recv_datagram(&mut buf).await?;
//! println!("Received {} bytes", n);
//!
//! transport.stop_listening().await?;
//! # Ok(())
//! # }
//! ```

use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;

use netsdr_core::error::{Error, Result};
use netsdr_core::transport::StreamChannel;

/// UDP transport for the sample stream.
///
/// Two transports compare equal when they are configured for the same bind
/// address, whether or not either is currently listening.
#[derive(Debug)]
pub struct UdpTransport {
    /// Configured bind address, `host:port`.
    bind_addr: String,
    /// The socket, `None` while not listening.
    socket: Option<UdpSocket>,
}

impl UdpTransport {
    /// Create a transport that will bind to `bind_addr` when listening starts.
    ///
    /// Use `"0.0.0.0:60000"` for the NetSDR default, or `"127.0.0.1:0"` to
    /// let the OS pick a port.
    pub fn new(bind_addr: impl Into<String>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            socket: None,
        }
    }

    /// Create a transport bound to a port on all interfaces.
    pub fn on_port(port: u16) -> Self {
        Self::new(format!("0.0.0.0:{}", port))
    }

    /// The configured bind address.
    pub fn bind_addr(&self) -> &str {
        &self.bind_addr
    }

    /// The address the socket is actually bound to, while listening.
    ///
    /// This is useful when binding to port 0 to discover the assigned port.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Receive a datagram with timeout.
    ///
    /// Returns [`Error::Timeout`] if no datagram arrives within `timeout`.
    pub async fn recv_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        match tokio::time::timeout(timeout, self.recv_datagram(buf)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::trace!(
                    bind_addr = %self.bind_addr,
                    timeout_ms = timeout.as_millis(),
                    "Timeout waiting for datagram"
                );
                Err(Error::Timeout)
            }
        }
    }
}

impl PartialEq for UdpTransport {
    fn eq(&self, other: &Self) -> bool {
        self.bind_addr == other.bind_addr
    }
}

impl Eq for UdpTransport {}

impl Hash for UdpTransport {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bind_addr.hash(state);
    }
}

#[async_trait]
impl StreamChannel for UdpTransport {
    async fn start_listening(&mut self) -> Result<()> {
        if self.socket.is_some() {
            tracing::debug!(bind_addr = %self.bind_addr, "UDP socket already bound");
            return Ok(());
        }

        tracing::debug!(bind_addr = %self.bind_addr, "Binding UDP socket");

        let socket = UdpSocket::bind(&self.bind_addr).await.map_err(|e| {
            tracing::error!(bind_addr = %self.bind_addr, error = %e, "Failed to bind UDP socket");
            Error::Io(e)
        })?;

        if let Ok(local) = socket.local_addr() {
            tracing::info!(local_addr = %local, "Listening for UDP datagrams");
        }

        self.socket = Some(socket);
        Ok(())
    }

    async fn recv_datagram(&mut self, buf: &mut [u8]) -> Result<usize> {
        let socket = self.socket.as_ref().ok_or(Error::NotConnected)?;

        match socket.recv_from(buf).await {
            Ok((n, src)) => {
                tracing::trace!(remote = %src, bytes = n, "Received datagram");
                Ok(n)
            }
            Err(e) => {
                tracing::error!(bind_addr = %self.bind_addr, error = %e, "Failed to receive datagram");
                Err(Error::Io(e))
            }
        }
    }

    async fn stop_listening(&mut self) -> Result<()> {
        if self.socket.take().is_some() {
            tracing::info!(bind_addr = %self.bind_addr, "Stopped listening for UDP datagrams");
        }
        Ok(())
    }

    fn is_listening(&self) -> bool {
        self.socket.is_some()
    }
}
