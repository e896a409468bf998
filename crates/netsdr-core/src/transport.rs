//! Transport traits for receiver communication.
//!
//! A NetSDR receiver is driven over two independent links:
//!
//! - a [`ControlChannel`] (TCP) carrying control-item requests and their
//!   responses, one at a time;
//! - a [`StreamChannel`] (UDP) carrying data-item datagrams with samples.
//!
//! The session in the `netsdr` crate operates on these traits rather than on
//! sockets directly, enabling both real hardware control and deterministic
//! unit testing with the mocks from `netsdr-test-harness`.
//!
//! Transports move raw bytes only. Framing and decoding belong to the codec.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Result;

/// Request/response control link to a receiver.
///
/// Inbound traffic is delivered by message passing rather than callbacks:
/// [`connect`](ControlChannel::connect) hands back the receiving end of a
/// channel that yields every chunk of bytes read from the link. The channel
/// closes when the link goes down or [`disconnect`](ControlChannel::disconnect)
/// is called.
#[async_trait]
pub trait ControlChannel: Send + Sync {
    /// Establish the link and start delivering inbound bytes.
    async fn connect(&mut self) -> Result<mpsc::Receiver<Bytes>>;

    /// Tear the link down. Calling this while not connected is a no-op.
    async fn disconnect(&mut self) -> Result<()>;

    /// Check whether the link is currently up.
    fn is_connected(&self) -> bool;

    /// Send raw bytes to the receiver.
    ///
    /// Returns [`Error::NotConnected`](crate::error::Error::NotConnected) if
    /// the link is down.
    async fn send(&mut self, data: &[u8]) -> Result<()>;
}

/// Datagram link carrying the receiver's sample stream.
///
/// Unlike [`ControlChannel`], this is receive-only and datagram-oriented:
/// each [`recv_datagram`](StreamChannel::recv_datagram) call yields exactly
/// one datagram.
#[async_trait]
pub trait StreamChannel: Send + Sync {
    /// Prepare to receive (bind the socket).
    async fn start_listening(&mut self) -> Result<()>;

    /// Wait for the next datagram and copy it into `buf`.
    ///
    /// Returns the number of bytes received. Returns
    /// [`Error::NotConnected`](crate::error::Error::NotConnected) if called
    /// before [`start_listening`](StreamChannel::start_listening) or after
    /// [`stop_listening`](StreamChannel::stop_listening).
    async fn recv_datagram(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Stop receiving and release the socket. Idempotent.
    async fn stop_listening(&mut self) -> Result<()>;

    /// Whether the channel is currently listening.
    fn is_listening(&self) -> bool;
}
