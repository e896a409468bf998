//! Transport implementations for the NetSDR client.
//!
//! This crate provides concrete implementations of the collaborator traits
//! from `netsdr-core`:
//!
//! - [`TcpTransport`]: the [`ControlChannel`](netsdr_core::ControlChannel)
//!   over the receiver's TCP control port
//! - [`UdpTransport`]: the [`StreamChannel`](netsdr_core::StreamChannel)
//!   for the receiver's UDP I/Q stream
//!
//! Transports move bytes only; they know nothing about NetSDR framing.

pub mod tcp;
pub mod udp;

pub use tcp::TcpTransport;
pub use udp::UdpTransport;
