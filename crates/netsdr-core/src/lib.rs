//! netsdr-core: Core error types and collaborator traits for the NetSDR client.
//!
//! This crate defines the seams between the protocol session in `netsdr` and
//! the things it talks to. The session depends only on these traits, so the
//! real TCP/UDP transports in `netsdr-transport` and the mocks in
//! `netsdr-test-harness` are interchangeable.
//!
//! # Key types
//!
//! - [`ControlChannel`] -- request/response control link (TCP)
//! - [`StreamChannel`] -- datagram sample stream (UDP)
//! - [`SampleSink`] -- destination for decoded sample batches
//! - [`Error`] / [`Result`] / [`CodecError`] -- error handling

pub mod error;
pub mod sink;
pub mod transport;

pub use error::{CodecError, Error, Result};
pub use sink::SampleSink;
pub use transport::{ControlChannel, StreamChannel};
