//! netsdr: Async client for NetSDR-class software-defined radio receivers.
//!
//! A NetSDR receiver is controlled over TCP with small binary control-item
//! messages and streams I/Q samples over UDP as data-item datagrams. This
//! crate provides:
//!
//! - [`codec`] -- pure encode/decode of the message framing, plus builders
//!   for the commands the client sends
//! - [`samples`] -- decoding of data-item bodies into integer samples
//! - [`NetSdrClient`] -- the protocol session: connect and configure,
//!   start/stop the stream, tune, and feed samples to a [`SampleSink`]
//! - [`NetSdrClientBuilder`] -- configuration and wiring
//! - [`BinaryFileSampleSink`] -- a sink that appends 16-bit samples to a file
//!
//! # Quick start
//!
//! ```no_run
//! use netsdr::NetSdrClientBuilder;
//!
//! # async fn example() -> netsdr::Result<()> {
//! let client = NetSdrClientBuilder::new().host("192.168.1.50").build()?;
//! client.connect().await?;
//! client.change_frequency(7_074_000, 0).await?;
//! client.start_iq().await?;
//! // ... samples are appended to samples.bin ...
//! client.stop_iq().await?;
//! client.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod client;
pub mod codec;
pub mod samples;
pub mod sink;

pub use builder::{NetSdrClientBuilder, NetSdrTransports};
pub use client::{ClientOptions, NetSdrClient, SessionEvent};
pub use codec::{ControlItemCode, Message, MessageType};
pub use netsdr_core::{CodecError, ControlChannel, Error, Result, SampleSink, StreamChannel};
pub use samples::{Samples, decode_samples};
pub use sink::BinaryFileSampleSink;
