//! netsdr-test-harness: Mock collaborators for testing the NetSDR client.
//!
//! - [`MockControlChannel`] stands in for the TCP control link. It records
//!   everything sent and answers according to a [`ResponseMode`].
//! - [`MockStreamChannel`] stands in for the UDP stream. Tests push
//!   datagrams through its [`MockStreamHandle`].
//! - [`MemorySampleSink`] collects stored batches in memory.
//! - [`MockTcpServer`] is a real loopback TCP listener that replays
//!   scripted request/response pairs, for integration tests against
//!   `TcpTransport`.
//!
//! The mocks are moved into the client as boxed trait objects, so each one
//! hands out a cloneable handle for inspecting and driving it afterwards.

pub mod mock_control;
pub mod mock_stream;
pub mod mock_tcp;
pub mod sink;

pub use mock_control::{MockControlChannel, MockControlHandle, ResponseMode};
pub use mock_stream::{MockStreamChannel, MockStreamHandle};
pub use mock_tcp::MockTcpServer;
pub use sink::MemorySampleSink;
