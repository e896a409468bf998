//! NetSdrClientBuilder -- fluent builder for constructing [`NetSdrClient`]
//! instances.
//!
//! Separates configuration from construction: network endpoints, the
//! connect-time receiver setup and the sample destination are all chosen
//! here, and [`NetSdrClient::connect`] is called separately.
//!
//! # Example
//!
//! ```no_run
//! use netsdr::builder::NetSdrClientBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> netsdr_core::Result<()> {
//! let client = NetSdrClientBuilder::new()
//!     .host("192.168.1.50")
//!     .sample_rate(250_000)
//!     .response_timeout(Duration::from_secs(2))
//!     .sample_file("capture.bin")
//!     .build()?;
//!
//! client.connect().await?;
//! client.change_frequency(14_074_000, 0).await?;
//! client.start_iq().await?;
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use netsdr_core::error::{Error, Result};
use netsdr_core::sink::SampleSink;
use netsdr_core::transport::{ControlChannel, StreamChannel};
use netsdr_transport::{TcpTransport, UdpTransport};

use crate::client::{
    ClientOptions, DEFAULT_AD_MODE, DEFAULT_RF_FILTER, DEFAULT_SAMPLE_RATE, NetSdrClient,
};
use crate::sink::{BinaryFileSampleSink, DEFAULT_SAMPLE_FILE};

/// Default NetSDR TCP control port.
pub const DEFAULT_TCP_PORT: u16 = 50000;

/// Default NetSDR UDP data port.
pub const DEFAULT_UDP_PORT: u16 = 60000;

/// Default TCP connect timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Pre-built collaborators for constructing a [`NetSdrClient`] without the
/// real TCP/UDP transports.
///
/// Pass mocks from `netsdr-test-harness`, or any other
/// [`ControlChannel`]/[`StreamChannel`] implementation.
pub struct NetSdrTransports {
    /// Control link.
    pub control: Box<dyn ControlChannel>,
    /// Sample stream.
    pub stream: Box<dyn StreamChannel>,
}

/// Where decoded samples go.
enum SinkConfig {
    File(PathBuf),
    Custom(Arc<dyn SampleSink>),
}

/// Fluent builder for [`NetSdrClient`].
///
/// Every setting has a default; only the host is required for
/// [`build`](Self::build).
pub struct NetSdrClientBuilder {
    host: Option<String>,
    tcp_port: u16,
    udp_port: u16,
    connect_timeout: Duration,
    sample_rate: u64,
    rf_filter: u16,
    ad_mode: [u8; 2],
    iq_channels: u8,
    response_timeout: Option<Duration>,
    sink: SinkConfig,
}

impl NetSdrClientBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        NetSdrClientBuilder {
            host: None,
            tcp_port: DEFAULT_TCP_PORT,
            udp_port: DEFAULT_UDP_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            sample_rate: DEFAULT_SAMPLE_RATE,
            rf_filter: DEFAULT_RF_FILTER,
            ad_mode: DEFAULT_AD_MODE,
            iq_channels: 1,
            response_timeout: None,
            sink: SinkConfig::File(PathBuf::from(DEFAULT_SAMPLE_FILE)),
        }
    }

    /// Set the receiver's IP address or hostname.
    pub fn host(mut self, host: &str) -> Self {
        self.host = Some(host.to_string());
        self
    }

    /// Set the TCP control port (default: 50000).
    pub fn tcp_port(mut self, port: u16) -> Self {
        self.tcp_port = port;
        self
    }

    /// Set the local UDP port the stream is received on (default: 60000).
    pub fn udp_port(mut self, port: u16) -> Self {
        self.udp_port = port;
        self
    }

    /// Set the TCP connect timeout (default: 5s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the I/Q sample rate sent during connect (default: 100000 Hz).
    pub fn sample_rate(mut self, hz: u64) -> Self {
        self.sample_rate = hz;
        self
    }

    /// Set the RF filter sent during connect (default: 0, automatic).
    pub fn rf_filter(mut self, mode: u16) -> Self {
        self.rf_filter = mode;
        self
    }

    /// Set the A/D mode bytes sent during connect (default: `00 03`).
    pub fn ad_mode(mut self, mode: [u8; 2]) -> Self {
        self.ad_mode = mode;
        self
    }

    /// Set the channel count sent with the start command (default: 1).
    pub fn iq_channels(mut self, channels: u8) -> Self {
        self.iq_channels = channels;
        self
    }

    /// Bound the wait for each control response.
    ///
    /// Without this, requests wait until the response arrives or the
    /// connection goes away.
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = Some(timeout);
        self
    }

    /// Append samples to this file (default: `samples.bin`).
    pub fn sample_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.sink = SinkConfig::File(path.into());
        self
    }

    /// Deliver samples to a custom sink instead of a file.
    pub fn sink(mut self, sink: Arc<dyn SampleSink>) -> Self {
        self.sink = SinkConfig::Custom(sink);
        self
    }

    /// Build a client using TCP and UDP transports.
    ///
    /// Requires that [`host()`](Self::host) has been called. The client is
    /// returned unconnected.
    pub fn build(self) -> Result<NetSdrClient> {
        let host = self.host.as_ref().ok_or_else(|| {
            Error::InvalidParameter("host is required: call .host() before .build()".into())
        })?;

        let control = TcpTransport::with_timeout(
            format!("{}:{}", host, self.tcp_port),
            self.connect_timeout,
        );
        let stream = UdpTransport::on_port(self.udp_port);

        tracing::debug!(
            host = %host,
            tcp_port = self.tcp_port,
            udp_port = self.udp_port,
            "Building NetSDR client"
        );

        self.build_with_transports(NetSdrTransports {
            control: Box::new(control),
            stream: Box::new(stream),
        })
    }

    /// Build a client from caller-supplied collaborators.
    ///
    /// Host and port settings are ignored; everything else applies.
    pub fn build_with_transports(self, transports: NetSdrTransports) -> Result<NetSdrClient> {
        let sink: Arc<dyn SampleSink> = match self.sink {
            SinkConfig::File(ref path) => Arc::new(BinaryFileSampleSink::new(path)?),
            SinkConfig::Custom(ref sink) => Arc::clone(sink),
        };

        let options = ClientOptions {
            sample_rate: self.sample_rate,
            rf_filter: self.rf_filter,
            ad_mode: self.ad_mode,
            iq_channels: self.iq_channels,
            response_timeout: self.response_timeout,
        };

        Ok(NetSdrClient::new(
            transports.control,
            transports.stream,
            sink,
            options,
        ))
    }
}

impl Default for NetSdrClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
