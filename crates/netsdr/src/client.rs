//! NetSDR protocol session.
//!
//! [`NetSdrClient`] drives a receiver over two independent links:
//!
//! - the **control channel** (TCP), used strictly request/response with at
//!   most one request outstanding;
//! - the **stream channel** (UDP), read by a background task that decodes
//!   every datagram and hands the samples to a [`SampleSink`].
//!
//! Inbound control bytes are reassembled into frames by a dispatcher task.
//! A frame resolves the outstanding request if there is one, otherwise it
//! is published as [`SessionEvent::Unsolicited`].
//!
//! The client depends only on the collaborator traits in `netsdr-core`, so
//! it runs equally against the real transports and the test harness mocks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::sync::{Mutex, broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use netsdr_core::error::{Error, MAX_FRAME_LEN, Result};
use netsdr_core::sink::SampleSink;
use netsdr_core::transport::{ControlChannel, StreamChannel};

use crate::codec;
use crate::samples;

/// Sample rate requested during connect setup (100 kHz).
pub const DEFAULT_SAMPLE_RATE: u64 = 100_000;

/// RF filter requested during connect setup: automatic.
pub const DEFAULT_RF_FILTER: u16 = 0;

/// A/D modes requested during connect setup.
pub const DEFAULT_AD_MODE: [u8; 2] = [0x00, 0x03];

/// Bit depth of the I/Q stream in 16-bit FIFO capture mode.
pub const STREAM_BIT_DEPTH: u16 = 16;

/// Broadcast channel capacity for session events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Datagram receive buffer. A datagram carries one frame.
const DATAGRAM_BUF_SIZE: usize = MAX_FRAME_LEN + 1;

/// Options for the connect-time setup and request handling.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// I/Q output sample rate in Hz.
    pub sample_rate: u64,
    /// RF filter selection.
    pub rf_filter: u16,
    /// A/D converter mode bytes.
    pub ad_mode: [u8; 2],
    /// Channel count sent with the start command.
    pub iq_channels: u8,
    /// How long to wait for a control response. `None` waits until the
    /// response arrives or the connection goes away.
    pub response_timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            rf_filter: DEFAULT_RF_FILTER,
            ad_mode: DEFAULT_AD_MODE,
            iq_channels: 1,
            response_timeout: None,
        }
    }
}

/// Session lifecycle and traffic notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The control channel connected.
    Connected,
    /// [`NetSdrClient::disconnect`] closed the control channel.
    Disconnected,
    /// The control channel closed without a disconnect call.
    ConnectionLost,
    /// The receiver acknowledged the start command.
    IqStarted,
    /// The receiver acknowledged the stop command.
    IqStopped,
    /// A complete control frame arrived with no request outstanding.
    Unsolicited(Bytes),
}

/// The response slot for the single outstanding request.
type PendingSlot = Arc<Mutex<Option<oneshot::Sender<Bytes>>>>;

/// Ownership of the stream channel.
///
/// While the streaming task runs it owns the channel and hands it back
/// when it exits.
enum StreamSlot {
    Idle(Box<dyn StreamChannel>),
    Running {
        cancel: CancellationToken,
        handle: JoinHandle<Box<dyn StreamChannel>>,
    },
    /// The streaming task panicked and took the channel with it.
    Lost,
}

/// Client for a NetSDR receiver.
///
/// All operations take `&self`; wrap the client in an `Arc` to share it
/// between tasks.
pub struct NetSdrClient {
    /// Control link. Locked only while connecting, sending or disconnecting.
    control: Mutex<Box<dyn ControlChannel>>,

    /// Held from send until response, so requests never overlap.
    request_gate: Mutex<()>,

    /// Response slot for the outstanding request.
    pending: PendingSlot,

    /// Set when the receiver acknowledges start, cleared on stop/disconnect.
    iq_started: AtomicBool,

    /// Stream channel or the task currently reading it.
    stream: Mutex<StreamSlot>,

    /// Destination for decoded samples.
    sink: Arc<dyn SampleSink>,

    /// Control frame dispatcher task.
    dispatcher: Mutex<Option<JoinHandle<()>>>,

    /// Event broadcast channel sender.
    event_tx: broadcast::Sender<SessionEvent>,

    options: ClientOptions,
}

impl NetSdrClient {
    /// Create an unconnected client from its collaborators.
    ///
    /// Most callers use [`NetSdrClientBuilder`](crate::builder::NetSdrClientBuilder)
    /// instead.
    pub fn new(
        control: Box<dyn ControlChannel>,
        stream: Box<dyn StreamChannel>,
        sink: Arc<dyn SampleSink>,
        options: ClientOptions,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            control: Mutex::new(control),
            request_gate: Mutex::new(()),
            pending: Arc::new(Mutex::new(None)),
            iq_started: AtomicBool::new(false),
            stream: Mutex::new(StreamSlot::Idle(stream)),
            sink,
            dispatcher: Mutex::new(None),
            event_tx,
            options,
        }
    }

    /// Connect the control channel and configure the receiver.
    ///
    /// Does nothing if already connected. Otherwise connects, then sends
    /// the sample rate, RF filter and A/D mode settings one at a time, each
    /// waiting for its acknowledgement. If the connection drops part way
    /// through, the remaining settings are skipped.
    pub async fn connect(&self) -> Result<()> {
        {
            let mut control = self.control.lock().await;
            if control.is_connected() {
                tracing::debug!("Already connected; skipping setup");
                return Ok(());
            }

            // A dispatcher left over from a lost connection has nothing
            // left to read.
            if let Some(stale) = self.dispatcher.lock().await.take() {
                stale.abort();
            }

            let inbound = control.connect().await?;
            let handle = tokio::spawn(dispatch_loop(
                inbound,
                Arc::clone(&self.pending),
                self.event_tx.clone(),
            ));
            *self.dispatcher.lock().await = Some(handle);
        }

        let _ = self.event_tx.send(SessionEvent::Connected);
        tracing::info!(
            sample_rate = self.options.sample_rate,
            "Control channel connected; configuring receiver"
        );

        let setup = [
            (
                "sample rate",
                codec::sample_rate_message(self.options.sample_rate)?,
            ),
            (
                "RF filter",
                codec::rf_filter_message(self.options.rf_filter)?,
            ),
            ("A/D modes", codec::ad_modes_message(self.options.ad_mode)?),
        ];

        for (step, msg) in &setup {
            if self.request(msg, step).await?.is_none() {
                tracing::warn!(step = %step, "Receiver setup interrupted");
                return Ok(());
            }
        }

        tracing::debug!("Receiver setup complete");
        Ok(())
    }

    /// Disconnect from the receiver.
    ///
    /// Stops the stream, closes the control channel and abandons any
    /// outstanding request (its caller gets `Ok(())`). Safe to call when
    /// not connected.
    pub async fn disconnect(&self) -> Result<()> {
        self.stop_stream().await;
        self.iq_started.store(false, Ordering::SeqCst);

        if let Some(handle) = self.dispatcher.lock().await.take() {
            handle.abort();
        }

        let result = {
            let mut control = self.control.lock().await;
            let was_connected = control.is_connected();
            let result = control.disconnect().await;
            if was_connected {
                let _ = self.event_tx.send(SessionEvent::Disconnected);
            }
            result
        };

        if self.pending.lock().await.take().is_some() {
            tracing::debug!("Abandoned outstanding control request");
        }

        tracing::debug!("NetSDR client disconnected");
        result
    }

    /// Start the I/Q stream.
    ///
    /// Sends the start command (I/Q mode, 16-bit FIFO capture). Once the
    /// receiver acknowledges it, [`iq_started`](Self::iq_started) becomes
    /// true and the stream channel starts listening in the background. Does
    /// nothing if not connected.
    pub async fn start_iq(&self) -> Result<()> {
        let msg = codec::receiver_state_start_message(self.options.iq_channels)?;
        if self.request(&msg, "start I/Q").await?.is_none() {
            return Ok(());
        }

        self.iq_started.store(true, Ordering::SeqCst);
        let _ = self.event_tx.send(SessionEvent::IqStarted);
        self.start_stream().await
    }

    /// Stop the I/Q stream.
    ///
    /// Sends the stop command; once acknowledged, clears
    /// [`iq_started`](Self::iq_started) and stops the stream channel. Does
    /// nothing if not connected.
    pub async fn stop_iq(&self) -> Result<()> {
        let msg = codec::receiver_state_stop_message()?;
        if self.request(&msg, "stop I/Q").await?.is_none() {
            return Ok(());
        }

        self.iq_started.store(false, Ordering::SeqCst);
        let _ = self.event_tx.send(SessionEvent::IqStopped);
        self.stop_stream().await;
        Ok(())
    }

    /// Tune `channel` to `hz`.
    ///
    /// Only the low 40 bits of `hz` are sent. Does nothing if not connected.
    pub async fn change_frequency(&self, hz: u64, channel: u8) -> Result<()> {
        let msg = codec::frequency_message(hz, channel)?;
        tracing::debug!(hz, channel, "Changing frequency");
        self.request(&msg, "change frequency").await?;
        Ok(())
    }

    /// Whether the control channel reports connected.
    pub async fn is_connected(&self) -> bool {
        self.control.lock().await.is_connected()
    }

    /// Whether the receiver has acknowledged a start without a later stop.
    pub fn iq_started(&self) -> bool {
        self.iq_started.load(Ordering::SeqCst)
    }

    /// Subscribe to session events.
    ///
    /// Each subscriber gets its own copy of every event sent after it
    /// subscribed.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// The options this client was built with.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    // -----------------------------------------------------------------------
    // Request/response
    // -----------------------------------------------------------------------

    /// Send a request, treating "not connected" as a logged no-op.
    ///
    /// `Ok(None)` means no response: either nothing was sent or the
    /// request was abandoned by a disconnect.
    async fn request(&self, msg: &[u8], op: &str) -> Result<Option<Bytes>> {
        match self.send_request(msg).await {
            Err(Error::NotConnected) => {
                tracing::warn!(op = %op, "No active connection");
                Ok(None)
            }
            other => other,
        }
    }

    /// Send one control message and wait for its response.
    async fn send_request(&self, msg: &[u8]) -> Result<Option<Bytes>> {
        let _gate = self.request_gate.lock().await;

        let (tx, rx) = oneshot::channel();
        {
            let mut control = self.control.lock().await;
            if !control.is_connected() {
                return Err(Error::NotConnected);
            }

            // The slot must be in place before the bytes leave, since the
            // reply can arrive before `send` returns.
            *self.pending.lock().await = Some(tx);

            tracing::trace!(bytes = %hex_dump(msg), "Sending control request");
            if let Err(e) = control.send(msg).await {
                self.pending.lock().await.take();
                tracing::error!(error = %e, "Failed to send control request");
                return Err(e);
            }
        }

        let outcome = match self.options.response_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    self.pending.lock().await.take();
                    tracing::warn!(
                        timeout_ms = limit.as_millis(),
                        "Timed out waiting for control response"
                    );
                    return Err(Error::Timeout);
                }
            },
            None => rx.await,
        };

        match outcome {
            Ok(response) => {
                tracing::trace!(bytes = %hex_dump(&response), "Control response received");
                Ok(Some(response))
            }
            Err(_) => {
                tracing::debug!("Control request abandoned before a response arrived");
                Ok(None)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Streaming
    // -----------------------------------------------------------------------

    /// Start listening and spawn the streaming task, unless it is running.
    async fn start_stream(&self) -> Result<()> {
        let mut slot = self.stream.lock().await;

        let mut channel = match std::mem::replace(&mut *slot, StreamSlot::Lost) {
            StreamSlot::Idle(channel) => channel,
            StreamSlot::Running { cancel, handle } => {
                if !handle.is_finished() {
                    tracing::debug!("Streaming task already running");
                    *slot = StreamSlot::Running { cancel, handle };
                    return Ok(());
                }
                match handle.await {
                    Ok(channel) => channel,
                    Err(e) => {
                        tracing::error!(error = %e, "Streaming task failed");
                        return Err(Error::StreamClosed);
                    }
                }
            }
            StreamSlot::Lost => {
                tracing::error!("Stream channel unavailable");
                return Err(Error::StreamClosed);
            }
        };

        if let Err(e) = channel.start_listening().await {
            tracing::error!(error = %e, "Failed to start stream channel");
            *slot = StreamSlot::Idle(channel);
            return Err(e);
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(stream_loop(
            channel,
            Arc::clone(&self.sink),
            cancel.clone(),
        ));
        *slot = StreamSlot::Running { cancel, handle };
        tracing::debug!("Streaming task started");
        Ok(())
    }

    /// Cancel the streaming task, take the channel back and stop listening.
    async fn stop_stream(&self) {
        let mut slot = self.stream.lock().await;

        let mut channel = match std::mem::replace(&mut *slot, StreamSlot::Lost) {
            StreamSlot::Idle(channel) => channel,
            StreamSlot::Running { cancel, handle } => {
                cancel.cancel();
                match handle.await {
                    Ok(channel) => channel,
                    Err(e) => {
                        tracing::error!(error = %e, "Streaming task failed");
                        return;
                    }
                }
            }
            StreamSlot::Lost => return,
        };

        if let Err(e) = channel.stop_listening().await {
            tracing::warn!(error = %e, "Failed to stop stream channel");
        }
        *slot = StreamSlot::Idle(channel);
    }
}

impl Drop for NetSdrClient {
    fn drop(&mut self) {
        if let Some(handle) = self.dispatcher.get_mut().take() {
            handle.abort();
        }
        if let StreamSlot::Running { cancel, .. } = self.stream.get_mut() {
            cancel.cancel();
        }
    }
}

// ---------------------------------------------------------------------------
// Control frame dispatcher
// ---------------------------------------------------------------------------

/// Reassemble inbound control bytes into frames and route each one.
///
/// Runs until the transport closes the inbound channel, then abandons any
/// outstanding request and reports the lost connection.
async fn dispatch_loop(
    mut inbound: mpsc::Receiver<Bytes>,
    pending: PendingSlot,
    event_tx: broadcast::Sender<SessionEvent>,
) {
    let mut acc = BytesMut::with_capacity(DATAGRAM_BUF_SIZE);

    while let Some(chunk) = inbound.recv().await {
        acc.extend_from_slice(&chunk);
        while let Some(frame) = codec::split_frame(&mut acc) {
            match frame {
                Ok(frame) => dispatch_frame(frame, &pending, &event_tx).await,
                Err(e) => tracing::warn!(error = %e, "Discarding unframeable control bytes"),
            }
        }
    }

    tracing::debug!("Control inbound channel closed");
    pending.lock().await.take();
    let _ = event_tx.send(SessionEvent::ConnectionLost);
}

/// Hand one frame to the waiting request, or publish it as unsolicited.
async fn dispatch_frame(
    frame: Bytes,
    pending: &PendingSlot,
    event_tx: &broadcast::Sender<SessionEvent>,
) {
    match codec::decode(&frame) {
        Ok(message) => tracing::trace!(
            msg_type = ?message.msg_type(),
            code = ?message.code(),
            bytes = %hex_dump(&frame),
            "Control frame received"
        ),
        Err(e) => {
            tracing::warn!(error = %e, bytes = %hex_dump(&frame), "Dropping undecodable control frame");
            return;
        }
    }

    let waiter = pending.lock().await.take();
    match waiter {
        Some(tx) => {
            if tx.send(frame).is_err() {
                tracing::debug!("Response arrived after its request gave up");
            }
        }
        None => {
            tracing::debug!(bytes = frame.len(), "Unsolicited control frame");
            let _ = event_tx.send(SessionEvent::Unsolicited(frame));
        }
    }
}

// ---------------------------------------------------------------------------
// Streaming loop
// ---------------------------------------------------------------------------

/// Receive datagrams until cancelled or the channel closes.
///
/// Cancellation is checked first on every iteration, so once `cancel`
/// fires no further datagram is received. Any receive error other than a
/// timeout ends the loop. Returns the channel.
async fn stream_loop(
    mut channel: Box<dyn StreamChannel>,
    sink: Arc<dyn SampleSink>,
    cancel: CancellationToken,
) -> Box<dyn StreamChannel> {
    let mut buf = vec![0u8; DATAGRAM_BUF_SIZE];

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                tracing::debug!("Streaming task cancelled");
                break;
            }

            result = channel.recv_datagram(&mut buf) => {
                match result {
                    Ok(n) => handle_datagram(&buf[..n], sink.as_ref()).await,
                    Err(Error::Timeout) => continue,
                    Err(e) => {
                        tracing::warn!(error = %e, "Stream receive failed; streaming task exiting");
                        break;
                    }
                }
            }
        }
    }

    channel
}

/// Decode one datagram and store its samples.
async fn handle_datagram(datagram: &[u8], sink: &dyn SampleSink) {
    let message = match codec::decode(datagram) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(error = %e, bytes = datagram.len(), "Dropping undecodable datagram");
            return;
        }
    };

    let batch: Vec<i32> = match samples::decode_samples(STREAM_BIT_DEPTH, message.body()) {
        Ok(samples) => samples.collect(),
        Err(e) => {
            tracing::warn!(error = %e, sequence = ?message.sequence(), "Dropping datagram body");
            return;
        }
    };

    tracing::trace!(
        sequence = ?message.sequence(),
        body = %hex_dump(message.body()),
        "Samples received"
    );

    if batch.is_empty() {
        return;
    }

    if let Err(e) = sink.store_samples(&batch).await {
        tracing::error!(error = %e, samples = batch.len(), "Sample sink rejected batch");
    }
}

/// Space-separated uppercase hex, or `<empty>`.
fn hex_dump(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "<empty>".to_string();
    }
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use netsdr_test_harness::{
        MemorySampleSink, MockControlChannel, MockControlHandle, MockStreamChannel,
        MockStreamHandle, ResponseMode,
    };

    use crate::codec::{ControlItemCode, MessageType};

    const WAIT: Duration = Duration::from_secs(2);

    struct Fixture {
        client: Arc<NetSdrClient>,
        control: MockControlHandle,
        stream: MockStreamHandle,
        sink: MemorySampleSink,
    }

    fn fixture_with(options: ClientOptions) -> Fixture {
        let control = MockControlChannel::new();
        let stream = MockStreamChannel::new();
        let sink = MemorySampleSink::new();
        let (control_handle, stream_handle) = (control.handle(), stream.handle());
        Fixture {
            client: Arc::new(NetSdrClient::new(
                Box::new(control),
                Box::new(stream),
                Arc::new(sink.clone()),
                options,
            )),
            control: control_handle,
            stream: stream_handle,
            sink,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(ClientOptions::default())
    }

    fn data_item(body: &[u8]) -> Vec<u8> {
        let mut params = 42u16.to_le_bytes().to_vec();
        params.extend_from_slice(body);
        codec::encode_data_item(MessageType::DataItem0, &params).unwrap()
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(WAIT, async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    async fn next_matching(
        rx: &mut broadcast::Receiver<SessionEvent>,
        pred: impl Fn(&SessionEvent) -> bool,
    ) -> SessionEvent {
        tokio::time::timeout(WAIT, async {
            loop {
                let event = rx.recv().await.expect("event channel closed");
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("event not received in time")
    }

    // -- connect / disconnect --

    #[tokio::test]
    async fn connect_sends_setup_sequence() {
        let f = fixture();
        f.client.connect().await.unwrap();

        assert!(f.client.is_connected().await);
        assert_eq!(f.control.connect_calls(), 1);
        assert_eq!(
            f.control.sent_data(),
            vec![
                vec![0x09, 0x00, 0xB8, 0x00, 0xA0, 0x86, 0x01, 0x00, 0x00],
                vec![0x06, 0x00, 0x44, 0x00, 0x00, 0x00],
                vec![0x06, 0x00, 0x8A, 0x00, 0x00, 0x03],
            ]
        );
    }

    #[tokio::test]
    async fn connect_when_connected_sends_nothing() {
        let f = fixture();
        f.client.connect().await.unwrap();
        f.client.connect().await.unwrap();

        assert_eq!(f.control.connect_calls(), 1);
        assert_eq!(f.control.sent_count(), 3);
    }

    #[tokio::test]
    async fn connect_uses_configured_setup() {
        let f = fixture_with(ClientOptions {
            sample_rate: 2_000_000,
            rf_filter: 3,
            ad_mode: [0x01, 0x00],
            ..ClientOptions::default()
        });
        f.client.connect().await.unwrap();

        let sent = f.control.sent_data();
        assert_eq!(sent[0], codec::sample_rate_message(2_000_000).unwrap());
        assert_eq!(sent[1], codec::rf_filter_message(3).unwrap());
        assert_eq!(sent[2], codec::ad_modes_message([0x01, 0x00]).unwrap());
    }

    #[tokio::test]
    async fn connect_failure_propagates() {
        let f = fixture();
        f.control.set_fail_connect(true);

        let result = f.client.connect().await;
        assert!(matches!(result, Err(Error::Transport(_))));
        assert!(!f.client.is_connected().await);
        assert_eq!(f.control.sent_count(), 0);
    }

    #[tokio::test]
    async fn connect_stops_setup_when_link_drops() {
        let f = fixture();
        f.control.set_mode(ResponseMode::Silent);

        let client = Arc::clone(&f.client);
        let task = tokio::spawn(async move { client.connect().await });
        wait_until(|| f.control.sent_count() == 1).await;

        f.control.drop_connection();

        tokio::time::timeout(WAIT, task).await.unwrap().unwrap().unwrap();
        assert_eq!(f.control.sent_count(), 1);
        assert!(!f.client.is_connected().await);
    }

    #[tokio::test]
    async fn disconnect_without_connection_is_safe() {
        let f = fixture();
        f.client.disconnect().await.unwrap();
        assert_eq!(f.control.disconnect_calls(), 1);
        assert!(!f.client.is_connected().await);
    }

    #[tokio::test]
    async fn disconnect_after_connect() {
        let f = fixture();
        let mut events = f.client.subscribe();
        f.client.connect().await.unwrap();
        f.client.start_iq().await.unwrap();

        f.client.disconnect().await.unwrap();

        assert!(!f.client.is_connected().await);
        assert!(!f.client.iq_started());
        assert!(!f.stream.is_listening());
        next_matching(&mut events, |e| *e == SessionEvent::Disconnected).await;
    }

    #[tokio::test]
    async fn reconnect_repeats_setup() {
        let f = fixture();
        f.client.connect().await.unwrap();
        f.client.disconnect().await.unwrap();
        f.client.connect().await.unwrap();

        assert_eq!(f.control.connect_calls(), 2);
        assert_eq!(f.control.sent_count(), 6);
    }

    // -- start / stop --

    #[tokio::test]
    async fn start_iq_without_connection_sends_nothing() {
        let f = fixture();
        f.client.start_iq().await.unwrap();

        assert_eq!(f.control.sent_count(), 0);
        assert!(!f.client.iq_started());
        assert_eq!(f.stream.start_calls(), 0);
    }

    #[tokio::test]
    async fn start_iq_sets_flag_and_starts_stream() {
        let f = fixture();
        f.client.connect().await.unwrap();
        f.client.start_iq().await.unwrap();

        assert!(f.client.iq_started());
        assert_eq!(f.stream.start_calls(), 1);
        assert_eq!(
            f.control.sent_data().last().unwrap(),
            &codec::receiver_state_start_message(1).unwrap()
        );
    }

    #[tokio::test]
    async fn start_iq_twice_keeps_one_stream() {
        let f = fixture();
        f.client.connect().await.unwrap();
        f.client.start_iq().await.unwrap();
        f.client.start_iq().await.unwrap();

        assert_eq!(f.control.sent_count(), 5);
        assert_eq!(f.stream.start_calls(), 1);
    }

    #[tokio::test]
    async fn stop_iq_without_connection_sends_nothing() {
        let f = fixture();
        f.client.stop_iq().await.unwrap();

        assert_eq!(f.control.sent_count(), 0);
        assert_eq!(f.stream.stop_calls(), 0);
    }

    #[tokio::test]
    async fn stop_iq_clears_flag_and_stops_stream() {
        let f = fixture();
        f.client.connect().await.unwrap();
        f.client.start_iq().await.unwrap();
        f.client.stop_iq().await.unwrap();

        assert!(!f.client.iq_started());
        assert!(!f.stream.is_listening());
        assert_eq!(f.stream.stop_calls(), 1);
        assert_eq!(
            f.control.sent_data().last().unwrap(),
            &codec::receiver_state_stop_message().unwrap()
        );
    }

    #[tokio::test]
    async fn stop_iq_without_start_still_stops_listening() {
        let f = fixture();
        f.client.connect().await.unwrap();
        f.client.stop_iq().await.unwrap();

        assert!(!f.client.iq_started());
        assert_eq!(f.stream.stop_calls(), 1);
    }

    #[tokio::test]
    async fn start_after_stop_restarts_stream() {
        let f = fixture();
        f.client.connect().await.unwrap();
        f.client.start_iq().await.unwrap();
        f.client.stop_iq().await.unwrap();
        f.client.start_iq().await.unwrap();

        assert_eq!(f.stream.start_calls(), 2);
        f.stream.send_datagram(&data_item(&[0x05, 0x00]));
        assert!(f.sink.wait_for_batches(1, WAIT).await);
    }

    // -- frequency --

    #[tokio::test]
    async fn change_frequency_sends_channel_and_frequency() {
        let f = fixture();
        f.client.connect().await.unwrap();
        f.client.change_frequency(100_000_000, 1).await.unwrap();

        let sent = f.control.sent_data();
        assert_eq!(sent.len(), 4);
        let message = codec::decode(&sent[3]).unwrap();
        assert_eq!(message.msg_type(), MessageType::SetControlItem);
        assert_eq!(message.code(), Some(ControlItemCode::ReceiverFrequency));
        assert_eq!(message.body(), &[0x01, 0x00, 0xE1, 0xF5, 0x05, 0x00]);
    }

    #[tokio::test]
    async fn change_frequency_without_connection_sends_nothing() {
        let f = fixture();
        f.client.change_frequency(100_000_000, 1).await.unwrap();
        assert_eq!(f.control.sent_count(), 0);
    }

    // -- streaming --

    #[tokio::test]
    async fn datagram_samples_reach_sink() {
        let f = fixture();
        f.client.connect().await.unwrap();
        f.client.start_iq().await.unwrap();

        f.stream.send_datagram(&data_item(&[0x01, 0x00, 0x02, 0x00]));

        assert!(f.sink.wait_for_batches(1, WAIT).await);
        assert_eq!(f.sink.batches().await, vec![vec![1, 2]]);
    }

    #[tokio::test]
    async fn empty_body_does_not_reach_sink() {
        let f = fixture();
        f.client.connect().await.unwrap();
        f.client.start_iq().await.unwrap();

        f.stream.send_datagram(&data_item(&[]));
        f.stream.send_datagram(&data_item(&[0x07, 0x00]));

        assert!(f.sink.wait_for_batches(1, WAIT).await);
        assert_eq!(f.sink.batches().await, vec![vec![7]]);
    }

    #[tokio::test]
    async fn corrupted_datagram_is_ignored() {
        let f = fixture();
        f.client.connect().await.unwrap();
        f.client.start_iq().await.unwrap();

        let valid = data_item(&[0x01, 0x00]);
        f.stream.send_datagram(&valid[..valid.len() - 1]);
        f.stream.send_datagram(&data_item(&[0x09, 0x00]));

        assert!(f.sink.wait_for_batches(1, WAIT).await);
        assert_eq!(f.sink.batches().await, vec![vec![9]]);
    }

    #[tokio::test]
    async fn misaligned_body_is_ignored() {
        let f = fixture();
        f.client.connect().await.unwrap();
        f.client.start_iq().await.unwrap();

        f.stream.send_datagram(&data_item(&[0x01, 0x00, 0x02]));
        f.stream.send_datagram(&data_item(&[0xFF, 0xFF]));

        assert!(f.sink.wait_for_batches(1, WAIT).await);
        assert_eq!(f.sink.batches().await, vec![vec![-1]]);
    }

    #[tokio::test]
    async fn receive_error_ends_streaming() {
        let f = fixture();
        f.client.connect().await.unwrap();
        f.client.start_iq().await.unwrap();

        f.stream.fail_receive(std::io::ErrorKind::ConnectionReset);
        f.stream.send_datagram(&data_item(&[0x01, 0x00]));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(f.stream.received_count(), 0);
        assert_eq!(f.sink.batch_count().await, 0);

        // The channel came back from the finished task; a restart picks up
        // the datagram left in the queue.
        f.client.stop_iq().await.unwrap();
        f.client.start_iq().await.unwrap();
        f.stream.send_datagram(&data_item(&[0x02, 0x00]));
        assert!(f.sink.wait_for_batches(2, WAIT).await);
        assert_eq!(f.sink.batches().await, vec![vec![1], vec![2]]);
    }

    #[tokio::test]
    async fn no_samples_after_stop() {
        let f = fixture();
        f.client.connect().await.unwrap();
        f.client.start_iq().await.unwrap();
        f.client.stop_iq().await.unwrap();

        f.stream.send_datagram(&data_item(&[0x01, 0x00]));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(f.stream.received_count(), 0);
        assert_eq!(f.sink.batch_count().await, 0);
    }

    // -- dispatcher --

    #[tokio::test]
    async fn unsolicited_frame_is_published() {
        let f = fixture();
        let mut events = f.client.subscribe();
        f.client.connect().await.unwrap();

        let frame = codec::encode_control_item(
            MessageType::CurrentControlItem,
            ControlItemCode::ReceiverState,
            &[0x00, 0x0C],
        )
        .unwrap();
        assert!(f.control.inject(&frame).await);

        let event = next_matching(&mut events, |e| matches!(e, SessionEvent::Unsolicited(_))).await;
        assert_eq!(event, SessionEvent::Unsolicited(Bytes::from(frame)));
    }

    #[tokio::test]
    async fn fragmented_response_is_reassembled() {
        let f = fixture();
        f.client.connect().await.unwrap();
        f.control.set_mode(ResponseMode::Silent);

        let client = Arc::clone(&f.client);
        let task = tokio::spawn(async move { client.change_frequency(7_100_000, 0).await });
        wait_until(|| f.control.sent_count() == 4).await;

        let reply = codec::frequency_message(7_100_000, 0).unwrap();
        assert!(f.control.inject(&reply[..3]).await);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());

        assert!(f.control.inject(&reply[3..]).await);
        tokio::time::timeout(WAIT, task).await.unwrap().unwrap().unwrap();
    }

    #[tokio::test]
    async fn coalesced_frames_are_split() {
        let f = fixture();
        let mut events = f.client.subscribe();
        f.client.connect().await.unwrap();
        f.control.set_mode(ResponseMode::Silent);

        let client = Arc::clone(&f.client);
        let task = tokio::spawn(async move { client.change_frequency(14_000_000, 0).await });
        wait_until(|| f.control.sent_count() == 4).await;

        // Response and an unsolicited status in one read.
        let mut chunk = codec::frequency_message(14_000_000, 0).unwrap();
        let status = codec::encode_control_item(
            MessageType::CurrentControlItem,
            ControlItemCode::AdModes,
            &[0x00, 0x03],
        )
        .unwrap();
        chunk.extend_from_slice(&status);
        assert!(f.control.inject(&chunk).await);

        tokio::time::timeout(WAIT, task).await.unwrap().unwrap().unwrap();
        let event = next_matching(&mut events, |e| matches!(e, SessionEvent::Unsolicited(_))).await;
        assert_eq!(event, SessionEvent::Unsolicited(Bytes::from(status)));
    }

    #[tokio::test]
    async fn undecodable_frame_does_not_resolve_request() {
        let f = fixture();
        f.client.connect().await.unwrap();
        f.control.set_mode(ResponseMode::Silent);

        let client = Arc::clone(&f.client);
        let task = tokio::spawn(async move { client.change_frequency(1_000_000, 0).await });
        wait_until(|| f.control.sent_count() == 4).await;

        // Header-only frame: too short for a control-item code.
        assert!(f.control.inject(&[0x02, 0x00]).await);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());

        assert!(f.control.inject(&codec::rf_filter_message(0).unwrap()).await);
        tokio::time::timeout(WAIT, task).await.unwrap().unwrap().unwrap();
    }

    #[tokio::test]
    async fn overlapping_requests_are_serialized() {
        let f = fixture();
        f.client.connect().await.unwrap();
        f.control.set_mode(ResponseMode::Silent);

        let a = {
            let client = Arc::clone(&f.client);
            tokio::spawn(async move { client.change_frequency(1_000_000, 0).await })
        };
        let b = {
            let client = Arc::clone(&f.client);
            tokio::spawn(async move { client.change_frequency(2_000_000, 0).await })
        };

        wait_until(|| f.control.sent_count() == 4).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(f.control.sent_count(), 4, "second request must wait");

        let ack = codec::rf_filter_message(0).unwrap();
        assert!(f.control.inject(&ack).await);
        wait_until(|| f.control.sent_count() == 5).await;
        assert!(f.control.inject(&ack).await);

        tokio::time::timeout(WAIT, a).await.unwrap().unwrap().unwrap();
        tokio::time::timeout(WAIT, b).await.unwrap().unwrap().unwrap();
    }

    #[tokio::test]
    async fn response_timeout_clears_slot() {
        let f = fixture_with(ClientOptions {
            response_timeout: Some(Duration::from_millis(50)),
            ..ClientOptions::default()
        });
        f.control.set_mode(ResponseMode::Silent);

        let result = f.client.connect().await;
        assert!(matches!(result, Err(Error::Timeout)));
        assert_eq!(f.control.sent_count(), 1);

        f.control.set_mode(ResponseMode::Echo);
        f.client.change_frequency(5_000_000, 0).await.unwrap();
        assert_eq!(f.control.sent_count(), 2);
    }

    #[tokio::test]
    async fn disconnect_abandons_outstanding_request() {
        let f = fixture();
        f.client.connect().await.unwrap();
        f.control.set_mode(ResponseMode::Silent);

        let client = Arc::clone(&f.client);
        let task = tokio::spawn(async move { client.start_iq().await });
        wait_until(|| f.control.sent_count() == 4).await;

        f.client.disconnect().await.unwrap();

        tokio::time::timeout(WAIT, task).await.unwrap().unwrap().unwrap();
        assert!(!f.client.iq_started());
        assert_eq!(f.stream.start_calls(), 0);
    }

    #[tokio::test]
    async fn peer_close_reports_connection_lost() {
        let f = fixture();
        let mut events = f.client.subscribe();
        f.client.connect().await.unwrap();

        f.control.drop_connection();

        next_matching(&mut events, |e| *e == SessionEvent::ConnectionLost).await;
        assert!(!f.client.is_connected().await);

        f.client.change_frequency(1_000_000, 0).await.unwrap();
        assert_eq!(f.control.sent_count(), 3);
    }

    #[tokio::test]
    async fn lifecycle_events() {
        let f = fixture();
        let mut events = f.client.subscribe();
        f.client.connect().await.unwrap();
        f.client.start_iq().await.unwrap();
        f.client.stop_iq().await.unwrap();

        assert_eq!(events.recv().await.unwrap(), SessionEvent::Connected);
        assert_eq!(events.recv().await.unwrap(), SessionEvent::IqStarted);
        assert_eq!(events.recv().await.unwrap(), SessionEvent::IqStopped);
    }

    #[test]
    fn hex_dump_format() {
        assert_eq!(hex_dump(&[]), "<empty>");
        assert_eq!(hex_dump(&[0x0A, 0xFF, 0x00]), "0A FF 00");
    }

    #[test]
    fn default_options() {
        let options = ClientOptions::default();
        assert_eq!(options.sample_rate, 100_000);
        assert_eq!(options.rf_filter, 0);
        assert_eq!(options.ad_mode, [0x00, 0x03]);
        assert_eq!(options.iq_channels, 1);
        assert!(options.response_timeout.is_none());
    }
}
