//! Mock control channel.
//!
//! [`MockControlChannel`] implements [`ControlChannel`] in memory. Every
//! `send()` is recorded; what comes back on the inbound channel depends on
//! the [`ResponseMode`]:
//!
//! - [`Echo`](ResponseMode::Echo): the sent bytes are returned verbatim.
//!   A NetSDR receiver acknowledges a SetControlItem by echoing it, so this
//!   is the default.
//! - [`Scripted`](ResponseMode::Scripted): each send pops the next queued
//!   response, if any.
//! - [`Silent`](ResponseMode::Silent): nothing is returned.
//!
//! # Example
//!
//! ```
//! use netsdr_test_harness::{MockControlChannel, ResponseMode};
//!
//! let mock = MockControlChannel::new();
//! let handle = mock.handle();
//! handle.set_mode(ResponseMode::Scripted);
//! handle.push_response(&[0x04, 0x60, 0x18, 0x00]);
//! // ... box `mock` into a client, then inspect `handle.sent_data()` ...
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use netsdr_core::error::{Error, Result};
use netsdr_core::transport::ControlChannel;

/// Inbound channel capacity.
const INBOUND_CAPACITY: usize = 64;

/// How the mock answers a `send()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Return the sent bytes unchanged.
    Echo,
    /// Return the next queued response.
    Scripted,
    /// Return nothing.
    Silent,
}

#[derive(Debug)]
struct Shared {
    mode: ResponseMode,
    script: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
    connect_calls: usize,
    disconnect_calls: usize,
    fail_connect: bool,
    inbound: Option<mpsc::Sender<Bytes>>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory [`ControlChannel`] for session tests.
#[derive(Debug)]
pub struct MockControlChannel {
    shared: Arc<Mutex<Shared>>,
    connected: Arc<AtomicBool>,
}

/// Cloneable handle for driving and inspecting a [`MockControlChannel`].
#[derive(Debug, Clone)]
pub struct MockControlHandle {
    shared: Arc<Mutex<Shared>>,
    connected: Arc<AtomicBool>,
}

impl MockControlChannel {
    /// Create a disconnected mock in [`ResponseMode::Echo`].
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                mode: ResponseMode::Echo,
                script: VecDeque::new(),
                sent: Vec::new(),
                connect_calls: 0,
                disconnect_calls: 0,
                fail_connect: false,
                inbound: None,
            })),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A handle sharing this mock's state.
    pub fn handle(&self) -> MockControlHandle {
        MockControlHandle {
            shared: Arc::clone(&self.shared),
            connected: Arc::clone(&self.connected),
        }
    }
}

impl Default for MockControlChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MockControlHandle {
    /// Change how subsequent sends are answered.
    pub fn set_mode(&self, mode: ResponseMode) {
        lock(&self.shared).mode = mode;
    }

    /// Queue a response for [`ResponseMode::Scripted`].
    pub fn push_response(&self, response: &[u8]) {
        lock(&self.shared).script.push_back(response.to_vec());
    }

    /// Make the next `connect()` calls fail with a transport error.
    pub fn set_fail_connect(&self, fail: bool) {
        lock(&self.shared).fail_connect = fail;
    }

    /// Every payload passed to `send()`, in order.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        lock(&self.shared).sent.clone()
    }

    /// Number of `send()` calls that reached the wire.
    pub fn sent_count(&self) -> usize {
        lock(&self.shared).sent.len()
    }

    /// Number of `connect()` calls.
    pub fn connect_calls(&self) -> usize {
        lock(&self.shared).connect_calls
    }

    /// Number of `disconnect()` calls.
    pub fn disconnect_calls(&self) -> usize {
        lock(&self.shared).disconnect_calls
    }

    /// Whether the mock currently reports connected.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Deliver bytes on the inbound channel as if the receiver sent them
    /// unprompted. Returns `false` if there is no open inbound channel.
    pub async fn inject(&self, data: &[u8]) -> bool {
        let tx = lock(&self.shared).inbound.clone();
        match tx {
            Some(tx) => tx.send(Bytes::copy_from_slice(data)).await.is_ok(),
            None => false,
        }
    }

    /// Simulate the peer closing the connection: the mock reports
    /// disconnected and the inbound channel ends.
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
        lock(&self.shared).inbound = None;
    }
}

#[async_trait]
impl ControlChannel for MockControlChannel {
    async fn connect(&mut self) -> Result<mpsc::Receiver<Bytes>> {
        let mut shared = lock(&self.shared);
        shared.connect_calls += 1;
        if shared.fail_connect {
            return Err(Error::Transport("mock connect failure".into()));
        }
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        shared.inbound = Some(tx);
        self.connected.store(true, Ordering::SeqCst);
        Ok(rx)
    }

    async fn disconnect(&mut self) -> Result<()> {
        let mut shared = lock(&self.shared);
        shared.disconnect_calls += 1;
        shared.inbound = None;
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }

        let (reply, tx) = {
            let mut shared = lock(&self.shared);
            shared.sent.push(data.to_vec());
            let reply = match shared.mode {
                ResponseMode::Echo => Some(data.to_vec()),
                ResponseMode::Scripted => shared.script.pop_front(),
                ResponseMode::Silent => None,
            };
            (reply, shared.inbound.clone())
        };

        if let (Some(reply), Some(tx)) = (reply, tx) {
            let _ = tx.send(Bytes::from(reply)).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_returns_sent_bytes() {
        let mut mock = MockControlChannel::new();
        let handle = mock.handle();

        let mut rx = mock.connect().await.unwrap();
        mock.send(&[0x05, 0x00, 0x18, 0x00, 0x80]).await.unwrap();

        assert_eq!(&rx.recv().await.unwrap()[..], &[0x05, 0x00, 0x18, 0x00, 0x80]);
        assert_eq!(handle.sent_count(), 1);
        assert_eq!(handle.connect_calls(), 1);
    }

    #[tokio::test]
    async fn scripted_pops_in_order() {
        let mut mock = MockControlChannel::new();
        let handle = mock.handle();
        handle.set_mode(ResponseMode::Scripted);
        handle.push_response(&[0x01]);
        handle.push_response(&[0x02]);

        let mut rx = mock.connect().await.unwrap();
        mock.send(&[0xAA]).await.unwrap();
        mock.send(&[0xBB]).await.unwrap();
        mock.send(&[0xCC]).await.unwrap();

        assert_eq!(&rx.recv().await.unwrap()[..], &[0x01]);
        assert_eq!(&rx.recv().await.unwrap()[..], &[0x02]);
        assert!(rx.try_recv().is_err());
        assert_eq!(handle.sent_data(), vec![vec![0xAA], vec![0xBB], vec![0xCC]]);
    }

    #[tokio::test]
    async fn silent_returns_nothing() {
        let mut mock = MockControlChannel::new();
        mock.handle().set_mode(ResponseMode::Silent);

        let mut rx = mock.connect().await.unwrap();
        mock.send(&[0x01]).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_when_disconnected_is_not_connected() {
        let mut mock = MockControlChannel::new();
        let result = mock.send(&[0x01]).await;
        assert!(matches!(result, Err(Error::NotConnected)));
        assert_eq!(mock.handle().sent_count(), 0);
    }

    #[tokio::test]
    async fn disconnect_closes_inbound() {
        let mut mock = MockControlChannel::new();
        let handle = mock.handle();
        let mut rx = mock.connect().await.unwrap();

        mock.disconnect().await.unwrap();
        assert!(!mock.is_connected());
        assert!(rx.recv().await.is_none());
        assert_eq!(handle.disconnect_calls(), 1);
    }

    #[tokio::test]
    async fn inject_and_drop_connection() {
        let mut mock = MockControlChannel::new();
        let handle = mock.handle();
        assert!(!handle.inject(&[0x01]).await);

        let mut rx = mock.connect().await.unwrap();
        assert!(handle.inject(&[0x09]).await);
        assert_eq!(&rx.recv().await.unwrap()[..], &[0x09]);

        handle.drop_connection();
        assert!(!mock.is_connected());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn fail_connect() {
        let mut mock = MockControlChannel::new();
        mock.handle().set_fail_connect(true);
        assert!(matches!(mock.connect().await, Err(Error::Transport(_))));
        assert!(!mock.is_connected());
    }
}
