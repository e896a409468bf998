//! Mock stream channel.
//!
//! [`MockStreamChannel`] implements [`StreamChannel`] over an in-memory
//! queue. Datagrams pushed through a [`MockStreamHandle`] are returned by
//! `recv_datagram()` in order; with nothing queued, `recv_datagram()` waits.
//! A queued failure makes one `recv_datagram()` call return an I/O error.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex, mpsc};

use netsdr_core::error::{Error, Result};
use netsdr_core::transport::StreamChannel;

/// One queued `recv_datagram()` outcome.
#[derive(Debug)]
enum Queued {
    Datagram(Bytes),
    Fail(io::ErrorKind),
}

/// In-memory [`StreamChannel`] for session tests.
#[derive(Debug)]
pub struct MockStreamChannel {
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Queued>>>,
    tx: mpsc::UnboundedSender<Queued>,
    listening: Arc<AtomicBool>,
    start_calls: Arc<AtomicUsize>,
    stop_calls: Arc<AtomicUsize>,
    received: Arc<AtomicUsize>,
}

/// Cloneable handle for feeding and inspecting a [`MockStreamChannel`].
#[derive(Debug, Clone)]
pub struct MockStreamHandle {
    tx: mpsc::UnboundedSender<Queued>,
    listening: Arc<AtomicBool>,
    start_calls: Arc<AtomicUsize>,
    stop_calls: Arc<AtomicUsize>,
    received: Arc<AtomicUsize>,
}

impl MockStreamChannel {
    /// Create an idle mock with an empty queue.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            rx: Arc::new(Mutex::new(rx)),
            tx,
            listening: Arc::new(AtomicBool::new(false)),
            start_calls: Arc::new(AtomicUsize::new(0)),
            stop_calls: Arc::new(AtomicUsize::new(0)),
            received: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A handle sharing this mock's state.
    pub fn handle(&self) -> MockStreamHandle {
        MockStreamHandle {
            tx: self.tx.clone(),
            listening: Arc::clone(&self.listening),
            start_calls: Arc::clone(&self.start_calls),
            stop_calls: Arc::clone(&self.stop_calls),
            received: Arc::clone(&self.received),
        }
    }
}

impl Default for MockStreamChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStreamHandle {
    /// Queue a datagram for the next `recv_datagram()`.
    pub fn send_datagram(&self, data: &[u8]) {
        let _ = self.tx.send(Queued::Datagram(Bytes::copy_from_slice(data)));
    }

    /// Queue a receive failure with the given I/O error kind.
    pub fn fail_receive(&self, kind: io::ErrorKind) {
        let _ = self.tx.send(Queued::Fail(kind));
    }

    /// Whether `start_listening()` has been called more recently than
    /// `stop_listening()`.
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Number of `start_listening()` calls.
    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    /// Number of `stop_listening()` calls.
    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    /// Number of datagrams handed out by `recv_datagram()`.
    pub fn received_count(&self) -> usize {
        self.received.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamChannel for MockStreamChannel {
    async fn start_listening(&mut self) -> Result<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        self.listening.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn recv_datagram(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.listening.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }
        let mut rx = self.rx.lock().await;
        let datagram = match rx.recv().await.ok_or(Error::StreamClosed)? {
            Queued::Datagram(datagram) => datagram,
            Queued::Fail(kind) => return Err(Error::Io(kind.into())),
        };
        let n = datagram.len().min(buf.len());
        buf[..n].copy_from_slice(&datagram[..n]);
        self.received.fetch_add(1, Ordering::SeqCst);
        Ok(n)
    }

    async fn stop_listening(&mut self) -> Result<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.listening.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }
}
