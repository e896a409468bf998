//! In-memory sample sink.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use netsdr_core::error::Result;
use netsdr_core::sink::SampleSink;

/// A [`SampleSink`] that keeps every batch it is given.
///
/// Clones share the same storage, so a test can keep one clone and hand
/// another to the client.
#[derive(Debug, Clone, Default)]
pub struct MemorySampleSink {
    batches: Arc<Mutex<Vec<Vec<i32>>>>,
    stored: Arc<Notify>,
}

impl MemorySampleSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All batches stored so far, in arrival order.
    pub async fn batches(&self) -> Vec<Vec<i32>> {
        self.batches.lock().await.clone()
    }

    /// Number of `store_samples` calls.
    pub async fn batch_count(&self) -> usize {
        self.batches.lock().await.len()
    }

    /// Wait until at least `count` batches have been stored.
    ///
    /// Returns `false` if `timeout` elapses first.
    pub async fn wait_for_batches(&self, count: usize, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.stored.notified();
                if self.batches.lock().await.len() >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

#[async_trait]
impl SampleSink for MemorySampleSink {
    async fn store_samples(&self, samples: &[i32]) -> Result<()> {
        self.batches.lock().await.push(samples.to_vec());
        self.stored.notify_waiters();
        Ok(())
    }
}
