//! Destination for decoded samples.

use async_trait::async_trait;

use crate::error::Result;

/// Consumer of decoded sample batches.
///
/// The session calls [`store_samples`](SampleSink::store_samples) once per
/// datagram that decoded to a non-empty batch, from the streaming task.
/// Calls may arrive back-to-back with no ordering relationship to control
/// traffic; sinks that write to storage must serialize their own writes.
#[async_trait]
pub trait SampleSink: Send + Sync {
    /// Store one batch of samples.
    async fn store_samples(&self, samples: &[i32]) -> Result<()>;
}
