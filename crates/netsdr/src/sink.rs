//! File-backed sample sink.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use netsdr_core::error::{Error, Result};
use netsdr_core::sink::SampleSink;

/// File name used when no path is configured.
pub const DEFAULT_SAMPLE_FILE: &str = "samples.bin";

/// Appends samples to a file as 16-bit little-endian integers.
///
/// Each value is truncated to its low 16 bits, matching the 16-bit capture
/// mode the session requests from the receiver. The file is opened in
/// append mode per batch, so nothing is created until the first non-empty
/// batch arrives.
#[derive(Debug)]
pub struct BinaryFileSampleSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl BinaryFileSampleSink {
    /// Create a sink writing to `path`.
    ///
    /// Returns [`Error::InvalidParameter`] if the path is empty or only
    /// whitespace.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.to_string_lossy().trim().is_empty() {
            return Err(Error::InvalidParameter(
                "sample file path cannot be empty or whitespace".into(),
            ));
        }
        Ok(Self {
            path: path.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    /// The file this sink appends to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for BinaryFileSampleSink {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_SAMPLE_FILE),
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl SampleSink for BinaryFileSampleSink {
    async fn store_samples(&self, samples: &[i32]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let mut buf = BytesMut::with_capacity(samples.len() * 2);
        for &sample in samples {
            buf.put_i16_le(sample as i16);
        }

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&buf).await?;
        file.flush().await?;

        tracing::trace!(
            path = %self.path.display(),
            samples = samples.len(),
            "Stored sample batch"
        );
        Ok(())
    }
}
