//! # Chunked Characteristic Writes
//!
//! A BLE write carries at most `MTU - 3` bytes, and many cheap printers
//! never negotiate past the 23-byte default MTU. Payloads are therefore
//! split into small slices and written strictly one after another:
//!
//! ```text
//! payload: [........................................................]
//! chunks:  [20 bytes][20 bytes][20 bytes]...[≤20 bytes]
//!             │ await   │ await   │ await      │ await
//!             ▼         ▼         ▼            ▼
//!          characteristic (one write in flight at a time)
//! ```
//!
//! There is no retry. A failed chunk aborts the rest of the payload and is
//! reported as [`PrinterError::WriteFailure`], except that a write that
//! outlives the chunker's timeout is [`PrinterError::Timeout`] and a link
//! that went down is [`PrinterError::NotConnected`].
//!
//! Each call holds the handle's write lock from its first chunk to its
//! last. A receipt made of several segments goes through
//! [`Chunker::send_segments`] so the whole job is one critical section.

use std::fmt;
use std::slice::Chunks;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;

use super::host::{GattCharacteristic, GattSession};
use crate::error::{PrinterError, Result};

/// Conservative payload size that fits the default 23-byte ATT MTU.
pub const DEFAULT_CHUNK_SIZE: usize = 20;

/// The writable characteristic of one connected session.
///
/// Cloning is cheap and every clone shares validity: once the session that
/// produced the handle disconnects, all clones refuse to write.
#[derive(Clone)]
pub struct CharacteristicHandle {
    gatt: Arc<dyn GattSession>,
    characteristic: GattCharacteristic,
    live: Arc<AtomicBool>,
    write_lock: Arc<Mutex<()>>,
}

impl CharacteristicHandle {
    pub(crate) fn new(gatt: Arc<dyn GattSession>, characteristic: GattCharacteristic) -> Self {
        Self {
            gatt,
            characteristic,
            live: Arc::new(AtomicBool::new(true)),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn characteristic(&self) -> &GattCharacteristic {
        &self.characteristic
    }

    /// False once the owning session has disconnected.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    pub(crate) fn invalidate(&self) {
        self.live.store(false, Ordering::Release);
    }

    pub(crate) fn gatt(&self) -> &Arc<dyn GattSession> {
        &self.gatt
    }

    /// Negotiated per-write limit, when the host reports one.
    pub fn max_write_len(&self) -> Option<usize> {
        self.gatt.max_write_len()
    }
}

impl fmt::Debug for CharacteristicHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CharacteristicHandle")
            .field("characteristic", &self.characteristic)
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// Split a payload into slices of at most `chunk_size` bytes.
///
/// ```
/// use blethermal::transport::chunker::split;
///
/// let parts: Vec<&[u8]> = split(&[1, 2, 3, 4, 5], 2)?.collect();
/// assert_eq!(parts, vec![&[1, 2][..], &[3, 4][..], &[5][..]]);
/// # Ok::<(), blethermal::PrinterError>(())
/// ```
pub fn split(data: &[u8], chunk_size: usize) -> Result<Chunks<'_, u8>> {
    if chunk_size == 0 {
        return Err(PrinterError::InvalidOptions(
            "chunk size must be at least 1 byte".to_string(),
        ));
    }
    Ok(data.chunks(chunk_size))
}

/// Sequential chunk writer.
///
/// ## Example
///
/// ```no_run
/// # async fn demo(handle: blethermal::transport::CharacteristicHandle) -> blethermal::error::Result<()> {
/// use blethermal::transport::Chunker;
///
/// let chunker = Chunker::new(20)?;
/// chunker.send(&handle, b"HELLO\r\n").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    write_timeout: Option<Duration>,
    chunk_delay: Duration,
}

impl Chunker {
    pub fn new(chunk_size: usize) -> Result<Self> {
        split(&[], chunk_size)?;
        Ok(Self {
            chunk_size,
            write_timeout: None,
            chunk_delay: Duration::ZERO,
        })
    }

    /// Bound each chunk write; an expired write is [`PrinterError::Timeout`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    /// Pause between chunks. Some printers drop unacknowledged writes that
    /// arrive back to back.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Requested size clamped to the link's negotiated limit.
    pub fn effective_chunk_size(&self, handle: &CharacteristicHandle) -> usize {
        match handle.max_write_len() {
            Some(limit) if limit > 0 => self.chunk_size.min(limit),
            _ => self.chunk_size,
        }
    }

    /// Write `data` to the characteristic, one chunk at a time.
    ///
    /// Concurrent callers on the same handle are serialized for the whole
    /// payload, so two payloads never interleave on the wire.
    pub async fn send(&self, handle: &CharacteristicHandle, data: &[u8]) -> Result<()> {
        let _guard = handle.write_lock.lock().await;
        self.write_chunks(handle, data).await
    }

    /// Write several payloads back to back under a single lock.
    ///
    /// Nothing from another caller lands between the segments. The first
    /// failing segment stops the rest.
    pub async fn send_segments<'a, I>(
        &self,
        handle: &CharacteristicHandle,
        segments: I,
    ) -> Result<()>
    where
        I: IntoIterator<Item = (&'static str, &'a [u8])>,
    {
        let _guard = handle.write_lock.lock().await;
        for (segment, data) in segments {
            if let Err(e) = self.write_chunks(handle, data).await {
                tracing::warn!(segment, error = %e, "Payload aborted");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Caller holds the write lock.
    async fn write_chunks(&self, handle: &CharacteristicHandle, data: &[u8]) -> Result<()> {
        let size = self.effective_chunk_size(handle);
        let kind = handle.characteristic().preferred_write();
        let total = data.len().div_ceil(size);
        tracing::debug!(
            total_bytes = data.len(),
            chunk_size = size,
            chunks = total,
            "Writing payload"
        );

        for (i, chunk) in split(data, size)?.enumerate() {
            if !handle.is_valid() {
                return Err(PrinterError::NotConnected);
            }

            let write = handle.gatt().write(handle.characteristic(), chunk, kind);
            let result = match self.write_timeout {
                Some(after) => tokio::time::timeout(after, write).await.map_err(|_| {
                    PrinterError::Timeout {
                        operation: "characteristic write",
                        after,
                    }
                })?,
                None => write.await,
            };

            result.map_err(|e| match e {
                PrinterError::NotConnected | PrinterError::WriteFailure(_) => e,
                other => {
                    PrinterError::WriteFailure(format!("chunk {}/{}: {}", i + 1, total, other))
                }
            })?;

            if !self.chunk_delay.is_zero() && i + 1 < total {
                tokio::time::sleep(self.chunk_delay).await;
            }
        }

        Ok(())
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            write_timeout: None,
            chunk_delay: Duration::ZERO,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
