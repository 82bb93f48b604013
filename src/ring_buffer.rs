use std::sync::{Mutex, MutexGuard};

use crate::AidError;

/// Default receive buffer capacity.
///
/// A complete aiding burst with ephemeris for every SV is 5292 bytes
/// (32 x 112 EPH, 32 x 48 ALM, INI 56, HUI 80, POSLLH 36), so the full
/// request can overflow it; the retry rounds pick up whatever was dropped.
pub const RINGBUFFER_SIZE: usize = 5000;

#[derive(Debug)]
struct Ring {
    buffer: Box<[u8]>,
    fill: usize,
    read: usize,
    write: usize,
}

#[derive(Debug)]
/// Fixed capacity circular byte buffer shared between the transport
/// worker (writer) and the polling controller (reader).
///
/// Reads and writes are all-or-nothing: a write that does not fit and a
/// read that asks for more than is buffered move no bytes at all.
pub struct RingBuffer {
    inner: Mutex<Ring>,
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new(RINGBUFFER_SIZE)
    }
}

impl RingBuffer {
    /// Create an empty ring buffer holding up to `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Ring {
                buffer: vec![0; capacity].into_boxed_slice(),
                fill: 0,
                read: 0,
                write: 0,
            }),
        }
    }

    // The guarded state is plain bytes and cursors, a panic elsewhere
    // cannot leave it half-updated.
    fn lock(&self) -> MutexGuard<'_, Ring> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Total number of bytes the buffer can hold
    pub fn capacity(&self) -> usize {
        self.lock().buffer.len()
    }

    /// Number of bytes currently buffered
    pub fn current_size(&self) -> usize {
        self.lock().fill
    }

    /// Number of bytes that can be written before the buffer is full
    pub fn free(&self) -> usize {
        let ring = self.lock();
        ring.buffer.len() - ring.fill
    }

    /// Whether no bytes are buffered
    pub fn is_empty(&self) -> bool {
        self.lock().fill == 0
    }

    /// Whether no more bytes can be written
    pub fn is_full(&self) -> bool {
        let ring = self.lock();
        ring.fill == ring.buffer.len()
    }

    /// Append all of `data`, or nothing if it does not fit.
    pub fn write(&self, data: &[u8]) -> Result<usize, AidError> {
        let mut ring = self.lock();
        let capacity = ring.buffer.len();
        let free = capacity - ring.fill;
        if data.len() > free {
            return Err(AidError::BufferFull {
                requested: data.len(),
                free,
            });
        }
        let start = ring.write;
        let first = data.len().min(capacity - start);
        ring.buffer[start..start + first].copy_from_slice(&data[..first]);
        let rest = data.len() - first;
        ring.buffer[..rest].copy_from_slice(&data[first..]);
        if capacity > 0 {
            ring.write = (start + data.len()) % capacity;
        }
        ring.fill += data.len();
        Ok(data.len())
    }

    /// Fill all of `out` with the oldest buffered bytes, or read nothing
    /// if fewer than `out.len()` bytes are buffered.
    pub fn read(&self, out: &mut [u8]) -> Result<usize, AidError> {
        let mut ring = self.lock();
        if out.len() > ring.fill {
            return Err(AidError::BufferUnderflow {
                requested: out.len(),
                fill: ring.fill,
            });
        }
        Ok(ring.take(out))
    }

    /// Read `min(current_size, scratch.len())` bytes into `scratch` in one
    /// locked step and return how many were read.
    pub fn read_available(&self, scratch: &mut [u8]) -> usize {
        let mut ring = self.lock();
        let len = ring.fill.min(scratch.len());
        ring.take(&mut scratch[..len])
    }

    /// Drop every buffered byte and zero the storage.
    pub fn clear(&self) {
        let mut ring = self.lock();
        ring.buffer.fill(0);
        ring.fill = 0;
        ring.read = 0;
        ring.write = 0;
    }
}

impl Ring {
    // Caller guarantees out.len() <= fill.
    fn take(&mut self, out: &mut [u8]) -> usize {
        let capacity = self.buffer.len();
        let start = self.read;
        let first = out.len().min(capacity - start);
        out[..first].copy_from_slice(&self.buffer[start..start + first]);
        let rest = out.len() - first;
        out[first..].copy_from_slice(&self.buffer[..rest]);
        if capacity > 0 {
            self.read = (start + out.len()) % capacity;
        }
        self.fill -= out.len();
        out.len()
    }
}
