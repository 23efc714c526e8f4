//! Fixed pool of reusable input buffers.

use crate::audio::PcmCursor;
use crate::error::{Error, Result};

/// A reusable PCM buffer owned by a [`BufferPool`].
///
/// The producer fills [`data_mut`](Self::data_mut) and stamps the
/// presentation time before submitting the buffer. A buffer flagged as
/// end-of-stream carries no audio: its data is discarded.
#[derive(Debug)]
pub struct InputBuffer {
    slot: usize,
    pub(crate) data: PcmCursor,
    time_us: i64,
    end_of_stream: bool,
}

impl InputBuffer {
    fn new(slot: usize) -> Self {
        Self {
            slot,
            data: PcmCursor::default(),
            time_us: 0,
            end_of_stream: false,
        }
    }

    /// Stable identity of this buffer within its pool.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Storage to write PCM into.
    pub fn data_mut(&mut self) -> &mut Vec<u8> {
        self.data.data_mut()
    }

    /// Bytes not yet consumed.
    pub fn data(&self) -> &[u8] {
        self.data.remaining()
    }

    /// Presentation time in microseconds.
    pub fn time_us(&self) -> i64 {
        self.time_us
    }

    /// Set the presentation time in microseconds.
    pub fn set_time_us(&mut self, time_us: i64) {
        self.time_us = time_us;
    }

    /// Returns true if this buffer marks the end of input.
    pub fn is_end_of_stream(&self) -> bool {
        self.end_of_stream
    }

    /// Mark this buffer as the end of input.
    pub fn set_end_of_stream(&mut self) {
        self.end_of_stream = true;
    }

    fn reset(&mut self) {
        self.data.clear();
        self.time_us = 0;
        self.end_of_stream = false;
    }
}

/// A fixed arena of [`InputBuffer`]s.
///
/// Buffers move by value between two lock-free `kanal` queues: *available*
/// (empty, waiting for the producer) and *pending* (filled, waiting for
/// processing). A buffer held by either side is in neither queue, so the
/// producer can never be handed a buffer still being read as output.
pub struct BufferPool {
    available_tx: kanal::Sender<InputBuffer>,
    available_rx: kanal::Receiver<InputBuffer>,
    pending_tx: kanal::Sender<InputBuffer>,
    pending_rx: kanal::Receiver<InputBuffer>,
    capacity: usize,
}

impl BufferPool {
    /// Create a pool of `capacity` empty buffers.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::Config("buffer count must be non-zero".into()));
        }

        // Each queue can hold every buffer, so sends never block
        let (available_tx, available_rx) = kanal::bounded(capacity);
        let (pending_tx, pending_rx) = kanal::bounded(capacity);
        let pool = Self {
            available_tx,
            available_rx,
            pending_tx,
            pending_rx,
            capacity,
        };
        for slot in 0..capacity {
            pool.push_available(InputBuffer::new(slot))?;
        }
        Ok(pool)
    }

    /// Take an empty buffer, if one is available.
    pub fn try_take_available(&self) -> Option<InputBuffer> {
        self.available_rx.try_recv().ok().flatten()
    }

    /// Queue a filled buffer for processing.
    pub fn submit(&self, buffer: InputBuffer) -> Result<()> {
        self.pending_tx
            .send(buffer)
            .map_err(|_| Error::InvalidState("pending queue closed".into()))
    }

    /// Take the oldest filled buffer, if any.
    pub fn try_take_pending(&self) -> Option<InputBuffer> {
        self.pending_rx.try_recv().ok().flatten()
    }

    /// Clear `buffer` and make it available to the producer again.
    pub fn recycle(&self, mut buffer: InputBuffer) -> Result<()> {
        buffer.reset();
        self.push_available(buffer)
    }

    fn push_available(&self, buffer: InputBuffer) -> Result<()> {
        self.available_tx
            .send(buffer)
            .map_err(|_| Error::InvalidState("available queue closed".into()))
    }

    /// Returns true if filled buffers are waiting.
    pub fn has_pending(&self) -> bool {
        !self.pending_rx.is_empty()
    }

    /// Number of buffers available to the producer.
    pub fn available(&self) -> usize {
        self.available_rx.len()
    }

    /// Number of filled buffers waiting for processing.
    pub fn pending(&self) -> usize {
        self.pending_rx.len()
    }

    /// Total number of buffers.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("capacity", &self.capacity)
            .field("available", &self.available())
            .field("pending", &self.pending())
            .finish()
    }
}
