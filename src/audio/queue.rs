//! Bounded handoff between the network and the speaker thread

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use serde::Serialize;

use super::AudioChunk;

/// Outcome of offering a chunk to the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    Queued,
    /// The queue was full; the chunk was freed
    Dropped,
}

/// Snapshot of queue occupancy and lifetime counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub depth: usize,
    pub capacity: usize,
    pub enqueued: u64,
    pub dropped: u64,
}

/// Multi-producer, single-consumer FIFO of [`AudioChunk`]s with drop-newest overflow
///
/// Producers never block: offering to a full queue frees the incoming chunk
/// and leaves the queued ones untouched.
pub struct PlaybackQueue {
    tx: Sender<AudioChunk>,
    rx: Receiver<AudioChunk>,
    enqueued: AtomicU64,
    dropped: AtomicU64,
}

impl PlaybackQueue {
    /// Create a queue holding at most `capacity` chunks (minimum 1)
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        Self {
            tx,
            rx,
            enqueued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Try to enqueue without blocking
    pub fn offer(&self, chunk: AudioChunk) -> Enqueue {
        match self.tx.try_send(chunk) {
            Ok(()) => {
                self.enqueued.fetch_add(1, Ordering::Relaxed);
                Enqueue::Queued
            }
            Err(TrySendError::Full(chunk) | TrySendError::Disconnected(chunk)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(bytes = chunk.len(), "playback queue full, chunk dropped");
                Enqueue::Dropped
            }
        }
    }

    /// Wait up to `timeout` for the oldest chunk
    #[must_use]
    pub fn take(&self, timeout: Duration) -> Option<AudioChunk> {
        match self.rx.recv_timeout(timeout) {
            Ok(chunk) => Some(chunk),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.rx.capacity().unwrap_or_default()
    }

    #[must_use]
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            depth: self.len(),
            capacity: self.capacity(),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}
