//! Speaker playback thread
//!
//! Runs for the whole process, independent of any connection. It owns the
//! output hardware, drains the [`PlaybackQueue`] and plays each chunk as
//! interleaved stereo. Chunks that arrive while no speaker client is connected,
//! or while no output device could be opened, are discarded.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use serde::Serialize;

use super::{AudioChunk, MAX_PLAYBACK_SAMPLES, PlaybackQueue};
use crate::Result;
use crate::context::{MediaContext, SessionGate};

/// An open output stream accepting interleaved stereo samples
pub trait SpeakerStream {
    /// Blocking write of interleaved left/right samples
    ///
    /// # Errors
    ///
    /// Returns an error if the hardware rejects the write
    fn write(&mut self, stereo: &[i16]) -> Result<()>;
}

/// Output hardware, opened once by the playback thread
pub trait SpeakerSink: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if no output device is available
    fn open(&self) -> Result<Box<dyn SpeakerStream>>;
}

/// Duplicate each mono sample into a left/right pair
///
/// At most [`MAX_PLAYBACK_SAMPLES`] mono samples are taken; the rest of the
/// chunk is truncated. Returns the number of mono samples written to `out`.
pub fn mono_to_stereo(chunk: &AudioChunk, out: &mut Vec<i16>) -> usize {
    out.clear();
    for sample in chunk.samples().take(MAX_PLAYBACK_SAMPLES) {
        out.extend_from_slice(&[sample, sample]);
    }
    out.len() / 2
}

/// Lifetime counters shared with `/health`
#[derive(Debug, Default)]
pub struct PlaybackCounters {
    played: AtomicU64,
    discarded: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlaybackStats {
    pub played: u64,
    pub discarded: u64,
    pub failed: u64,
}

impl PlaybackCounters {
    #[must_use]
    pub fn stats(&self) -> PlaybackStats {
        PlaybackStats {
            played: self.played.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// The speaker side of the audio pipeline
pub struct SpeakerPlayback {
    queue: Arc<PlaybackQueue>,
    sessions: Arc<SessionGate>,
    counters: Arc<PlaybackCounters>,
    sink: Arc<dyn SpeakerSink>,
    poll: Duration,
}

impl SpeakerPlayback {
    #[must_use]
    pub fn new(
        queue: Arc<PlaybackQueue>,
        sessions: Arc<SessionGate>,
        counters: Arc<PlaybackCounters>,
        sink: Arc<dyn SpeakerSink>,
    ) -> Self {
        Self {
            queue,
            sessions,
            counters,
            sink,
            poll: Duration::from_millis(100),
        }
    }

    /// Wire playback to a context's queue, speaker sessions and counters
    #[must_use]
    pub fn for_context(ctx: &MediaContext, sink: Arc<dyn SpeakerSink>) -> Self {
        Self::new(
            Arc::clone(ctx.playback_queue()),
            Arc::clone(ctx.speakers()),
            Arc::clone(ctx.playback_counters()),
            sink,
        )
        .with_poll(ctx.settings().playback_poll)
    }

    /// How long one dequeue waits before looping
    #[must_use]
    pub fn with_poll(mut self, poll: Duration) -> Self {
        self.poll = poll.max(Duration::from_millis(1));
        self
    }

    /// Start the playback thread
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned
    pub fn spawn(self) -> Result<PlaybackHandle> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let thread = std::thread::Builder::new()
            .name("speaker-playback".to_string())
            .spawn(move || self.run(&flag))?;
        Ok(PlaybackHandle {
            stop,
            thread: Some(thread),
        })
    }

    fn run(&self, stop: &AtomicBool) {
        let mut output = match self.sink.open() {
            Ok(stream) => Some(stream),
            Err(e) => {
                tracing::warn!(error = %e, "speaker unavailable, inbound audio will be discarded");
                None
            }
        };
        let mut stereo = Vec::with_capacity(MAX_PLAYBACK_SAMPLES * 2);

        while !stop.load(Ordering::Acquire) {
            let Some(chunk) = self.queue.take(self.poll) else {
                continue;
            };
            self.play(&chunk, &mut output, &mut stereo);
        }

        tracing::debug!(stats = ?self.counters.stats(), "speaker playback stopped");
    }

    fn play(
        &self,
        chunk: &AudioChunk,
        output: &mut Option<Box<dyn SpeakerStream>>,
        stereo: &mut Vec<i16>,
    ) {
        let Some(output) = output.as_mut().filter(|_| self.sessions.active() > 0) else {
            self.counters.discarded.fetch_add(1, Ordering::Relaxed);
            return;
        };
        if mono_to_stereo(chunk, stereo) == 0 {
            self.counters.discarded.fetch_add(1, Ordering::Relaxed);
            return;
        }

        match output.write(stereo) {
            Ok(()) => {
                self.counters.played.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "speaker write failed");
            }
        }
    }
}

/// Running playback thread; stops and joins it when dropped
pub struct PlaybackHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl PlaybackHandle {
    /// Stop the thread and wait for it to exit
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            tracing::error!("speaker playback thread panicked");
        }
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
