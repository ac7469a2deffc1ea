//! Full-duplex PCM audio
//!
//! Microphone blocks flow out through [`MicCapture`]; speaker chunks flow in
//! through the [`PlaybackQueue`] and are played by [`SpeakerPlayback`]. Both
//! directions carry raw 16-bit little-endian mono PCM at [`SAMPLE_RATE`].

mod capture;
mod device;
mod playback;
mod queue;

use bytes::Bytes;

use crate::{Error, Result};

pub use capture::{
    CaptureExit, CaptureReport, MicCapture, MicSource, MicStream, convert_block, scale_sample,
};
pub use device::{CpalMic, CpalSpeaker, DisabledAudio};
pub use playback::{
    PlaybackCounters, PlaybackHandle, PlaybackStats, SpeakerPlayback, SpeakerSink, SpeakerStream,
    mono_to_stereo,
};
pub use queue::{Enqueue, PlaybackQueue, QueueStats};

/// Sample rate for both directions (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16_000;

/// Samples per microphone block (20 ms at 16kHz)
pub const BLOCK_SAMPLES: usize = 320;

/// Mono samples written to the speaker per call; longer chunks are truncated
pub const MAX_PLAYBACK_SAMPLES: usize = 1024;

/// Default playback queue capacity in chunks
pub const DEFAULT_QUEUE_DEPTH: usize = 8;

/// Default cap on a single inbound speaker message
pub const DEFAULT_MAX_SPEAK_MESSAGE_BYTES: usize = 16 * 1024;

/// Default right shift applied to raw 32-bit microphone samples
pub const DEFAULT_GAIN_SHIFT: u32 = 14;

/// One heap-owned block of 16-bit LE PCM
///
/// Moved between owners and freed exactly once: by playback, by transmission,
/// or by the queue when it is full.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    data: Vec<u8>,
}

impl AudioChunk {
    /// Copy a network payload into a buffer sized exactly to it
    ///
    /// # Errors
    ///
    /// Returns [`Error::Allocation`] if the buffer cannot be reserved
    pub fn copy_from(payload: &[u8]) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(payload.len())
            .map_err(|_| Error::Allocation(payload.len()))?;
        data.extend_from_slice(payload);
        Ok(Self { data })
    }

    /// Encode samples as little-endian bytes
    #[must_use]
    pub fn from_pcm(samples: &[i16]) -> Self {
        let data = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self { data }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Decode the payload as samples; a trailing odd byte is ignored
    pub fn samples(&self) -> impl Iterator<Item = i16> + '_ {
        self.data
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
    }
}

impl From<AudioChunk> for Bytes {
    fn from(chunk: AudioChunk) -> Self {
        Self::from(chunk.data)
    }
}
