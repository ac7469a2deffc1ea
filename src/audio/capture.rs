//! Microphone capture and uplink
//!
//! One capture thread per `/ws_audio` session. The thread opens the input
//! hardware, reads fixed-size blocks of raw 32-bit samples, narrows them to
//! 16-bit PCM and pushes each block into the session's uplink channel. The
//! first read or send failure ends the thread for good.

use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::sync::OwnedSemaphorePermit;
use tokio::sync::mpsc;

use super::AudioChunk;
use crate::Result;

/// An open input stream delivering raw high-resolution samples
pub trait MicStream {
    /// Block until `raw` is filled with the next block of samples
    ///
    /// # Errors
    ///
    /// Returns an error if the hardware read fails; the session then ends
    fn read_block(&mut self, raw: &mut [i32]) -> Result<()>;
}

/// Input hardware that can be opened once per session
pub trait MicSource: Send + Sync {
    /// Open the input hardware for exclusive use by the calling thread
    ///
    /// # Errors
    ///
    /// Returns an error if no input device is available
    fn open(&self) -> Result<Box<dyn MicStream>>;
}

/// Why a capture thread stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureExit {
    OpenFailed,
    ReadFailed,
    /// The socket side went away
    UplinkClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureReport {
    pub exit: CaptureExit,
    pub blocks: u64,
}

/// Narrow one raw sample: arithmetic shift, then saturate into `i16`
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn scale_sample(raw: i32, gain_shift: u32) -> i16 {
    (raw >> gain_shift.min(31)).clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

/// Narrow a block of raw samples into a 16-bit LE chunk
#[must_use]
pub fn convert_block(raw: &[i32], gain_shift: u32) -> AudioChunk {
    let pcm: Vec<i16> = raw.iter().map(|&s| scale_sample(s, gain_shift)).collect();
    AudioChunk::from_pcm(&pcm)
}

/// A capture session's worth of settings
pub struct MicCapture {
    source: Arc<dyn MicSource>,
    gain_shift: u32,
    block_samples: usize,
}

impl MicCapture {
    #[must_use]
    pub fn new(source: Arc<dyn MicSource>, gain_shift: u32, block_samples: usize) -> Self {
        Self {
            source,
            gain_shift,
            block_samples: block_samples.max(1),
        }
    }

    /// Run the session on its own thread
    ///
    /// `permit` is the microphone ownership token; it is released only after
    /// the input stream has been closed.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned
    pub fn spawn(
        self,
        permit: OwnedSemaphorePermit,
        uplink: mpsc::Sender<AudioChunk>,
    ) -> Result<JoinHandle<CaptureReport>> {
        let handle = std::thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || {
                let report = self.run(&uplink);
                drop(permit);
                report
            })?;
        Ok(handle)
    }

    /// Capture until the hardware or the uplink fails
    pub fn run(&self, uplink: &mpsc::Sender<AudioChunk>) -> CaptureReport {
        let mut stream = match self.source.open() {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(error = %e, "failed to open microphone");
                return CaptureReport {
                    exit: CaptureExit::OpenFailed,
                    blocks: 0,
                };
            }
        };

        tracing::debug!(
            block_samples = self.block_samples,
            gain_shift = self.gain_shift,
            "mic capture started"
        );

        let mut raw = vec![0i32; self.block_samples];
        let mut blocks = 0u64;
        let exit = loop {
            if let Err(e) = stream.read_block(&mut raw) {
                tracing::warn!(error = %e, "microphone read failed");
                break CaptureExit::ReadFailed;
            }
            if uplink
                .blocking_send(convert_block(&raw, self.gain_shift))
                .is_err()
            {
                break CaptureExit::UplinkClosed;
            }
            blocks += 1;
        };

        drop(stream);
        tracing::debug!(?exit, blocks, "mic capture stopped");
        CaptureReport { exit, blocks }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_then_saturate() {
        assert_eq!(scale_sample(1 << 14, 14), 1);
        assert_eq!(scale_sample(-(1 << 14), 14), -1);
        assert_eq!(scale_sample(i32::MAX, 14), i16::MAX);
        assert_eq!(scale_sample(i32::MIN, 14), i16::MIN);
        assert_eq!(scale_sample(40_000, 0), i16::MAX);
        assert_eq!(scale_sample(-40_000, 0), i16::MIN);
    }

    #[test]
    fn shift_is_arithmetic() {
        // -1 stays -1 under an arithmetic shift
        assert_eq!(scale_sample(-1, 14), -1);
        assert_eq!(scale_sample(i32::MIN, 40), -1);
    }

    #[test]
    fn block_is_little_endian_pcm() {
        let chunk = convert_block(&[256 << 14, -(256 << 14)], 14);
        assert_eq!(chunk.as_bytes(), &[0x00, 0x01, 0x00, 0xff]);
    }
}
