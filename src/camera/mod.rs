//! Camera frames, frame ownership and JPEG delivery
//!
//! A [`FrameSource`] hands out [`Frame`]s that must be given back exactly once.
//! Callers never hold a bare `Frame`: they hold a [`FrameLease`], whose `Drop`
//! performs the release, so every exit path (success, transcode failure, write
//! failure, task cancellation) returns the buffer to the sensor.

mod flash;
mod synthetic;
mod transcode;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub use flash::{Flash, FlashGuard, IlluminationState, LedDriver, LoggingLed};
pub use synthetic::TestPatternCamera;
pub use transcode::transcode;

/// Default JPEG quality used when a raw frame has to be converted
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Pixel layout of a frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Already JPEG-encoded, ready for delivery
    Jpeg,
    /// 3 bytes per pixel, R G B
    Rgb888,
    /// 2 bytes per pixel, big-endian 5-6-5
    Rgb565,
    /// 1 byte per pixel luminance
    Grayscale,
    /// YUYV, 4 bytes per 2 pixels
    Yuv422,
}

impl PixelFormat {
    /// Whether bytes in this format can be sent without conversion
    #[must_use]
    pub const fn is_delivery_ready(self) -> bool {
        matches!(self, Self::Jpeg)
    }

    /// Bytes per pixel for raw formats
    #[must_use]
    pub const fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            Self::Jpeg => None,
            Self::Rgb888 => Some(3),
            Self::Rgb565 | Self::Yuv422 => Some(2),
            Self::Grayscale => Some(1),
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Jpeg => "jpeg",
            Self::Rgb888 => "rgb888",
            Self::Rgb565 => "rgb565",
            Self::Grayscale => "grayscale",
            Self::Yuv422 => "yuv422",
        };
        f.write_str(name)
    }
}

impl FromStr for PixelFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "rgb888" | "rgb" => Ok(Self::Rgb888),
            "rgb565" => Ok(Self::Rgb565),
            "grayscale" | "gray" => Ok(Self::Grayscale),
            "yuv422" | "yuyv" => Ok(Self::Yuv422),
            other => Err(Error::Config(format!("unknown pixel format: {other}"))),
        }
    }
}

/// A frame buffer handed out by a [`FrameSource`]
///
/// Deliberately not `Clone`: the buffer belongs to the sensor and goes back
/// through [`FrameSource::release`] exactly once.
#[derive(Debug)]
pub struct Frame {
    format: PixelFormat,
    width: u32,
    height: u32,
    sequence: u64,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap a buffer filled by the hardware
    #[must_use]
    pub const fn new(format: PixelFormat, width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            format,
            width,
            height,
            sequence: 0,
            data,
        }
    }

    /// Tag the frame with the source's buffer sequence number
    #[must_use]
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Empty placeholder left behind when a lease hands its frame back
    const fn vacant() -> Self {
        Self::new(PixelFormat::Jpeg, 0, 0, Vec::new())
    }

    #[must_use]
    pub const fn format(&self) -> PixelFormat {
        self.format
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Sequence number assigned by the source
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Camera hardware: hands out one frame per call, takes it back on release
///
/// Implementations serialize captures themselves; `acquire` may block for up to
/// one frame period and must not retry internally.
pub trait FrameSource: Send + Sync {
    /// Capture one frame
    ///
    /// # Errors
    ///
    /// Returns [`Error::HardwareUnavailable`] if the sensor is busy or gone
    fn acquire(&self) -> Result<Frame>;

    /// Return a frame buffer to the hardware
    fn release(&self, frame: Frame);
}

/// Shared handle to the camera
pub type SharedFrameSource = Arc<dyn FrameSource>;

/// Scoped ownership of an acquired frame; releases it on drop
pub struct FrameLease {
    frame: Frame,
    source: SharedFrameSource,
}

impl FrameLease {
    /// Acquire a frame from `source` on the current thread
    ///
    /// # Errors
    ///
    /// Propagates the source's acquisition failure
    pub fn acquire(source: &SharedFrameSource) -> Result<Self> {
        let frame = source.acquire()?;
        Ok(Self {
            frame,
            source: Arc::clone(source),
        })
    }

    /// Acquire a frame on the blocking pool so the async worker keeps running
    ///
    /// # Errors
    ///
    /// Returns [`Error::HardwareUnavailable`] if acquisition fails or the
    /// blocking task dies
    pub async fn acquire_blocking(source: &SharedFrameSource) -> Result<Self> {
        let source = Arc::clone(source);
        tokio::task::spawn_blocking(move || Self::acquire(&source))
            .await
            .map_err(|e| Error::HardwareUnavailable(format!("camera task failed: {e}")))?
    }

    #[must_use]
    pub const fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Convert into deliverable JPEG bytes, transcoding if needed
    ///
    /// On failure the lease is dropped here, which releases the frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transcode`] if a raw frame cannot be encoded
    pub fn into_jpeg(self, quality: u8) -> Result<Jpeg> {
        if self.frame.format().is_delivery_ready() {
            return Ok(Jpeg::Native(self));
        }
        let bytes = transcode(&self.frame, quality)?;
        Ok(Jpeg::Encoded {
            bytes,
            _frame: self,
        })
    }
}

impl fmt::Debug for FrameLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameLease")
            .field("format", &self.frame.format)
            .field("sequence", &self.frame.sequence)
            .field("len", &self.frame.len())
            .finish_non_exhaustive()
    }
}

impl Drop for FrameLease {
    fn drop(&mut self) {
        let frame = std::mem::replace(&mut self.frame, Frame::vacant());
        self.source.release(frame);
    }
}

/// JPEG bytes, keeping the source frame leased until dropped or detached
#[derive(Debug)]
pub enum Jpeg {
    /// The frame was already JPEG
    Native(FrameLease),
    /// The frame was raw; `bytes` is the transcode output
    Encoded { bytes: Vec<u8>, _frame: FrameLease },
}

impl Jpeg {
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_ref().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_ref().is_empty()
    }

    /// Detach the bytes from the camera, releasing the frame now
    ///
    /// A ready JPEG is copied out of the frame buffer; transcode output is
    /// moved. The returned bytes hold no frame buffer however long the network
    /// takes to send them.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        match self {
            Self::Native(lease) => Bytes::copy_from_slice(lease.frame().data()),
            Self::Encoded { bytes, _frame } => Bytes::from(bytes),
        }
    }
}

impl AsRef<[u8]> for Jpeg {
    fn as_ref(&self) -> &[u8] {
        match self {
            Self::Native(lease) => lease.frame().data(),
            Self::Encoded { bytes, .. } => bytes,
        }
    }
}

/// Acquire and convert one frame entirely on the blocking pool
///
/// # Errors
///
/// Returns the acquisition or transcode failure; the frame is released either way
pub async fn capture_jpeg(source: &SharedFrameSource, quality: u8) -> Result<Jpeg> {
    let source = Arc::clone(source);
    tokio::task::spawn_blocking(move || FrameLease::acquire(&source)?.into_jpeg(quality))
        .await
        .map_err(|e| Error::HardwareUnavailable(format!("camera task failed: {e}")))?
}

/// Convert an already-held lease on the blocking pool
///
/// # Errors
///
/// Returns [`Error::Transcode`] if the frame cannot be encoded
pub async fn encode_blocking(lease: FrameLease, quality: u8) -> Result<Jpeg> {
    tokio::task::spawn_blocking(move || lease.into_jpeg(quality))
        .await
        .map_err(|e| Error::Transcode(format!("encoder task failed: {e}")))?
}
