//! Synthetic camera producing a moving test pattern
//!
//! Behaves like a sensor driver with a small pool of frame buffers: each
//! acquisition takes one buffer, each release gives it back, and asking for a
//! frame while every buffer is out fails instead of waiting.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use super::{Frame, FrameSource, PixelFormat, transcode};
use crate::{Error, Result};

/// Test-pattern frame source
pub struct TestPatternCamera {
    width: u32,
    height: u32,
    format: PixelFormat,
    quality: u8,
    frame_interval: Duration,
    buffers: usize,
    outstanding: AtomicUsize,
    sequence: AtomicU64,
}

impl TestPatternCamera {
    /// Create a camera emitting `width`x`height` frames in `format`
    #[must_use]
    pub const fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            quality: super::DEFAULT_JPEG_QUALITY,
            frame_interval: Duration::ZERO,
            buffers: 2,
            outstanding: AtomicUsize::new(0),
            sequence: AtomicU64::new(0),
        }
    }

    /// Pace acquisitions to `fps` frames per second (0 = unpaced)
    #[must_use]
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.frame_interval = if fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(1) / fps
        };
        self
    }

    /// Number of frame buffers that may be out at once
    #[must_use]
    pub fn with_buffers(mut self, buffers: usize) -> Self {
        self.buffers = buffers.max(1);
        self
    }

    /// Quality used when the configured format is JPEG
    #[must_use]
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    /// Frames currently held by callers
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    fn claim_buffer(&self) -> Result<()> {
        self.outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.buffers).then_some(n + 1)
            })
            .map(|_| ())
            .map_err(|n| Error::HardwareUnavailable(format!("all {n} frame buffers in use")))
    }

    fn render(&self, sequence: u64) -> Result<Frame> {
        let rgb = pattern(self.width, self.height, sequence);
        let raw = Frame::new(PixelFormat::Rgb888, self.width, self.height, rgb);
        let data = match self.format {
            PixelFormat::Rgb888 => return Ok(raw.with_sequence(sequence)),
            PixelFormat::Jpeg => transcode(&raw, self.quality)?,
            PixelFormat::Rgb565 => raw.data().chunks_exact(3).flat_map(pack_rgb565).collect(),
            PixelFormat::Grayscale => raw.data().chunks_exact(3).map(luma).collect(),
            PixelFormat::Yuv422 => raw.data().chunks_exact(6).flat_map(pack_yuyv).collect(),
        };
        Ok(Frame::new(self.format, self.width, self.height, data).with_sequence(sequence))
    }
}

impl FrameSource for TestPatternCamera {
    fn acquire(&self) -> Result<Frame> {
        self.claim_buffer()?;
        if !self.frame_interval.is_zero() {
            std::thread::sleep(self.frame_interval);
        }

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.render(sequence).inspect_err(|_| {
            self.outstanding.fetch_sub(1, Ordering::AcqRel);
        })
    }

    fn release(&self, frame: Frame) {
        let _ = self
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        tracing::trace!(sequence = frame.sequence(), "frame buffer returned");
    }
}

/// Diagonal colour bars that drift by one step per frame
#[allow(clippy::cast_possible_truncation)]
fn pattern(width: u32, height: u32, sequence: u64) -> Vec<u8> {
    let base = (sequence % 256) as u8;
    let mut data = Vec::with_capacity(width as usize * height as usize * 3);
    for y in 0..height {
        for x in 0..width {
            data.extend_from_slice(&[
                base.wrapping_add((x % 256) as u8),
                base.wrapping_add((y % 256) as u8),
                base.wrapping_add(((x + y) % 256) as u8),
            ]);
        }
    }
    data
}

fn pack_rgb565(px: &[u8]) -> [u8; 2] {
    let v = (u16::from(px[0] >> 3) << 11) | (u16::from(px[1] >> 2) << 5) | u16::from(px[2] >> 3);
    v.to_be_bytes()
}

#[allow(clippy::cast_possible_truncation)]
fn luma(px: &[u8]) -> u8 {
    ((77 * u32::from(px[0]) + 150 * u32::from(px[1]) + 29 * u32::from(px[2])) >> 8) as u8
}

/// Two RGB pixels to one YUYV quad, chroma taken from the first pixel
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn pack_yuyv(px: &[u8]) -> [u8; 4] {
    let (r, g, b) = (i32::from(px[0]), i32::from(px[1]), i32::from(px[2]));
    let u = (((-43 * r - 85 * g + 128 * b) >> 8) + 128).clamp(0, 255) as u8;
    let v = (((128 * r - 107 * g - 21 * b) >> 8) + 128).clamp(0, 255) as u8;
    [luma(&px[..3]), u, luma(&px[3..6]), v]
}
