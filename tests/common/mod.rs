//! Shared test doubles

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use camlink::audio::{MicSource, MicStream, SpeakerSink, SpeakerStream};
use camlink::camera::{Flash, Frame, FrameSource, LedDriver, PixelFormat};
use camlink::context::{MediaContext, MediaSettings};
use camlink::{Error, Result};

/// A JPEG-format frame of exactly `len` bytes, SOI marker first
#[must_use]
pub fn jpeg_frame(len: usize, fill: u8) -> Frame {
    let mut data = vec![fill; len];
    if len >= 2 {
        data[..2].copy_from_slice(&[0xff, 0xd8]);
    }
    Frame::new(PixelFormat::Jpeg, 640, 480, data)
}

/// A 16x16 RGB888 frame; `valid = false` truncates the buffer so transcoding fails
#[must_use]
pub fn raw_frame(valid: bool) -> Frame {
    let len = if valid { 16 * 16 * 3 } else { 16 * 16 * 3 - 1 };
    Frame::new(PixelFormat::Rgb888, 16, 16, vec![0x40; len])
}

/// Camera that plays back a fixed script; `None` entries and an exhausted
/// script are acquisition failures
#[derive(Default)]
pub struct ScriptedCamera {
    script: Mutex<VecDeque<Option<Frame>>>,
    next_sequence: AtomicU64,
    acquired: Mutex<Vec<u64>>,
    released: Mutex<Vec<u64>>,
    acquired_at: Mutex<Vec<Instant>>,
    lit_at_acquire: Mutex<Vec<bool>>,
    led: Option<Arc<RecordingLed>>,
}

impl ScriptedCamera {
    #[must_use]
    pub fn new(script: Vec<Option<Frame>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    /// Record whether `led` is lit at each acquisition
    #[must_use]
    pub fn watching(mut self, led: Arc<RecordingLed>) -> Self {
        self.led = Some(led);
        self
    }

    pub fn acquired(&self) -> Vec<u64> {
        self.acquired.lock().unwrap().clone()
    }

    pub fn released(&self) -> Vec<u64> {
        self.released.lock().unwrap().clone()
    }

    pub fn acquired_at(&self) -> Vec<Instant> {
        self.acquired_at.lock().unwrap().clone()
    }

    pub fn lit_at_acquire(&self) -> Vec<bool> {
        self.lit_at_acquire.lock().unwrap().clone()
    }
}

impl FrameSource for ScriptedCamera {
    fn acquire(&self) -> Result<Frame> {
        if let Some(led) = &self.led {
            self.lit_at_acquire.lock().unwrap().push(led.is_lit());
        }

        let next = self.script.lock().unwrap().pop_front().flatten();
        let Some(frame) = next else {
            return Err(Error::HardwareUnavailable("scripted failure".to_string()));
        };

        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        self.acquired.lock().unwrap().push(sequence);
        self.acquired_at.lock().unwrap().push(Instant::now());
        Ok(frame.with_sequence(sequence))
    }

    fn release(&self, frame: Frame) {
        self.released.lock().unwrap().push(frame.sequence());
    }
}

/// LED that records every duty change with its time
#[derive(Default)]
pub struct RecordingLed {
    events: Mutex<Vec<(u8, Instant)>>,
}

impl RecordingLed {
    pub fn duties(&self) -> Vec<u8> {
        self.events.lock().unwrap().iter().map(|(d, _)| *d).collect()
    }

    pub fn events(&self) -> Vec<(u8, Instant)> {
        self.events.lock().unwrap().clone()
    }

    pub fn is_lit(&self) -> bool {
        self.events
            .lock()
            .unwrap()
            .last()
            .is_some_and(|(duty, _)| *duty > 0)
    }
}

impl LedDriver for RecordingLed {
    fn set_duty(&self, duty: u8) {
        self.events.lock().unwrap().push((duty, Instant::now()));
    }
}

/// Microphone producing constant blocks, optionally failing after `limit` reads
pub struct ScriptedMic {
    pub raw: i32,
    pub limit: Option<usize>,
    pub interval: Duration,
}

impl ScriptedMic {
    #[must_use]
    pub const fn endless(raw: i32) -> Self {
        Self {
            raw,
            limit: None,
            interval: Duration::from_millis(1),
        }
    }

    #[must_use]
    pub const fn failing_after(raw: i32, limit: usize) -> Self {
        Self {
            raw,
            limit: Some(limit),
            interval: Duration::ZERO,
        }
    }
}

struct ScriptedMicStream {
    raw: i32,
    remaining: Option<usize>,
    interval: Duration,
}

impl MicSource for ScriptedMic {
    fn open(&self) -> Result<Box<dyn MicStream>> {
        Ok(Box::new(ScriptedMicStream {
            raw: self.raw,
            remaining: self.limit,
            interval: self.interval,
        }))
    }
}

impl MicStream for ScriptedMicStream {
    fn read_block(&mut self, raw: &mut [i32]) -> Result<()> {
        if let Some(remaining) = &mut self.remaining {
            if *remaining == 0 {
                return Err(Error::Audio("scripted read failure".to_string()));
            }
            *remaining -= 1;
        }
        std::thread::sleep(self.interval);
        raw.fill(self.raw);
        Ok(())
    }
}

/// Speaker that records every write; write number `fail_on` (0-based) fails
#[derive(Default)]
pub struct RecordingSpeaker {
    writes: Arc<Mutex<Vec<Vec<i16>>>>,
    attempts: Arc<AtomicUsize>,
    fail_on: Option<usize>,
    unavailable: bool,
}

impl RecordingSpeaker {
    #[must_use]
    pub fn failing_on(write: usize) -> Self {
        Self {
            fail_on: Some(write),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn writes(&self) -> Vec<Vec<i16>> {
        self.writes.lock().unwrap().clone()
    }
}

struct RecordingSpeakerStream {
    writes: Arc<Mutex<Vec<Vec<i16>>>>,
    attempts: Arc<AtomicUsize>,
    fail_on: Option<usize>,
}

impl SpeakerSink for RecordingSpeaker {
    fn open(&self) -> Result<Box<dyn SpeakerStream>> {
        if self.unavailable {
            return Err(Error::Audio("no output device".to_string()));
        }
        Ok(Box::new(RecordingSpeakerStream {
            writes: Arc::clone(&self.writes),
            attempts: Arc::clone(&self.attempts),
            fail_on: self.fail_on,
        }))
    }
}

impl SpeakerStream for RecordingSpeakerStream {
    fn write(&mut self, stereo: &[i16]) -> Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_on == Some(attempt) {
            return Err(Error::Audio("scripted write failure".to_string()));
        }
        self.writes.lock().unwrap().push(stereo.to_vec());
        Ok(())
    }
}

/// Settings with no artificial delays
#[must_use]
pub fn fast_settings() -> MediaSettings {
    MediaSettings {
        flash_settle: Duration::ZERO,
        stream_pacing: Duration::ZERO,
        playback_poll: Duration::from_millis(5),
        ..MediaSettings::default()
    }
}

/// Context around `camera` with an optional recording LED at intensity 200
#[must_use]
pub fn context(
    camera: Arc<ScriptedCamera>,
    led: Option<Arc<RecordingLed>>,
    settings: MediaSettings,
) -> Arc<MediaContext> {
    let led = led.map(|led| led as Arc<dyn LedDriver>);
    Arc::new(
        MediaContext::builder(camera)
            .flash(Flash::new(led, 200))
            .settings(settings)
            .build(),
    )
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
