//! Shared media context
//!
//! Everything the handlers and the playback thread share lives in one
//! [`MediaContext`], built once at startup and handed around behind an `Arc`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::Config;
use crate::audio::{
    BLOCK_SAMPLES, DEFAULT_GAIN_SHIFT, DEFAULT_MAX_SPEAK_MESSAGE_BYTES, DEFAULT_QUEUE_DEPTH,
    DisabledAudio, MicSource, PlaybackCounters, PlaybackQueue,
};
use crate::camera::{DEFAULT_JPEG_QUALITY, Flash, SharedFrameSource};

/// Runtime knobs for the media pipeline
#[derive(Debug, Clone)]
pub struct MediaSettings {
    pub jpeg_quality: u8,
    /// Exposure settle time between flash on and acquisition
    pub flash_settle: Duration,
    /// Delay inserted after each stream part
    pub stream_pacing: Duration,
    pub gain_shift: u32,
    pub block_samples: usize,
    pub queue_depth: usize,
    pub max_speak_message_bytes: usize,
    pub playback_poll: Duration,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            flash_settle: Duration::from_millis(120),
            stream_pacing: Duration::from_millis(1),
            gain_shift: DEFAULT_GAIN_SHIFT,
            block_samples: BLOCK_SAMPLES,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            max_speak_message_bytes: DEFAULT_MAX_SPEAK_MESSAGE_BYTES,
            playback_poll: Duration::from_millis(100),
        }
    }
}

impl From<&Config> for MediaSettings {
    fn from(config: &Config) -> Self {
        Self {
            jpeg_quality: config.camera.jpeg_quality,
            flash_settle: config.flash.settle,
            stream_pacing: config.camera.stream_pacing,
            gain_shift: config.audio.gain_shift,
            block_samples: config.audio.block_samples,
            queue_depth: config.audio.queue_depth,
            max_speak_message_bytes: config.audio.max_message_bytes,
            playback_poll: config.audio.playback_poll,
        }
    }
}

/// Counts live sessions of one kind
#[derive(Debug, Default)]
pub struct SessionGate {
    active: AtomicUsize,
}

impl SessionGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session; it stays counted until the guard drops
    #[must_use]
    pub fn enter(self: &Arc<Self>) -> SessionGuard {
        self.active.fetch_add(1, Ordering::AcqRel);
        SessionGuard {
            gate: Arc::clone(self),
        }
    }

    #[must_use]
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

/// One live session
#[derive(Debug)]
pub struct SessionGuard {
    gate: Arc<SessionGate>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.gate.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Hardware handles, handoff queue and session bookkeeping
pub struct MediaContext {
    camera: SharedFrameSource,
    flash: Flash,
    mic: Arc<dyn MicSource>,
    mic_owner: Arc<Semaphore>,
    playback_queue: Arc<PlaybackQueue>,
    playback_counters: Arc<PlaybackCounters>,
    speakers: Arc<SessionGate>,
    streams: Arc<SessionGate>,
    settings: MediaSettings,
}

impl MediaContext {
    /// Start building a context around a camera
    #[must_use]
    pub fn builder(camera: SharedFrameSource) -> MediaContextBuilder {
        MediaContextBuilder {
            camera,
            flash: None,
            mic: None,
            settings: MediaSettings::default(),
        }
    }

    #[must_use]
    pub const fn camera(&self) -> &SharedFrameSource {
        &self.camera
    }

    #[must_use]
    pub const fn flash(&self) -> &Flash {
        &self.flash
    }

    #[must_use]
    pub const fn mic(&self) -> &Arc<dyn MicSource> {
        &self.mic
    }

    /// Take exclusive ownership of the microphone, or `None` if a session holds it
    #[must_use]
    pub fn claim_mic(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.mic_owner).try_acquire_owned().ok()
    }

    #[must_use]
    pub fn mic_busy(&self) -> bool {
        self.mic_owner.available_permits() == 0
    }

    #[must_use]
    pub const fn playback_queue(&self) -> &Arc<PlaybackQueue> {
        &self.playback_queue
    }

    #[must_use]
    pub const fn playback_counters(&self) -> &Arc<PlaybackCounters> {
        &self.playback_counters
    }

    /// Connected `/ws_speak` clients
    #[must_use]
    pub const fn speakers(&self) -> &Arc<SessionGate> {
        &self.speakers
    }

    /// Open `/stream` responses
    #[must_use]
    pub const fn streams(&self) -> &Arc<SessionGate> {
        &self.streams
    }

    #[must_use]
    pub const fn settings(&self) -> &MediaSettings {
        &self.settings
    }
}

/// Builder for [`MediaContext`]
pub struct MediaContextBuilder {
    camera: SharedFrameSource,
    flash: Option<Flash>,
    mic: Option<Arc<dyn MicSource>>,
    settings: MediaSettings,
}

impl MediaContextBuilder {
    /// Microphone backend (default: disabled)
    #[must_use]
    pub fn mic(mut self, mic: Arc<dyn MicSource>) -> Self {
        self.mic = Some(mic);
        self
    }

    /// Snapshot illumination (default: none)
    #[must_use]
    pub fn flash(mut self, flash: Flash) -> Self {
        self.flash = Some(flash);
        self
    }

    #[must_use]
    pub fn settings(mut self, settings: MediaSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn build(self) -> MediaContext {
        MediaContext {
            camera: self.camera,
            flash: self.flash.unwrap_or_else(Flash::disabled),
            mic: self
                .mic
                .unwrap_or_else(|| Arc::new(DisabledAudio) as Arc<dyn MicSource>),
            mic_owner: Arc::new(Semaphore::new(1)),
            playback_queue: Arc::new(PlaybackQueue::new(self.settings.queue_depth)),
            playback_counters: Arc::new(PlaybackCounters::default()),
            speakers: Arc::new(SessionGate::new()),
            streams: Arc::new(SessionGate::new()),
            settings: self.settings,
        }
    }
}
