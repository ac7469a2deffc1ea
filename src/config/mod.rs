//! Configuration management for camlink
//!
//! Precedence, highest first: CLI flags (applied by the binary), `CAMLINK_*`
//! environment variables, the TOML file, built-in defaults.

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::Result;
use crate::audio::{
    BLOCK_SAMPLES, DEFAULT_GAIN_SHIFT, DEFAULT_MAX_SPEAK_MESSAGE_BYTES, DEFAULT_QUEUE_DEPTH,
};
use crate::camera::{DEFAULT_JPEG_QUALITY, PixelFormat};

use self::file::ConfigFile;

/// camlink configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub camera: CameraConfig,
    pub flash: FlashConfig,
    pub audio: AudioConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,

    /// Control listener: /capture, /health, /ws_audio, /ws_speak
    pub port: u16,

    /// Stream listener: /stream
    pub stream_port: u16,

    /// Path to static files served as the fallback route
    pub static_dir: Option<PathBuf>,
}

/// Camera configuration
#[derive(Debug, Clone)]
pub struct CameraConfig {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub fps: u32,
    pub buffers: usize,
    pub jpeg_quality: u8,
    pub stream_pacing: Duration,
}

/// Snapshot illumination
#[derive(Debug, Clone)]
pub struct FlashConfig {
    pub pin: Option<u32>,
    pub intensity: u8,
    pub settle: Duration,
}

/// Microphone and speaker configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Use the host audio devices; off means mic sessions fail and playback discards
    pub enabled: bool,
    pub gain_shift: u32,
    pub block_samples: usize,
    pub queue_depth: usize,
    pub max_message_bytes: usize,
    pub playback_poll: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            stream_port: 8081,
            static_dir: None,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            format: PixelFormat::Jpeg,
            fps: 20,
            buffers: 2,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            stream_pacing: Duration::from_millis(1),
        }
    }
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            pin: None,
            intensity: 255,
            settle: Duration::from_millis(120),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            gain_shift: DEFAULT_GAIN_SHIFT,
            block_samples: BLOCK_SAMPLES,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            max_message_bytes: DEFAULT_MAX_SPEAK_MESSAGE_BYTES,
            playback_poll: Duration::from_millis(100),
        }
    }
}

impl Config {
    /// Load configuration from the file layer and the process environment
    ///
    /// # Errors
    ///
    /// Returns error if an explicit config file cannot be read or parsed
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file(path)?;
        Ok(Self::from_sources(fc, |key| std::env::var(key).ok()))
    }

    /// Merge a parsed file with an environment lookup (env > toml > default)
    #[must_use]
    pub fn from_sources(fc: ConfigFile, env: impl Fn(&str) -> Option<String>) -> Self {
        let parsed = |key: &str| env(key).and_then(|s| s.trim().parse::<u64>().ok());
        let defaults = Self::default();

        let server = ServerConfig {
            host: env("CAMLINK_HOST")
                .or(fc.server.host)
                .unwrap_or(defaults.server.host),
            port: env("CAMLINK_PORT")
                .and_then(|s| s.parse().ok())
                .or(fc.server.port)
                .unwrap_or(defaults.server.port),
            stream_port: env("CAMLINK_STREAM_PORT")
                .and_then(|s| s.parse().ok())
                .or(fc.server.stream_port)
                .unwrap_or(defaults.server.stream_port),
            static_dir: env("CAMLINK_STATIC_DIR")
                .map(PathBuf::from)
                .or(fc.server.static_dir),
        };

        let camera = CameraConfig {
            width: env("CAMLINK_CAMERA_WIDTH")
                .and_then(|s| s.parse().ok())
                .or(fc.camera.width)
                .unwrap_or(defaults.camera.width),
            height: env("CAMLINK_CAMERA_HEIGHT")
                .and_then(|s| s.parse().ok())
                .or(fc.camera.height)
                .unwrap_or(defaults.camera.height),
            format: env("CAMLINK_CAMERA_FORMAT")
                .and_then(|s| match s.parse() {
                    Ok(format) => Some(format),
                    Err(e) => {
                        tracing::warn!(error = %e, "ignoring CAMLINK_CAMERA_FORMAT");
                        None
                    }
                })
                .or(fc.camera.format)
                .unwrap_or(defaults.camera.format),
            fps: env("CAMLINK_CAMERA_FPS")
                .and_then(|s| s.parse().ok())
                .or(fc.camera.fps)
                .unwrap_or(defaults.camera.fps),
            buffers: fc.camera.buffers.unwrap_or(defaults.camera.buffers).max(1),
            jpeg_quality: parsed("CAMLINK_JPEG_QUALITY")
                .or(fc.camera.jpeg_quality.map(u64::from))
                .map_or(defaults.camera.jpeg_quality, clamp_quality),
            stream_pacing: fc
                .camera
                .stream_pacing_ms
                .map_or(defaults.camera.stream_pacing, Duration::from_millis),
        };

        let flash = FlashConfig {
            pin: parsed("CAMLINK_FLASH_PIN")
                .and_then(|p| u32::try_from(p).ok())
                .or(fc.flash.pin),
            intensity: parsed("CAMLINK_FLASH_INTENSITY")
                .or(fc.flash.intensity.map(u64::from))
                .map_or(defaults.flash.intensity, clamp_intensity),
            settle: fc
                .flash
                .settle_ms
                .map_or(defaults.flash.settle, Duration::from_millis),
        };

        let audio = AudioConfig {
            enabled: env("CAMLINK_AUDIO")
                .map(|s| !matches!(s.trim(), "0" | "false" | "off"))
                .or(fc.audio.enabled)
                .unwrap_or(defaults.audio.enabled),
            gain_shift: fc
                .audio
                .gain_shift
                .unwrap_or(defaults.audio.gain_shift)
                .min(31),
            block_samples: fc
                .audio
                .block_samples
                .unwrap_or(defaults.audio.block_samples)
                .max(1),
            queue_depth: env("CAMLINK_QUEUE_DEPTH")
                .and_then(|s| s.parse().ok())
                .or(fc.audio.queue_depth)
                .unwrap_or(defaults.audio.queue_depth)
                .max(1),
            max_message_bytes: fc
                .audio
                .max_message_bytes
                .unwrap_or(defaults.audio.max_message_bytes)
                .max(2),
            playback_poll: fc
                .audio
                .playback_poll_ms
                .map_or(defaults.audio.playback_poll, Duration::from_millis),
        };

        Self {
            server,
            camera,
            flash,
            audio,
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn clamp_quality(q: u64) -> u8 {
    q.clamp(1, 100) as u8
}

#[allow(clippy::cast_possible_truncation)]
fn clamp_intensity(i: u64) -> u8 {
    i.min(255) as u8
}
