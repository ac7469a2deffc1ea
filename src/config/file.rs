//! TOML configuration file loading
//!
//! Supports `~/.config/camlink/config.toml` as a persistent config source.
//! All fields are optional: the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::camera::PixelFormat;
use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    /// Listener configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Camera configuration
    #[serde(default)]
    pub camera: CameraFileConfig,

    /// Snapshot illumination
    #[serde(default)]
    pub flash: FlashFileConfig,

    /// Microphone and speaker configuration
    #[serde(default)]
    pub audio: AudioFileConfig,
}

/// Listener configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Bind address (e.g. "0.0.0.0")
    pub host: Option<String>,

    /// Control port: /capture, /health, websockets
    pub port: Option<u16>,

    /// Stream port: /stream
    pub stream_port: Option<u16>,

    /// Directory served as the fallback route
    pub static_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CameraFileConfig {
    pub width: Option<u32>,
    pub height: Option<u32>,

    /// Sensor pixel format (e.g. "jpeg", "rgb565")
    pub format: Option<PixelFormat>,

    pub fps: Option<u32>,

    /// Frame buffers the sensor driver keeps
    pub buffers: Option<usize>,

    /// JPEG quality for raw frames, clamped to 1-100
    pub jpeg_quality: Option<u32>,

    /// Delay between stream parts
    pub stream_pacing_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FlashFileConfig {
    /// LED pin; no pin means no illumination
    pub pin: Option<u32>,

    /// PWM duty when lit, clamped to 0-255
    pub intensity: Option<u32>,

    /// Exposure settle time after switching on
    pub settle_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    pub enabled: Option<bool>,

    /// Right shift applied to raw 32-bit mic samples
    pub gain_shift: Option<u32>,

    pub block_samples: Option<usize>,

    /// Playback queue capacity in chunks
    pub queue_depth: Option<usize>,

    /// Largest accepted /ws_speak message
    pub max_message_bytes: Option<usize>,

    pub playback_poll_ms: Option<u64>,
}

/// Load the TOML config file
///
/// With an explicit `path` the file must exist and parse. Without one the
/// standard path is tried, and a missing or unreadable file falls back to
/// defaults.
///
/// # Errors
///
/// Returns an error only if an explicitly given file cannot be read or parsed
pub fn load_config_file(path: Option<&Path>) -> Result<ConfigFile> {
    if let Some(path) = path {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        let config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "loaded config file");
        return Ok(config);
    }

    let Some(path) = config_file_path() else {
        return Ok(ConfigFile::default());
    };

    if !path.exists() {
        return Ok(ConfigFile::default());
    }

    let config = match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ConfigFile::default()
        }
    };
    Ok(config)
}

/// Return the config file path: `~/.config/camlink/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("camlink").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_parses() {
        let fc: ConfigFile = toml::from_str(
            r#"
            [camera]
            format = "rgb565"
            jpeg_quality = 60

            [flash]
            pin = 4
            "#,
        )
        .unwrap();

        assert_eq!(fc.camera.format, Some(PixelFormat::Rgb565));
        assert_eq!(fc.camera.jpeg_quality, Some(60));
        assert_eq!(fc.flash.pin, Some(4));
        assert!(fc.server.port.is_none());
        assert!(fc.audio.enabled.is_none());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let result = load_config_file(Some(Path::new("/nonexistent/camlink.toml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn unknown_format_is_rejected() {
        let result: std::result::Result<ConfigFile, _> = toml::from_str("[camera]\nformat = \"bayer\"");
        assert!(result.is_err());
    }
}
