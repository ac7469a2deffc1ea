//! camlink - camera and audio media endpoint
//!
//! Serves a camera and a microphone/speaker pair over the network:
//! - `/capture`: one illuminated JPEG snapshot
//! - `/stream`: continuous MJPEG (`multipart/x-mixed-replace`)
//! - `/ws_audio`: microphone PCM to the client
//! - `/ws_speak`: client PCM to the speaker
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  FrameLease   ┌────────────┐   Jpeg    ┌──────────────────┐
//! │ FrameSource  ├──────────────▶│ transcode  ├──────────▶│ /capture /stream │
//! └──────────────┘               └────────────┘           └──────────────────┘
//! ┌──────────────┐  AudioChunk   ┌────────────┐  Binary   ┌──────────────────┐
//! │ MicSource    ├──────────────▶│ MicCapture ├──────────▶│ /ws_audio        │
//! └──────────────┘   (thread)    └────────────┘           └──────────────────┘
//! ┌──────────────┐  AudioChunk   ┌───────────────┐ Binary ┌──────────────────┐
//! │ SpeakerSink  │◀──────────────┤ PlaybackQueue │◀───────┤ /ws_speak        │
//! └──────────────┘ (playback     └───────────────┘        └──────────────────┘
//!                   thread)
//! ```
//!
//! Hardware sits behind traits ([`camera::FrameSource`], [`audio::MicSource`],
//! [`audio::SpeakerSink`], [`camera::LedDriver`]) and everything shared lives
//! in one [`context::MediaContext`].

pub mod api;
pub mod audio;
pub mod camera;
pub mod config;
pub mod context;
pub mod error;

pub use config::Config;
pub use context::{MediaContext, MediaSettings};
pub use error::{Error, Result};
