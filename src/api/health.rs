//! Health check endpoint

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::audio::{PlaybackStats, QueueStats};
use crate::camera::IlluminationState;
use crate::context::MediaContext;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Open `/stream` responses
    pub streams: usize,
    /// Connected `/ws_speak` clients
    pub speakers: usize,
    /// Whether a `/ws_audio` session owns the microphone
    pub mic_busy: bool,
    pub illumination: IlluminationState,
    pub playback_queue: QueueStats,
    pub playback: PlaybackStats,
}

/// Build health router
pub fn router() -> Router<Arc<MediaContext>> {
    Router::new().route("/health", get(health))
}

async fn health(State(ctx): State<Arc<MediaContext>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        streams: ctx.streams().active(),
        speakers: ctx.speakers().active(),
        mic_busy: ctx.mic_busy(),
        illumination: ctx.flash().state(),
        playback_queue: ctx.playback_queue().stats(),
        playback: ctx.playback_counters().stats(),
    })
}
