//! `/ws_audio` and `/ws_speak`: raw PCM over WebSocket

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::{OwnedSemaphorePermit, mpsc};

use super::MediaError;
use crate::Result;
use crate::audio::{AudioChunk, Enqueue, MicCapture};
use crate::context::MediaContext;

/// Captured blocks buffered between the mic thread and the socket
const UPLINK_DEPTH: usize = 8;

/// Copy one inbound message into the playback queue
///
/// Returns `Ok(None)` for an empty message, which is ignored.
///
/// # Errors
///
/// Returns [`crate::Error::Allocation`] if the chunk buffer cannot be reserved
pub fn ingest_message(ctx: &MediaContext, payload: &[u8]) -> Result<Option<Enqueue>> {
    if payload.is_empty() {
        return Ok(None);
    }
    let chunk = AudioChunk::copy_from(payload)?;
    Ok(Some(ctx.playback_queue().offer(chunk)))
}

pub(super) async fn ws_audio(
    ws: WebSocketUpgrade,
    State(ctx): State<Arc<MediaContext>>,
) -> std::result::Result<Response, MediaError> {
    let permit = ctx.claim_mic().ok_or(MediaError::MicBusy)?;
    Ok(ws.on_upgrade(move |socket| audio_session(socket, ctx, permit)))
}

/// Stream microphone blocks to one client until either side gives up
///
/// The session ends only after the capture thread has exited and given the
/// microphone back. That thread notices a closed uplink on its next block, so
/// release lags the client's close by one block read (bounded by the device's
/// read stall timeout when the hardware stops delivering).
async fn audio_session(socket: WebSocket, ctx: Arc<MediaContext>, permit: OwnedSemaphorePermit) {
    let (tx, mut rx) = mpsc::channel::<AudioChunk>(UPLINK_DEPTH);
    let settings = ctx.settings();
    let capture = MicCapture::new(
        Arc::clone(ctx.mic()),
        settings.gain_shift,
        settings.block_samples,
    );
    let capture = match capture.spawn(permit, tx) {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!(error = %e, "failed to start mic capture");
            return;
        }
    };

    tracing::info!("audio uplink connected");
    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        let mut blocks = 0u64;
        while let Some(chunk) = rx.recv().await {
            if sender.send(Message::Binary(chunk.into())).await.is_err() {
                break;
            }
            blocks += 1;
        }
        // Capture ended on its own: tell the client
        let _ = sender.close().await;
        blocks
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
        }
    });

    // Aborting the send task drops the uplink receiver, which stops the capture thread
    tokio::select! {
        sent = &mut send_task => {
            recv_task.abort();
            tracing::info!(blocks = sent.unwrap_or_default(), "audio uplink closed");
        }
        _ = &mut recv_task => {
            send_task.abort();
            tracing::info!("audio uplink closed by client");
        }
    }

    match tokio::task::spawn_blocking(move || capture.join()).await {
        Ok(Ok(report)) => {
            tracing::debug!(exit = ?report.exit, blocks = report.blocks, "microphone released");
        }
        _ => tracing::warn!("mic capture thread panicked"),
    }
}

pub(super) async fn ws_speak(ws: WebSocketUpgrade, State(ctx): State<Arc<MediaContext>>) -> Response {
    let cap = ctx.settings().max_speak_message_bytes;
    ws.max_message_size(cap)
        .max_frame_size(cap)
        .on_upgrade(move |socket| speak_session(socket, ctx))
}

/// Feed one client's PCM into the playback queue
async fn speak_session(mut socket: WebSocket, ctx: Arc<MediaContext>) {
    let _session = ctx.speakers().enter();
    tracing::info!("speaker client connected");

    let (mut queued, mut dropped) = (0u64, 0u64);
    while let Some(msg) = socket.recv().await {
        match msg {
            Ok(Message::Binary(payload)) => match ingest_message(&ctx, &payload) {
                Ok(Some(Enqueue::Queued)) => queued += 1,
                Ok(Some(Enqueue::Dropped)) => dropped += 1,
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "closing speaker socket");
                    break;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "speaker socket error");
                break;
            }
        }
    }

    tracing::info!(queued, dropped, "speaker client disconnected");
}
