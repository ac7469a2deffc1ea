//! `/capture`: one illuminated snapshot

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};

use super::MediaError;
use crate::camera::{FrameLease, Jpeg, encode_blocking};
use crate::context::MediaContext;

/// Take one snapshot
///
/// The flash is lit for the settle interval and the acquisition, and switched
/// off before any transcoding, whether or not the camera delivered.
///
/// # Errors
///
/// Returns the acquisition or transcode failure; the frame is released either way
pub async fn snapshot(ctx: &MediaContext) -> crate::Result<Jpeg> {
    let lease = {
        let _lit = ctx.flash().engage().await;
        tokio::time::sleep(ctx.settings().flash_settle).await;
        FrameLease::acquire_blocking(ctx.camera()).await
    };

    encode_blocking(lease?, ctx.settings().jpeg_quality).await
}

pub(super) async fn capture(State(ctx): State<Arc<MediaContext>>) -> Result<Response, MediaError> {
    let jpeg = snapshot(&ctx).await?;
    tracing::debug!(bytes = jpeg.len(), "snapshot");

    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg"),
            (header::CONTENT_DISPOSITION, "inline; filename=capture.jpg"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        ],
        Body::from(jpeg.into_bytes()),
    )
        .into_response())
}
