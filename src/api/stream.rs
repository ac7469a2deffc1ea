//! `/stream`: MJPEG over `multipart/x-mixed-replace`
//!
//! Each part is the boundary line, a header block carrying the exact JPEG
//! length, then the JPEG bytes. The streamer is a three-state loop:
//!
//! ```text
//! Acquiring ──frame──▶ Sending(jpeg) ──written──▶ Acquiring
//!     │                      │
//!     └──camera failed──▶ Closed(reason) ◀──write failed
//! ```
//!
//! A frame is held only while it is in `Sending`, and only until its bytes are
//! detached for the write. A slow client therefore never pins camera buffers.

use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::MediaError;
use crate::camera::{Jpeg, capture_jpeg};
use crate::context::MediaContext;
use crate::{Error, Result};

pub const PART_BOUNDARY: &str = "123456789000000000000987654321";

/// Response content type announcing [`PART_BOUNDARY`]
pub const STREAM_CONTENT_TYPE: &str =
    "multipart/x-mixed-replace; boundary=123456789000000000000987654321";

/// Delimiter written before every part
pub const STREAM_BOUNDARY: &str = "\r\n--123456789000000000000987654321\r\n";

/// Parts buffered between the streamer and the HTTP body
const BODY_CHANNEL_DEPTH: usize = 4;

/// Header block for a part carrying `len` JPEG bytes
#[must_use]
pub fn part_header(len: usize) -> String {
    format!("Content-Type: image/jpeg\r\nContent-Length: {len}\r\n\r\n")
}

/// Destination of multipart writes
#[async_trait]
pub trait PartSink: Send {
    /// # Errors
    ///
    /// Returns [`Error::NetworkWrite`] once the peer is gone
    async fn write(&mut self, bytes: Bytes) -> Result<()>;
}

/// Sink feeding an HTTP response body
pub struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
}

impl ChannelSink {
    #[must_use]
    pub const fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl PartSink for ChannelSink {
    async fn write(&mut self, bytes: Bytes) -> Result<()> {
        self.tx
            .send(bytes)
            .await
            .map_err(|_| Error::NetworkWrite("stream client disconnected".to_string()))
    }
}

/// Why a stream ended
#[derive(Debug)]
pub enum CloseReason {
    CameraFailed(Error),
    WriteFailed(Error),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CameraFailed(e) => write!(f, "camera failed: {e}"),
            Self::WriteFailed(e) => write!(f, "write failed: {e}"),
        }
    }
}

#[derive(Debug)]
pub struct StreamReport {
    pub frames: u64,
    pub reason: CloseReason,
}

enum StreamState {
    Acquiring,
    Sending(Jpeg),
    Closed(CloseReason),
}

/// Long-lived multipart writer for one client
pub struct MjpegStreamer {
    ctx: Arc<MediaContext>,
}

impl MjpegStreamer {
    #[must_use]
    pub const fn new(ctx: Arc<MediaContext>) -> Self {
        Self { ctx }
    }

    /// Write parts until the camera or the sink fails
    ///
    /// `first` is a frame already acquired by the caller; it is sent before
    /// any new acquisition.
    pub async fn run<S>(&self, first: Option<Jpeg>, sink: &mut S) -> StreamReport
    where
        S: PartSink + ?Sized,
    {
        let quality = self.ctx.settings().jpeg_quality;
        let pacing = self.ctx.settings().stream_pacing;
        let mut frames = 0u64;
        let mut state = first.map_or(StreamState::Acquiring, StreamState::Sending);

        let reason = loop {
            state = match state {
                StreamState::Acquiring => match capture_jpeg(self.ctx.camera(), quality).await {
                    Ok(jpeg) => StreamState::Sending(jpeg),
                    Err(e) => StreamState::Closed(CloseReason::CameraFailed(e)),
                },
                StreamState::Sending(jpeg) => match send_part(sink, jpeg).await {
                    Ok(()) => {
                        frames += 1;
                        tokio::time::sleep(pacing).await;
                        StreamState::Acquiring
                    }
                    Err(e) => StreamState::Closed(CloseReason::WriteFailed(e)),
                },
                StreamState::Closed(reason) => break reason,
            };
        };

        StreamReport { frames, reason }
    }
}

async fn send_part<S>(sink: &mut S, jpeg: Jpeg) -> Result<()>
where
    S: PartSink + ?Sized,
{
    // The frame goes back to the camera before anything waits on the client
    let header = part_header(jpeg.len());
    let body = jpeg.into_bytes();
    sink.write(Bytes::from_static(STREAM_BOUNDARY.as_bytes())).await?;
    sink.write(Bytes::from(header)).await?;
    sink.write(body).await
}

pub(super) async fn stream(
    State(ctx): State<Arc<MediaContext>>,
) -> std::result::Result<Response, MediaError> {
    let session = ctx.streams().enter();
    let first = capture_jpeg(ctx.camera(), ctx.settings().jpeg_quality).await?;

    let (tx, rx) = mpsc::channel::<Bytes>(BODY_CHANNEL_DEPTH);
    let streamer = MjpegStreamer::new(Arc::clone(&ctx));
    tokio::spawn(async move {
        let _session = session;
        let mut sink = ChannelSink::new(tx);
        tracing::info!("stream opened");
        let report = streamer.run(Some(first), &mut sink).await;
        tracing::info!(frames = report.frames, reason = %report.reason, "stream closed");
    });

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));
    Ok((
        [
            (header::CONTENT_TYPE, STREAM_CONTENT_TYPE),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        ],
        body,
    )
        .into_response())
}
