//! HTTP and WebSocket surface
//!
//! Two listeners, as on the device: the control listener serves `/capture`,
//! `/health` and both audio sockets; the stream listener serves `/stream`, so a
//! long-lived stream never occupies the server that answers snapshots.

pub mod audio;
pub mod capture;
pub mod health;
pub mod stream;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::context::MediaContext;
use crate::{Error, Result};

pub use audio::ingest_message;
pub use capture::snapshot;
pub use stream::{
    ChannelSink, CloseReason, MjpegStreamer, PART_BOUNDARY, PartSink, STREAM_BOUNDARY,
    STREAM_CONTENT_TYPE, StreamReport, part_header,
};

/// Request-level failures of the media endpoints
#[derive(Debug)]
pub enum MediaError {
    /// Camera acquisition or transcode failed
    Capture(Error),
    /// Another `/ws_audio` session owns the microphone
    MicBusy,
}

impl IntoResponse for MediaError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Capture(e) => {
                tracing::warn!(error = %e, "capture failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            Self::MicBusy => (
                StatusCode::SERVICE_UNAVAILABLE,
                "microphone is in use".to_string(),
            ),
        };

        (
            status,
            [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
            message,
        )
            .into_response()
    }
}

impl From<Error> for MediaError {
    fn from(e: Error) -> Self {
        Self::Capture(e)
    }
}

/// Control routes: snapshot, health and the two audio sockets
pub fn router(ctx: Arc<MediaContext>) -> Router {
    Router::new()
        .route("/capture", get(capture::capture))
        .route("/ws_audio", get(audio::ws_audio))
        .route("/ws_speak", get(audio::ws_speak))
        .merge(health::router())
        .with_state(ctx)
}

/// Stream routes
pub fn stream_router(ctx: Arc<MediaContext>) -> Router {
    Router::new()
        .route("/stream", get(stream::stream))
        .with_state(ctx)
}

/// Builder for [`MediaServer`]
pub struct MediaServerBuilder {
    ctx: Arc<MediaContext>,
    host: String,
    port: u16,
    stream_port: u16,
    static_dir: Option<PathBuf>,
}

impl MediaServerBuilder {
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub const fn stream_port(mut self, port: u16) -> Self {
        self.stream_port = port;
        self
    }

    /// Serve files from `dir` for unmatched control routes
    #[must_use]
    pub fn static_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.static_dir = dir;
        self
    }

    #[must_use]
    pub fn build(self) -> MediaServer {
        MediaServer {
            ctx: self.ctx,
            host: self.host,
            port: self.port,
            stream_port: self.stream_port,
            static_dir: self.static_dir,
        }
    }
}

/// Media server: control and stream listeners sharing one context
pub struct MediaServer {
    ctx: Arc<MediaContext>,
    host: String,
    port: u16,
    stream_port: u16,
    static_dir: Option<PathBuf>,
}

impl MediaServer {
    #[must_use]
    pub fn builder(ctx: Arc<MediaContext>) -> MediaServerBuilder {
        MediaServerBuilder {
            ctx,
            host: "0.0.0.0".to_string(),
            port: 8080,
            stream_port: 8081,
            static_dir: None,
        }
    }

    /// Control router with static fallback and layers applied
    fn control_router(&self) -> Router {
        let mut router = router(Arc::clone(&self.ctx));

        if let Some(static_dir) = &self.static_dir {
            router = router.fallback_service(ServeDir::new(static_dir));
            tracing::info!(path = %static_dir.display(), "serving static files");
        }

        with_layers(router)
    }

    /// Run both listeners until either fails
    ///
    /// # Errors
    ///
    /// Returns error if a listener fails to bind or serve
    pub async fn run(self) -> Result<()> {
        let control = bind(&self.host, self.port).await?;
        let stream = bind(&self.host, self.stream_port).await?;

        tracing::info!(
            port = self.port,
            stream_port = self.stream_port,
            "media server listening"
        );

        let control_app = self.control_router();
        let stream_app = with_layers(stream_router(Arc::clone(&self.ctx)));

        tokio::try_join!(
            async {
                axum::serve(control, control_app)
                    .await
                    .map_err(|e| Error::Config(format!("control server error: {e}")))
            },
            async {
                axum::serve(stream, stream_app)
                    .await
                    .map_err(|e| Error::Config(format!("stream server error: {e}")))
            },
        )?;

        Ok(())
    }

    /// Run the server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

fn with_layers(router: Router) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    router.layer(cors).layer(TraceLayer::new_for_http())
}

async fn bind(host: &str, port: u16) -> Result<TcpListener> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| Error::Config(format!("invalid listen address {host}:{port}: {e}")))?;
    TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Config(format!("failed to bind {addr}: {e}")))
}
