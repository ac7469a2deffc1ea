//! HTTP endpoint integration tests

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use camlink::api::{self, STREAM_BOUNDARY, STREAM_CONTENT_TYPE, part_header};
use camlink::MediaContext;
use camlink::camera::{PixelFormat, TestPatternCamera};
use tower::ServiceExt;

mod common;
use common::{
    RecordingLed, ScriptedCamera, context, fast_settings, jpeg_frame, raw_frame, wait_until,
};

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn capture_serves_ready_jpeg_with_flash_window() {
    let led = Arc::new(RecordingLed::default());
    let camera = Arc::new(
        ScriptedCamera::new(vec![Some(jpeg_frame(45_000, 0x5a))]).watching(led.clone()),
    );
    let settle = Duration::from_millis(30);
    let settings = camlink::MediaSettings {
        flash_settle: settle,
        ..fast_settings()
    };
    let ctx = context(camera.clone(), Some(led.clone()), settings);

    let response = api::router(ctx.clone()).oneshot(get("/capture")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body.len(), 45_000);
    assert_eq!(&body[..2], &[0xff, 0xd8]);
    drop(body);

    // Off at construction, on for the snapshot, off again
    assert_eq!(led.duties(), vec![0, 200, 0]);
    assert_eq!(camera.lit_at_acquire(), vec![true]);
    assert!(!ctx.flash().state().on);

    let events = led.events();
    let acquired_at = camera.acquired_at()[0];
    assert!(acquired_at.duration_since(events[1].1) >= settle);
    assert!(events[2].1.duration_since(acquired_at) < Duration::from_secs(1));

    assert_eq!(camera.released(), vec![0]);
}

#[tokio::test]
async fn capture_failure_is_500_with_flash_off() {
    let led = Arc::new(RecordingLed::default());
    let camera = Arc::new(ScriptedCamera::new(vec![None]).watching(led.clone()));
    let ctx = context(camera.clone(), Some(led.clone()), fast_settings());

    let response = api::router(ctx.clone()).oneshot(get("/capture")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(camera.lit_at_acquire(), vec![true]);
    assert_eq!(led.duties(), vec![0, 200, 0]);
    assert!(!ctx.flash().state().on);
    assert!(camera.acquired().is_empty());
    assert!(camera.released().is_empty());
}

#[tokio::test]
async fn capture_transcodes_raw_frames() {
    let camera = Arc::new(ScriptedCamera::new(vec![Some(raw_frame(true))]));
    let ctx = context(camera.clone(), None, fast_settings());

    let response = api::router(ctx).oneshot(get("/capture")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let decoded = image::load_from_memory(&body).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (16, 16));
    drop(body);

    assert_eq!(camera.released(), vec![0]);
}

#[tokio::test]
async fn capture_of_broken_raw_frame_releases_it() {
    let camera = Arc::new(ScriptedCamera::new(vec![Some(raw_frame(false))]));
    let ctx = context(camera.clone(), None, fast_settings());

    let response = api::router(ctx).oneshot(get("/capture")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(camera.acquired(), vec![0]);
    assert_eq!(camera.released(), vec![0]);
}

#[tokio::test]
async fn stream_sends_parts_byte_for_byte() {
    let frames = [(1_200, 0x11), (900, 0x22), (2_048, 0x33)];
    let script = frames
        .iter()
        .map(|&(len, fill)| Some(jpeg_frame(len, fill)))
        .collect();
    let camera = Arc::new(ScriptedCamera::new(script));
    let ctx = context(camera.clone(), None, fast_settings());

    let response = api::stream_router(ctx.clone()).oneshot(get("/stream")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], STREAM_CONTENT_TYPE);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

    // The scripted camera fails after three frames, which ends the stream
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();

    let mut expected = Vec::new();
    for &(len, fill) in &frames {
        expected.extend_from_slice(STREAM_BOUNDARY.as_bytes());
        expected.extend_from_slice(part_header(len).as_bytes());
        expected.extend_from_slice(jpeg_frame(len, fill).data());
    }
    assert_eq!(body.len(), expected.len());
    assert_eq!(&body[..], &expected[..]);
    drop(body);

    assert!(wait_until(Duration::from_secs(1), || ctx.streams().active() == 0));
    let mut released = camera.released();
    released.sort_unstable();
    assert_eq!(released, vec![0, 1, 2]);
}

#[tokio::test]
async fn stream_failure_on_connect_is_500() {
    let camera = Arc::new(ScriptedCamera::new(vec![]));
    let ctx = context(camera.clone(), None, fast_settings());

    let response = api::stream_router(ctx.clone()).oneshot(get("/stream")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(ctx.streams().active(), 0);
    assert!(camera.released().is_empty());
}

#[tokio::test]
async fn stalled_stream_client_leaves_capture_working() {
    let camera = Arc::new(TestPatternCamera::new(16, 16, PixelFormat::Jpeg).with_buffers(2));
    let ctx = Arc::new(
        MediaContext::builder(camera.clone())
            .settings(fast_settings())
            .build(),
    );

    // Never read: the streamer fills the body channel and then waits on it
    let stream = api::stream_router(ctx.clone()).oneshot(get("/stream")).await.unwrap();
    assert_eq!(stream.status(), StatusCode::OK);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(camera.outstanding(), 0);

    let response = api::router(ctx.clone()).oneshot(get("/capture")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..2], &[0xff, 0xd8]);

    assert_eq!(ctx.streams().active(), 1);
    drop(stream);
}

#[tokio::test]
async fn health_reports_pipeline_state() {
    let camera = Arc::new(ScriptedCamera::new(vec![]));
    let settings = camlink::MediaSettings {
        queue_depth: 3,
        ..fast_settings()
    };
    let ctx = context(camera, None, settings);
    let _speaker = ctx.speakers().enter();
    let _mic = ctx.claim_mic().unwrap();

    let response = api::router(ctx).oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(json["status"], "ok");
    assert_eq!(json["streams"], 0);
    assert_eq!(json["speakers"], 1);
    assert_eq!(json["mic_busy"], true);
    assert_eq!(json["illumination"]["on"], false);
    assert_eq!(json["playback_queue"]["capacity"], 3);
    assert_eq!(json["playback"]["played"], 0);
}
