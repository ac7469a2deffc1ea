//! Audio WebSocket endpoints against a live listener

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use camlink::MediaContext;
use camlink::api;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

mod common;
use common::{ScriptedCamera, ScriptedMic, fast_settings};

async fn serve(ctx: Arc<MediaContext>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, api::router(ctx)).await.unwrap();
    });
    addr
}

async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

fn mic_context() -> Arc<MediaContext> {
    Arc::new(
        MediaContext::builder(Arc::new(ScriptedCamera::new(vec![])))
            .mic(Arc::new(ScriptedMic::endless(1 << 20)))
            .settings(fast_settings())
            .build(),
    )
}

#[tokio::test]
async fn uplink_sends_pcm_blocks_and_frees_the_mic_on_close() {
    let ctx = mic_context();
    let addr = serve(ctx.clone()).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/ws_audio")).await.unwrap();
    for _ in 0..3 {
        let data = match ws.next().await.unwrap().unwrap() {
            Message::Binary(data) => data,
            other => panic!("expected a binary block, got {other:?}"),
        };
        // 320 samples of 1 << 20 shifted by 14, little-endian
        assert_eq!(data.len(), 640);
        assert!(
            data.chunks_exact(2)
                .all(|pair| i16::from_le_bytes([pair[0], pair[1]]) == 64)
        );
    }
    assert!(ctx.mic_busy());

    ws.close(None).await.unwrap();
    assert!(eventually(|| !ctx.mic_busy()).await);
    assert!(ctx.claim_mic().is_some());
}

#[tokio::test]
async fn second_audio_client_gets_503() {
    let ctx = mic_context();
    let addr = serve(ctx.clone()).await;

    let (_first, _) = connect_async(format!("ws://{addr}/ws_audio")).await.unwrap();
    let err = connect_async(format!("ws://{addr}/ws_audio"))
        .await
        .unwrap_err();

    match err {
        WsError::Http(response) => assert_eq!(response.status(), 503),
        other => panic!("expected an HTTP refusal, got {other:?}"),
    }
    assert!(ctx.mic_busy());
}

#[tokio::test]
async fn oversized_speak_message_closes_the_socket() {
    let settings = camlink::MediaSettings {
        max_speak_message_bytes: 64,
        ..fast_settings()
    };
    let ctx = Arc::new(
        MediaContext::builder(Arc::new(ScriptedCamera::new(vec![])))
            .settings(settings)
            .build(),
    );
    let addr = serve(ctx.clone()).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/ws_speak")).await.unwrap();
    assert!(eventually(|| ctx.speakers().active() == 1).await);

    ws.send(Message::binary(vec![1u8; 32])).await.unwrap();
    assert!(eventually(|| ctx.playback_queue().stats().enqueued == 1).await);

    ws.send(Message::binary(vec![1u8; 128])).await.unwrap();
    let closed = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;

    assert!(closed.is_ok());
    assert!(eventually(|| ctx.speakers().active() == 0).await);
    assert_eq!(ctx.playback_queue().stats().enqueued, 1);
}
