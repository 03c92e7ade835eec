//! End-to-end relay tests over real WebSocket connections
//!
//! Each test binds the router on an ephemeral port, wires a SettleScheduler
//! to the same RealtimeHub and drives it with capture signals.

use capture_relay::{
    capture_source::{CaptureConfig, CaptureEvent, CaptureSource},
    realtime_hub::{HubMessage, RealtimeHub, WELCOME_MESSAGE},
    settle_scheduler::{CaptureSignal, OverlapPolicy, SettleScheduler},
    state::{AppConfig, AppState},
    web_api,
};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SETTLE: Duration = Duration::from_millis(200);
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

struct Relay {
    addr: SocketAddr,
    hub: Arc<RealtimeHub>,
    signals: mpsc::Sender<CaptureSignal>,
    _images: tempfile::TempDir,
}

async fn start_relay() -> Relay {
    let images = tempfile::tempdir().unwrap();
    let mut config = AppConfig::from_lookup(|_| None).unwrap();
    config.images_dir = images.path().to_path_buf();
    config.settle_delay_ms = SETTLE.as_millis() as u64;

    let hub = Arc::new(RealtimeHub::new());
    let (signals, rx) = mpsc::channel(32);
    SettleScheduler::new(hub.clone(), config.settle_delay(), OverlapPolicy::Replace).spawn(rx);

    let app = web_api::create_router(AppState::new(config, hub.clone()));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Relay {
        addr,
        hub,
        signals,
        _images: images,
    }
}

/// Connect and consume the welcome frame
async fn connect(addr: SocketAddr) -> Client {
    let (mut client, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    assert_eq!(
        next_message(&mut client).await,
        Some(HubMessage::Connected(WELCOME_MESSAGE.to_string()))
    );
    client
}

async fn next_message(client: &mut Client) -> Option<HubMessage> {
    next_message_within(client, RECV_TIMEOUT).await
}

async fn next_message_within(client: &mut Client, wait: Duration) -> Option<HubMessage> {
    loop {
        let frame = tokio::time::timeout(wait, client.next()).await.ok()??.ok()?;
        if let Message::Text(text) = frame {
            return Some(serde_json::from_str(&text).unwrap());
        }
    }
}

async fn capture(relay: &Relay, artifact_id: &str) {
    relay
        .signals
        .send(CaptureSignal::Requested(artifact_id.into()))
        .await
        .unwrap();
    relay
        .signals
        .send(CaptureSignal::Completed(CaptureEvent::completed(artifact_id.into())))
        .await
        .unwrap();
}

#[tokio::test]
async fn settled_capture_reaches_every_session() {
    let relay = start_relay().await;
    let mut a = connect(relay.addr).await;
    let mut b = connect(relay.addr).await;

    capture(&relay, "img2.jpg").await;

    let expected = Some(HubMessage::SendData("img2.jpg".to_string()));
    assert_eq!(next_message(&mut a).await, expected);
    assert_eq!(next_message(&mut b).await, expected);

    // Joins after the broadcast: welcome only
    let mut c = connect(relay.addr).await;
    assert_eq!(next_message_within(&mut c, SETTLE * 2).await, None);
}

#[tokio::test]
async fn failed_capture_is_not_broadcast() {
    let relay = start_relay().await;
    let mut a = connect(relay.addr).await;

    relay
        .signals
        .send(CaptureSignal::Requested("img1.jpg".into()))
        .await
        .unwrap();
    relay
        .signals
        .send(CaptureSignal::Completed(CaptureEvent::failed(
            "img1.jpg".into(),
            "device error",
        )))
        .await
        .unwrap();

    assert_eq!(next_message_within(&mut a, SETTLE * 3).await, None);

    // Next cycle still goes through
    capture(&relay, "img2.jpg").await;
    assert_eq!(
        next_message(&mut a).await,
        Some(HubMessage::SendData("img2.jpg".to_string()))
    );
}

#[tokio::test]
async fn disconnected_session_does_not_block_others() {
    let relay = start_relay().await;
    let mut a = connect(relay.addr).await;
    let mut b = connect(relay.addr).await;

    a.send(Message::Close(None)).await.unwrap();
    drop(a);

    capture(&relay, "img3.jpg").await;
    assert_eq!(
        next_message(&mut b).await,
        Some(HubMessage::SendData("img3.jpg".to_string()))
    );

    // The closed session is gone either way (unregistered on close or dropped on send)
    let mut remaining = relay.hub.connection_count();
    for _ in 0..50 {
        if remaining == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        remaining = relay.hub.connection_count();
    }
    assert_eq!(remaining, 1);
}

#[tokio::test]
async fn capture_loop_drives_the_relay() {
    let images = tempfile::tempdir().unwrap();
    let hub = Arc::new(RealtimeHub::new());
    let (tx, rx) = mpsc::channel(32);
    SettleScheduler::new(hub.clone(), Duration::from_millis(50), OverlapPolicy::Queue).spawn(rx);

    let (_id, mut session) = hub.register().await;
    session.recv().await.unwrap();

    let source = Arc::new(
        CaptureSource::new(
            CaptureConfig {
                images_dir: images.path().to_path_buf(),
                interval: Duration::from_millis(100),
                program: "touch".to_string(),
                args: vec!["{path}".to_string()],
                timeout: Duration::from_secs(2),
            },
            tx,
        )
        .await
        .unwrap(),
    );
    source.start().await;

    let frame = tokio::time::timeout(RECV_TIMEOUT, session.recv())
        .await
        .unwrap()
        .unwrap();
    source.stop().await;

    let artifact_id = match serde_json::from_str::<HubMessage>(&frame).unwrap() {
        HubMessage::SendData(id) => id,
        other => panic!("unexpected frame {:?}", other),
    };
    assert!(artifact_id.ends_with(".jpg"));
    assert!(images.path().join(&artifact_id).exists());
}
