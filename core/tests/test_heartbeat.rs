//! Heartbeat delivery to networked peers
//!
//! Run with: cargo test --test test_heartbeat

use dglab_relay_core::protocol::decode_envelope;
use dglab_relay_core::{Envelope, MessageType, RelayServer, RelayServerConfig, RetCode};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tokio_tungstenite::tungstenite::Message;

const INTERVAL: Duration = Duration::from_millis(200);

async fn start_server(heartbeat_interval: Option<Duration>) -> RelayServer {
    tracing_subscriber::fmt().with_env_filter("debug").try_init().ok();

    RelayServer::bind(RelayServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        heartbeat_interval,
        ..Default::default()
    })
    .await
    .expect("Failed to start relay server")
}

/// Collect every envelope arriving on `uri` within `window` of connecting
async fn collect_for(uri: &str, window: Duration) -> Vec<Envelope> {
    let (mut ws, _) = tokio_tungstenite::connect_async(uri)
        .await
        .expect("Failed to connect");
    let deadline = Instant::now() + window;
    let mut received = Vec::new();

    while let Ok(Some(frame)) = tokio::time::timeout_at(deadline, ws.next()).await {
        if let Ok(Message::Text(text)) = frame {
            received.push(decode_envelope(&text).expect("Hub sent malformed envelope"));
        }
    }
    ws.close(None).await.ok();
    received
}

#[tokio::test]
async fn test_heartbeats_at_interval() {
    let server = start_server(Some(INTERVAL)).await;
    assert!(server.heartbeat_enabled());

    let received = collect_for(&server.uri(), INTERVAL * 7 / 2).await;
    // A round may reach the peer just ahead of its identity
    let peer_id = received
        .iter()
        .find(|e| e.kind() == MessageType::Bind)
        .and_then(|e| e.client_id())
        .expect("identity envelope");

    let heartbeats: Vec<_> = received
        .iter()
        .filter(|e| e.kind() == MessageType::Heartbeat)
        .collect();
    assert!(heartbeats.len() >= 3, "got {} heartbeats", heartbeats.len());
    for heartbeat in heartbeats {
        assert_eq!(heartbeat.client_id(), Some(peer_id));
        assert_eq!(heartbeat.target_id(), None);
        assert_eq!(heartbeat.body().as_code(), Some(RetCode::Success));
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_no_heartbeats_when_disabled() {
    let server = start_server(None).await;

    let received = collect_for(&server.uri(), INTERVAL * 2).await;
    assert_eq!(received.len(), 1, "only the identity envelope");
    assert!(!server.set_heartbeat_interval(INTERVAL));

    server.shutdown().await;
}

#[tokio::test]
async fn test_heartbeat_names_bound_counterpart() {
    let server = start_server(Some(INTERVAL)).await;

    let connect = || async {
        let (mut ws, _) = tokio_tungstenite::connect_async(server.uri())
            .await
            .expect("Failed to connect");
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    let envelope = decode_envelope(&text).unwrap();
                    if envelope.kind() == MessageType::Bind {
                        let id = envelope.client_id().unwrap();
                        return (ws, id);
                    }
                }
                other => panic!("expected identity, got {:?}", other),
            }
        }
    };
    let (mut terminal, terminal_id) = connect().await;
    let (mut app, app_id) = connect().await;

    let bind = Envelope::bind_request(terminal_id, app_id);
    let text = dglab_relay_core::protocol::encode_envelope(&bind).unwrap();
    app.send(Message::Text(text)).await.unwrap();

    // The first round after binding names the app
    let heartbeat = timeout(Duration::from_secs(5), async {
        loop {
            if let Some(Ok(Message::Text(text))) = terminal.next().await {
                let envelope = decode_envelope(&text).unwrap();
                if envelope.kind() == MessageType::Heartbeat && envelope.target_id().is_some() {
                    return envelope;
                }
            }
        }
    })
    .await
    .expect("No heartbeat naming the app");

    assert_eq!(heartbeat, Envelope::heartbeat(terminal_id, Some(app_id)));

    server.shutdown().await;
}
