//! End-to-end tests against the real axum app over WebSocket.

use firechat_relay_server::{serve, Config};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn test_config() -> Config {
    let mut config = Config::default();
    config.host = "127.0.0.1".into();
    config.metrics.enabled = false;
    config
}

async fn start(config: Config) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, config, std::future::pending()));
    addr
}

fn ws_url(addr: SocketAddr, user: &str) -> String {
    format!("ws://{}/ws?userId={}", addr, user)
}

async fn connect(addr: SocketAddr, user: &str) -> Client {
    connect_async(ws_url(addr, user)).await.unwrap().0
}

/// Connect and consume the connect-time `user-online` and snapshot frames.
async fn connect_ready(addr: SocketAddr, user: &str) -> (Client, Value) {
    let mut client = connect(addr, user).await;
    let online = next_event(&mut client).await;
    assert_eq!(online["event"], "user-online");
    assert_eq!(online["data"]["userId"], user);

    let snapshot = next_event(&mut client).await;
    assert_eq!(snapshot["event"], "online-users-snapshot");
    (client, snapshot["data"].clone())
}

async fn next_event(client: &mut Client) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for event")
            .expect("connection ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn send_event(client: &mut Client, event: &str, data: Value) {
    let frame = json!({ "event": event, "data": data }).to_string();
    client.send(Message::Text(frame)).await.unwrap();
}

async fn assert_silent(client: &mut Client) {
    let next = timeout(Duration::from_millis(200), client.next()).await;
    assert!(next.is_err(), "unexpected frame: {:?}", next);
}

/// Join a channel and wait until the relay has applied it.
async fn join_synced(client: &mut Client, channel: &str) {
    send_event(client, "join-channel", json!(channel)).await;
    send_event(
        client,
        "send-channel-message",
        json!({ "channelId": channel, "message": { "sync": true } }),
    )
    .await;
    let echo = next_event(client).await;
    assert_eq!(echo["event"], "channel-message");
    assert_eq!(echo["data"], json!({ "sync": true }));
}

async fn http_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        path, addr
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn test_health_probe() {
    let addr = start(test_config()).await;

    for path in ["/health", "/"] {
        let response = http_get(addr, path).await;
        assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
        assert!(response.contains(r#""status":"ok""#));
        assert!(response.contains(r#""service":"firechat-relay""#));
    }

    let response = http_get(addr, "/nope").await;
    assert!(response.starts_with("HTTP/1.1 404"), "{}", response);
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let addr = start(test_config()).await;

    for url in [
        format!("ws://{}/ws", addr),
        format!("ws://{}/ws?userId=", addr),
    ] {
        match connect_async(url).await {
            Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), 401),
            other => panic!("expected 401, got {:?}", other.map(|(_, r)| r)),
        }
    }
}

#[tokio::test]
async fn test_connect_and_disconnect_presence() {
    let addr = start(test_config()).await;

    let (mut alice, snapshot) = connect_ready(addr, "alice").await;
    assert_eq!(snapshot, json!([]));

    let (mut bob, snapshot) = connect_ready(addr, "bob").await;
    assert_eq!(snapshot, json!(["alice"]));

    let online = next_event(&mut alice).await;
    assert_eq!(online["event"], "user-online");
    assert_eq!(online["data"], json!({ "userId": "bob", "status": "online" }));

    bob.close(None).await.unwrap();
    let offline = next_event(&mut alice).await;
    assert_eq!(offline["event"], "user-offline");
    assert_eq!(offline["data"], json!({ "userId": "bob" }));

    let (_carol, snapshot) = connect_ready(addr, "carol").await;
    assert_eq!(snapshot, json!(["alice"]));
}

#[tokio::test]
async fn test_superseded_connection_closes_silently() {
    let addr = start(test_config()).await;

    let (mut bob, _) = connect_ready(addr, "bob").await;
    let (mut first_tab, _) = connect_ready(addr, "alice").await;
    assert_eq!(next_event(&mut bob).await["data"]["userId"], "alice");

    let (mut second_tab, snapshot) = connect_ready(addr, "alice").await;
    assert_eq!(snapshot, json!(["bob"]));
    assert_eq!(next_event(&mut bob).await["data"]["userId"], "alice");
    assert_eq!(next_event(&mut first_tab).await["event"], "user-online");

    first_tab.close(None).await.unwrap();
    assert_silent(&mut bob).await;

    second_tab.close(None).await.unwrap();
    let offline = next_event(&mut bob).await;
    assert_eq!(offline["event"], "user-offline");
    assert_eq!(offline["data"]["userId"], "alice");
}

#[tokio::test]
async fn test_channel_typing_direct_and_status_flow() {
    let addr = start(test_config()).await;

    let (mut alice, _) = connect_ready(addr, "alice").await;
    let (mut bob, _) = connect_ready(addr, "bob").await;
    let (mut carol, _) = connect_ready(addr, "carol").await;
    for _ in 0..2 {
        next_event(&mut alice).await; // bob, carol online
    }
    next_event(&mut bob).await; // carol online

    join_synced(&mut alice, "general").await;
    join_synced(&mut bob, "general").await;
    assert_eq!(next_event(&mut alice).await["data"], json!({ "sync": true }));

    // Channel message reaches every member, sender included, verbatim
    let message = json!({ "id": "m1", "content": "hello", "meta": { "n": [1, 2.5, null] } });
    send_event(
        &mut alice,
        "send-channel-message",
        json!({ "channelId": "general", "message": message }),
    )
    .await;
    for client in [&mut alice, &mut bob] {
        let event = next_event(client).await;
        assert_eq!(event["event"], "channel-message");
        assert_eq!(event["data"], message);
    }
    assert_silent(&mut carol).await;

    // Typing excludes the sender
    let typing = json!({ "channelId": "general", "userId": "bob", "name": "Bob" });
    send_event(&mut bob, "typing-start", typing.clone()).await;
    let event = next_event(&mut alice).await;
    assert_eq!(event["event"], "typing-start");
    assert_eq!(event["data"], typing);
    assert_silent(&mut bob).await;

    // Direct message goes to the receiver and echoes once to the sender
    let dm = json!({ "id": "d1", "content": "psst" });
    send_event(
        &mut alice,
        "send-direct-message",
        json!({ "receiverId": "carol", "message": dm }),
    )
    .await;
    for client in [&mut carol, &mut alice] {
        let event = next_event(client).await;
        assert_eq!(event["event"], "direct-message");
        assert_eq!(event["data"], dm);
    }
    assert_silent(&mut alice).await;
    assert_silent(&mut bob).await;

    // DM typing reaches only the receiver
    let dm_typing = json!({ "receiverId": "alice", "senderId": "carol" });
    send_event(&mut carol, "dm-typing-start", dm_typing.clone()).await;
    let event = next_event(&mut alice).await;
    assert_eq!(event["event"], "dm-typing-start");
    assert_eq!(event["data"], dm_typing);
    assert_silent(&mut carol).await;

    // Status changes are broadcast to everyone
    send_event(&mut bob, "status-update", json!("away")).await;
    for client in [&mut alice, &mut bob, &mut carol] {
        let event = next_event(client).await;
        assert_eq!(event["event"], "user-status-changed");
        assert_eq!(event["data"], json!({ "userId": "bob", "status": "away" }));
    }
}

#[tokio::test]
async fn test_undecodable_frames_are_dropped() {
    let addr = start(test_config()).await;
    let (mut alice, _) = connect_ready(addr, "alice").await;

    alice.send(Message::Text("not json".into())).await.unwrap();
    send_event(&mut alice, "no-such-event", json!({})).await;
    // Missing routing field
    send_event(&mut alice, "send-channel-message", json!({ "message": {} })).await;
    alice
        .send(Message::Binary(vec![0xff, 0xfe, 0x00]))
        .await
        .unwrap();
    assert_silent(&mut alice).await;

    // The connection survives and binary UTF-8 JSON is accepted
    let join = json!({ "event": "join-channel", "data": { "channelId": "general" } });
    alice
        .send(Message::Binary(join.to_string().into_bytes()))
        .await
        .unwrap();
    send_event(
        &mut alice,
        "send-channel-message",
        json!({ "channelId": "general", "message": "still here" }),
    )
    .await;
    let echo = next_event(&mut alice).await;
    assert_eq!(echo["data"], "still here");

    // Only routing fields are required; an absent message is forwarded as null
    send_event(&mut alice, "send-channel-message", json!({ "channelId": "general" })).await;
    let echo = next_event(&mut alice).await;
    assert_eq!(echo["event"], "channel-message");
    assert_eq!(echo["data"], Value::Null);
}

#[tokio::test]
async fn test_origin_allow_list() {
    let mut config = test_config();
    config.cors.allowed_origins = vec!["http://allowed.test".into(), "*.trusted.test".into()];
    let addr = start(config).await;

    let mut request = ws_url(addr, "alice").into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", HeaderValue::from_static("http://evil.test"));
    match connect_async(request).await {
        Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), 403),
        other => panic!("expected 403, got {:?}", other.map(|(_, r)| r)),
    }

    for origin in ["http://allowed.test", "https://app.trusted.test"] {
        let mut request = ws_url(addr, "alice").into_client_request().unwrap();
        request
            .headers_mut()
            .insert("Origin", HeaderValue::from_static(origin));
        assert!(connect_async(request).await.is_ok(), "{} refused", origin);
    }

    // Clients without an Origin header are not browsers and are let through
    assert!(connect_async(ws_url(addr, "bob")).await.is_ok());
}

#[tokio::test]
async fn test_connection_cap() {
    let mut config = test_config();
    config.limits.max_connections = 1;
    let addr = start(config).await;

    let (_alice, _) = connect_ready(addr, "alice").await;
    match connect_async(ws_url(addr, "bob")).await {
        Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), 503),
        other => panic!("expected 503, got {:?}", other.map(|(_, r)| r)),
    }
}
