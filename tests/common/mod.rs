//! Common utilities for integration tests
//!
//! Starts a real listener on an ephemeral loopback port and talks to it with
//! an off-the-shelf WebSocket client, so the hand-built handshake and codec
//! are checked against an independent implementation.

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use socketchat::chat::{ChatServer, SessionRegistry};
use socketchat::config::ServerConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Get the path to the `socketchat` binary
///
/// Prefers `CARGO_BIN_EXE_socketchat` (set by cargo for integration tests,
/// including custom target directories) and falls back to `cargo_bin()`.
#[allow(deprecated)] // cargo_bin() is deprecated but needed for fallback
pub fn socketchat_binary() -> PathBuf {
    std::env::var("CARGO_BIN_EXE_socketchat")
        .map(PathBuf::from)
        .unwrap_or_else(|_| assert_cmd::cargo::cargo_bin("socketchat"))
}

/// A `socketchat` command with the configuration environment cleared
pub fn socketchat_command() -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::new(socketchat_binary());
    cmd.env_remove("SOCKETCHAT_HOST")
        .env_remove("SOCKETCHAT_PORT")
        .env_remove("SOCKETCHAT_MAX_FRAME_BYTES")
        .env_remove("RUST_LOG");
    cmd
}

/// Start a server on 127.0.0.1 with an OS-assigned port
pub async fn start_server() -> (SocketAddr, Arc<SessionRegistry>) {
    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..ServerConfig::default()
    };
    let server = ChatServer::bind(&config).await.expect("bind test server");
    let addr = server.local_addr().expect("local addr");
    let registry = server.registry();
    tokio::spawn(server.run());
    (addr, registry)
}

pub async fn connect(addr: SocketAddr) -> Client {
    let (client, response) = tokio_tungstenite::connect_async(format!("ws://{}/", addr))
        .await
        .expect("WebSocket handshake");
    assert_eq!(response.status().as_u16(), 101);
    client
}

/// Connect and wait until the server has registered the session
pub async fn connect_registered(addr: SocketAddr, registry: &SessionRegistry) -> Client {
    let before = registry.len().await;
    let client = connect(addr).await;
    wait_for_sessions(registry, before + 1).await;
    client
}

pub async fn wait_for_sessions(registry: &SessionRegistry, expected: usize) {
    for _ in 0..500 {
        if registry.len().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "registry has {} sessions, expected {}",
        registry.len().await,
        expected
    );
}

pub async fn send_json(client: &mut Client, value: Value) {
    client
        .send(WsMessage::Text(value.to_string()))
        .await
        .expect("send frame");
}

pub async fn send_raw(client: &mut Client, text: &str) {
    client
        .send(WsMessage::Text(text.to_string()))
        .await
        .expect("send frame");
}

/// Next text message as JSON, failing the test after a timeout
pub async fn recv_json(client: &mut Client) -> Value {
    loop {
        let next = tokio::time::timeout(RECV_TIMEOUT, client.next())
            .await
            .expect("timed out waiting for a message")
            .expect("connection closed")
            .expect("read error");
        if let WsMessage::Text(text) = next {
            return serde_json::from_str(&text).expect("server sent invalid JSON");
        }
    }
}

/// Skip broadcast traffic until a message of `kind` arrives
pub async fn recv_kind(client: &mut Client, kind: &str) -> Value {
    loop {
        let message = recv_json(client).await;
        if message["type"] == kind {
            return message;
        }
    }
}

/// Read the first private reply to a SET_USERNAME, skipping broadcasts
pub async fn recv_name_reply(client: &mut Client) -> Value {
    loop {
        let message = recv_json(client).await;
        if message["type"] != "CHAT" {
            return message;
        }
    }
}

/// Assert nothing arrives for `wait`
pub async fn expect_silence(client: &mut Client, wait: Duration) {
    if let Ok(Some(Ok(message))) = tokio::time::timeout(wait, client.next()).await {
        panic!("expected no message, got {:?}", message);
    }
}

/// Claim a name and consume the reply plus this client's copy of the join notice
pub async fn set_username(client: &mut Client, name: &str) {
    send_json(
        client,
        serde_json::json!({"type": "SET_USERNAME", "username": name}),
    )
    .await;
    let reply = recv_json(client).await;
    assert_eq!(reply["type"], "USERNAME_SET", "unexpected reply {}", reply);
    let join = recv_json(client).await;
    assert_eq!(join["content"], format!("{} has joined the chat", name));
}
