//! Offline session replay against a mock server adapter.

mod support;

use std::time::Duration;

use serde_json::{json, Value};
use uuid::Uuid;

use lilith_mitm::core::correlation::{extract_id, extract_method};
use lilith_mitm::core::models::{Direction, ProxyMessage, TransportKind};
use lilith_mitm::mcp::replay::{replay_messages, ReplayOptions};

use support::{mock_pair, MockRemote};

fn captured(sequence: u64, direction: Direction, raw: Value) -> ProxyMessage {
    ProxyMessage {
        id: Uuid::new_v4(),
        sequence,
        timestamp: chrono::Utc::now(),
        direction,
        transport: TransportKind::Stdio,
        jsonrpc_id: extract_id(&raw),
        method: extract_method(&raw).map(str::to_string),
        raw,
        correlated_id: None,
        modified: false,
        original_raw: None,
    }
}

fn options(timeout_ms: u64, auto_handshake: bool) -> ReplayOptions {
    ReplayOptions {
        timeout: Duration::from_millis(timeout_ms),
        auto_handshake,
    }
}

/// Answer every request the replayer sends with an empty result, and swallow
/// notifications. Returns the methods seen, in order.
async fn echo_server(mut remote: MockRemote, expected_writes: usize) -> Vec<String> {
    let mut seen = Vec::new();
    for _ in 0..expected_writes {
        let msg = remote.recv().await;
        if let Some(method) = msg.get("method").and_then(|m| m.as_str()) {
            seen.push(method.to_string());
        } else {
            seen.push("(response)".to_string());
        }
        if let Some(id) = msg.get("id") {
            remote.send(json!({"jsonrpc": "2.0", "id": id.clone(), "result": {}}));
        }
    }
    seen
}

#[tokio::test]
async fn replays_only_client_to_server_messages() {
    let (adapter, remote) = mock_pair();
    let messages = vec![
        captured(
            0,
            Direction::ClientToServer,
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
        ),
        captured(
            1,
            Direction::ServerToClient,
            json!({"jsonrpc": "2.0", "id": 1, "result": {}}),
        ),
        captured(
            2,
            Direction::ClientToServer,
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
        ),
    ];

    let server = tokio::spawn(echo_server(remote, 2));
    let results = replay_messages(&messages, &adapter, &options(500, true)).await;

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.error.is_none()));
    let seen = server.await.unwrap();
    assert_eq!(seen, vec!["initialize", "tools/list"]);
}

#[tokio::test]
async fn synthesizes_a_handshake_when_capture_starts_mid_session() {
    let (adapter, remote) = mock_pair();
    let messages = vec![captured(
        0,
        Direction::ClientToServer,
        json!({"jsonrpc": "2.0", "id": 5, "method": "tools/list"}),
    )];

    // initialize + notifications/initialized + the replayed request
    let server = tokio::spawn(echo_server(remote, 3));
    let results = replay_messages(&messages, &adapter, &options(500, true)).await;

    assert_eq!(results.len(), 1);
    assert!(results[0].error.is_none());
    let seen = server.await.unwrap();
    assert_eq!(
        seen,
        vec!["initialize", "notifications/initialized", "tools/list"]
    );
}

#[tokio::test]
async fn handshake_can_be_disabled() {
    let (adapter, remote) = mock_pair();
    let messages = vec![captured(
        0,
        Direction::ClientToServer,
        json!({"jsonrpc": "2.0", "id": 5, "method": "tools/list"}),
    )];

    let server = tokio::spawn(echo_server(remote, 1));
    let results = replay_messages(&messages, &adapter, &options(500, false)).await;

    assert!(results[0].error.is_none());
    assert_eq!(server.await.unwrap(), vec!["tools/list"]);
}

#[tokio::test]
async fn notifications_are_fire_and_forget() {
    let (adapter, mut remote) = mock_pair();
    let messages = vec![captured(
        0,
        Direction::ClientToServer,
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
    )];

    let results = replay_messages(&messages, &adapter, &options(500, false)).await;

    assert_eq!(results.len(), 1);
    assert!(results[0].response.is_none());
    assert!(results[0].error.is_none());
    assert_eq!(
        remote.recv().await,
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"})
    );
}

#[tokio::test]
async fn unrelated_server_traffic_is_skipped_while_pairing() {
    let (adapter, mut remote) = mock_pair();
    let messages = vec![captured(
        0,
        Direction::ClientToServer,
        json!({"jsonrpc": "2.0", "id": 7, "method": "tools/call"}),
    )];

    let server = tokio::spawn(async move {
        let _request = remote.recv().await;
        // Noise first, then the real response.
        remote.send(json!({"jsonrpc": "2.0", "method": "notifications/progress"}));
        remote.send(json!({"jsonrpc": "2.0", "id": 99, "result": {"stale": true}}));
        remote.send(json!({"jsonrpc": "2.0", "id": 7, "result": {"ok": true}}));
    });

    let results = replay_messages(&messages, &adapter, &options(500, false)).await;
    server.await.unwrap();

    assert!(results[0].error.is_none());
    assert_eq!(
        results[0].response,
        Some(json!({"jsonrpc": "2.0", "id": 7, "result": {"ok": true}}))
    );
}

#[tokio::test]
async fn timeout_is_recorded_and_the_batch_continues() {
    let (adapter, mut remote) = mock_pair();
    let messages = vec![
        captured(
            0,
            Direction::ClientToServer,
            json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call"}),
        ),
        captured(
            1,
            Direction::ClientToServer,
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        ),
    ];

    // Never respond to anything.
    let results = replay_messages(&messages, &adapter, &options(50, false)).await;

    assert_eq!(results.len(), 2);
    assert!(results[0].error.as_deref().unwrap_or("").contains("timeout"));
    assert!(results[1].error.is_none(), "notification must still be sent");

    // Both envelopes were written regardless.
    assert!(remote.try_recv().is_some());
    assert!(remote.try_recv().is_some());
}

#[tokio::test]
async fn empty_capture_with_handshake_still_initializes() {
    let (adapter, remote) = mock_pair();

    let server = tokio::spawn(echo_server(remote, 2));
    let results = replay_messages(&[], &adapter, &options(500, true)).await;

    assert!(results.is_empty());
    assert_eq!(
        server.await.unwrap(),
        vec!["initialize", "notifications/initialized"]
    );
}
