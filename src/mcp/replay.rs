// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Replay of captured requests.
//!
//! Two modes. The [`Replayer`] injects a captured request into a *live*
//! pipeline out-of-band: it substitutes a fresh jsonrpc id, writes through
//! the server-facing adapter, and waits for the response to flow back
//! through the normal server-to-client loop. [`replay_messages`] replays a
//! *saved* session against a fresh server connection, pairing responses by
//! id directly on the adapter.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::core::constants::{methods, replay};
use crate::core::correlation::{extract_id, is_notification, is_request, with_id};
use crate::core::errors::ProxyError;
use crate::core::models::{Direction, JsonRpcId, ProxyMessage};
use crate::mcp::adapter::TransportAdapter;
use crate::mcp::pipeline::PipelineContext;

/// A completed live injection: both envelopes are also in the session store.
#[derive(Debug, Clone)]
pub struct ReplayedExchange {
    pub request: ProxyMessage,
    pub response: ProxyMessage,
    pub duration: Duration,
}

/// Out-of-band injector for a running pipeline.
pub struct Replayer {
    ctx: PipelineContext,
    server: Arc<dyn TransportAdapter>,
    next_id: AtomicI64,
}

impl Replayer {
    pub fn new(ctx: PipelineContext, server: Arc<dyn TransportAdapter>) -> Self {
        Self {
            ctx,
            server,
            next_id: AtomicI64::new(1000),
        }
    }

    /// Re-send a captured request, optionally with operator edits, and wait
    /// for the paired response up to `deadline`.
    ///
    /// The request is rewritten with a fresh jsonrpc id (method and params
    /// untouched) so its response cannot collide with in-flight traffic. On
    /// deadline the substituted id stays registered: a late response still
    /// correlates and both envelopes remain in the session as evidence.
    pub async fn replay(
        &self,
        original: &ProxyMessage,
        edited: Option<Value>,
        deadline: Duration,
    ) -> Result<ReplayedExchange, ProxyError> {
        let base = edited.as_ref().unwrap_or(&original.raw);
        if !is_request(base) {
            return Err(ProxyError::InvalidAction(
                "only request envelopes can be replayed".to_string(),
            ));
        }

        let fresh_id = self.fresh_id();
        let envelope = with_id(base, &fresh_id);

        let mut request = self
            .ctx
            .wrap(envelope.clone(), Direction::ClientToServer);
        if edited.is_some() {
            request.original_raw = Some(original.raw.clone());
            request.modified = true;
        }

        let waiter = self.ctx.register_replay(fresh_id.clone(), request.id);
        self.ctx.store().append(request.clone());

        debug!(proxy_id = %request.id, jsonrpc_id = %fresh_id, "replaying request");
        let started = Instant::now();
        self.server.write(&envelope).await?;

        match tokio::time::timeout(deadline, waiter).await {
            Ok(Ok(response)) => {
                info!(
                    proxy_id = %request.id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "replay paired with response"
                );
                Ok(ReplayedExchange {
                    request,
                    response,
                    duration: started.elapsed(),
                })
            }
            Ok(Err(_closed)) => Err(ProxyError::ReplayCancelled),
            Err(_elapsed) => Err(ProxyError::ReplayTimeout(deadline)),
        }
    }

    /// An integer id not currently present in the correlation map.
    fn fresh_id(&self) -> JsonRpcId {
        loop {
            let candidate = JsonRpcId::Number(self.next_id.fetch_add(1, Ordering::Relaxed));
            if !self.ctx.id_in_use(&candidate) {
                return candidate;
            }
        }
    }
}

/// How a saved-session replay run should behave.
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    /// Deadline for each individual response.
    pub timeout: Duration,
    /// Send a synthetic `initialize` handshake when the capture does not
    /// start with one.
    pub auto_handshake: bool,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            timeout: replay::DEFAULT_TIMEOUT,
            auto_handshake: true,
        }
    }
}

/// Result of replaying a single saved message.
#[derive(Debug, Clone)]
pub struct ReplayResult {
    pub original: ProxyMessage,
    pub sent: Value,
    /// The server's response. Absent for notifications and on timeout/error.
    pub response: Option<Value>,
    pub error: Option<String>,
    pub duration_ms: f64,
}

/// Replay the client-to-server half of a capture against a connected server
/// adapter. Messages are sent in capture order; requests wait for their
/// response by jsonrpc id, notifications are fire-and-forget. Failures are
/// recorded per entry without aborting the batch.
pub async fn replay_messages(
    messages: &[ProxyMessage],
    server: &dyn TransportAdapter,
    options: &ReplayOptions,
) -> Vec<ReplayResult> {
    let outgoing: Vec<&ProxyMessage> = messages
        .iter()
        .filter(|m| m.direction == Direction::ClientToServer)
        .collect();

    let needs_handshake = options.auto_handshake
        && outgoing
            .first()
            .map(|m| m.method.as_deref() != Some(methods::INITIALIZE))
            .unwrap_or(true);
    if needs_handshake {
        send_handshake(server, options.timeout).await;
    }

    let mut results = Vec::with_capacity(outgoing.len());
    for message in outgoing {
        results.push(replay_single(message, server, options.timeout).await);
    }
    results
}

/// Synthetic `initialize` + `notifications/initialized`, best-effort.
async fn send_handshake(server: &dyn TransportAdapter, timeout: Duration) {
    let init = json!({
        "jsonrpc": "2.0",
        "id": replay::HANDSHAKE_ID,
        "method": methods::INITIALIZE,
        "params": {
            "protocolVersion": replay::HANDSHAKE_PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {"name": "lilith-mitm-replay", "version": env!("CARGO_PKG_VERSION")},
        },
    });
    if let Err(e) = server.write(&init).await {
        debug!("handshake write failed: {}", e);
        return;
    }

    let expected = JsonRpcId::String(replay::HANDSHAKE_ID.to_string());
    let _ = tokio::time::timeout(timeout, read_matching_response(server, &expected)).await;

    let initialized = json!({
        "jsonrpc": "2.0",
        "method": methods::NOTIFICATIONS_INITIALIZED,
    });
    if let Err(e) = server.write(&initialized).await {
        debug!("initialized notification write failed: {}", e);
    }
}

async fn replay_single(
    message: &ProxyMessage,
    server: &dyn TransportAdapter,
    timeout: Duration,
) -> ReplayResult {
    let sent = message.raw.clone();
    let started = Instant::now();

    if let Err(e) = server.write(&sent).await {
        return ReplayResult {
            original: message.clone(),
            sent,
            response: None,
            error: Some(format!("write failed: {}", e)),
            duration_ms: elapsed_ms(started),
        };
    }

    if is_notification(&message.raw) {
        return ReplayResult {
            original: message.clone(),
            sent,
            response: None,
            error: None,
            duration_ms: elapsed_ms(started),
        };
    }

    let Some(expected) = message.jsonrpc_id.clone() else {
        return ReplayResult {
            original: message.clone(),
            sent,
            response: None,
            error: Some("request has no jsonrpc id".to_string()),
            duration_ms: elapsed_ms(started),
        };
    };

    match tokio::time::timeout(timeout, read_matching_response(server, &expected)).await {
        Ok(Ok(response)) => ReplayResult {
            original: message.clone(),
            sent,
            response: Some(response),
            error: None,
            duration_ms: elapsed_ms(started),
        },
        Ok(Err(e)) => ReplayResult {
            original: message.clone(),
            sent,
            response: None,
            error: Some(format!("read failed: {}", e)),
            duration_ms: elapsed_ms(started),
        },
        Err(_elapsed) => ReplayResult {
            original: message.clone(),
            sent,
            response: None,
            error: Some(format!("timeout after {:?}", timeout)),
            duration_ms: elapsed_ms(started),
        },
    }
}

/// Read from the adapter until a message with the expected id arrives.
/// Unrelated traffic (server notifications, stale responses) is skipped.
async fn read_matching_response(
    server: &dyn TransportAdapter,
    expected: &JsonRpcId,
) -> Result<Value, ProxyError> {
    loop {
        match server.read().await? {
            Some(value) => {
                if extract_id(&value).as_ref() == Some(expected) {
                    return Ok(value);
                }
            }
            None => {
                return Err(ProxyError::transport(
                    "server closed before responding".to_string(),
                ))
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
