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

//! The bidirectional message pipeline.
//!
//! Two concurrent forward loops relay traffic between the client-facing and
//! server-facing adapters. Each message is wrapped in a [`ProxyMessage`]
//! envelope, correlated against outstanding requests, captured to the
//! session store, checked against the intercept engine, and forwarded.
//!
//! When either loop terminates the sibling is cancelled, every held message
//! is released with `Forward`, and both adapters are closed. Only transport
//! failures propagate out of [`run_pipeline`].

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::correlation::{classify, extract_id, extract_method};
use crate::core::errors::ProxyError;
use crate::core::intercept::{Held, InterceptEngine};
use crate::core::models::{
    Direction, JsonRpcId, MessageKind, ProxyMessage, ReleaseDecision, TransportKind,
};
use crate::core::session::SessionStore;
use crate::mcp::adapter::TransportAdapter;

/// Callback surface through which the pipeline announces traffic to a UI.
///
/// Callbacks run synchronously on the forward loop and must not block for
/// extended periods. A panicking observer is caught, logged, and swallowed;
/// it never terminates the pipeline.
pub trait PipelineObserver: Send + Sync {
    fn on_received(&self, _message: &ProxyMessage) {}
    fn on_held(&self, _held: &Held) {}
    fn on_forwarded(&self, _message: &ProxyMessage) {}
}

/// The default observer: nobody is watching.
pub struct NullObserver;

impl PipelineObserver for NullObserver {}

/// One outstanding request in the correlation map: the proxy id of the
/// captured request, plus an optional waiter completed when the matching
/// response is captured (used by the replay engine).
pub(crate) struct PendingRequest {
    pub(crate) proxy_id: Uuid,
    pub(crate) waiter: Option<oneshot::Sender<ProxyMessage>>,
}

pub(crate) type CorrelationMap = Arc<Mutex<HashMap<JsonRpcId, PendingRequest>>>;

/// Shared dependencies for one pipeline run. Cheap to clone.
pub struct PipelineContext {
    store: Arc<SessionStore>,
    intercept: Arc<InterceptEngine>,
    transport: TransportKind,
    observer: Arc<dyn PipelineObserver>,
    sequence: Arc<AtomicU64>,
    correlation: CorrelationMap,
}

impl Clone for PipelineContext {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            intercept: self.intercept.clone(),
            transport: self.transport,
            observer: self.observer.clone(),
            sequence: self.sequence.clone(),
            correlation: self.correlation.clone(),
        }
    }
}

impl PipelineContext {
    pub fn new(
        store: Arc<SessionStore>,
        intercept: Arc<InterceptEngine>,
        transport: TransportKind,
    ) -> Self {
        Self {
            store,
            intercept,
            transport,
            observer: Arc::new(NullObserver),
            sequence: Arc::new(AtomicU64::new(0)),
            correlation: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn intercept(&self) -> &Arc<InterceptEngine> {
        &self.intercept
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    /// Build the envelope for a freshly read message.
    pub(crate) fn wrap(&self, raw: Value, direction: Direction) -> ProxyMessage {
        let jsonrpc_id = extract_id(&raw);
        let method = extract_method(&raw).map(str::to_string);
        ProxyMessage {
            id: Uuid::new_v4(),
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            timestamp: crate::utils::time::now(),
            direction,
            transport: self.transport,
            raw,
            jsonrpc_id,
            method,
            correlated_id: None,
            modified: false,
            original_raw: None,
        }
    }

    /// Correlation step. Requests register themselves; responses and errors
    /// pop the matching entry and take its `correlated_id`.
    ///
    /// Correlation is per-session, not per-direction: if both sides issue
    /// requests with the same jsonrpc id, the most recent registration wins
    /// and the earlier request stays uncorrelated. The protocol forbids the
    /// collision and the proxy does not invent a repair.
    ///
    /// Returns the replay waiter attached to a popped entry, if any, so the
    /// caller can complete it after the response has been captured.
    pub(crate) fn correlate(
        &self,
        message: &mut ProxyMessage,
    ) -> Option<oneshot::Sender<ProxyMessage>> {
        let id = message.jsonrpc_id.clone()?;
        let mut map = self.lock_correlation();
        match classify(&message.raw)? {
            MessageKind::Request => {
                map.insert(
                    id,
                    PendingRequest {
                        proxy_id: message.id,
                        waiter: None,
                    },
                );
                None
            }
            MessageKind::Response | MessageKind::Error => {
                let entry = map.remove(&id)?;
                message.correlated_id = Some(entry.proxy_id);
                entry.waiter
            }
            MessageKind::Notification => None,
        }
    }

    /// Register a replayed request in the correlation map and hand back the
    /// receiver its response completes.
    pub(crate) fn register_replay(
        &self,
        id: JsonRpcId,
        proxy_id: Uuid,
    ) -> oneshot::Receiver<ProxyMessage> {
        let (tx, rx) = oneshot::channel();
        self.lock_correlation().insert(
            id,
            PendingRequest {
                proxy_id,
                waiter: Some(tx),
            },
        );
        rx
    }

    pub(crate) fn id_in_use(&self, id: &JsonRpcId) -> bool {
        self.lock_correlation().contains_key(id)
    }

    /// Drop every replay waiter so pending replays wake with a cancellation
    /// error. The map entries themselves stay: late responses still
    /// correlate for the session record.
    fn cancel_pending_replays(&self) {
        for entry in self.lock_correlation().values_mut() {
            entry.waiter = None;
        }
    }

    fn lock_correlation(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<JsonRpcId, PendingRequest>> {
        self.correlation
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn notify(&self, label: &str, callback: impl FnOnce()) {
        if catch_unwind(AssertUnwindSafe(callback)).is_err() {
            warn!("observer callback '{}' panicked; ignoring", label);
        }
    }
}

/// Run the bidirectional pipeline until either side disconnects.
///
/// Returns `Ok(())` on a clean end-of-stream from either adapter and a
/// `ProxyError::Transport` when an adapter fails. In both cases the sibling
/// loop is cancelled, held messages are flushed forward, pending replays are
/// woken, and both adapters are closed before returning.
pub async fn run_pipeline(
    client: Arc<dyn TransportAdapter>,
    server: Arc<dyn TransportAdapter>,
    ctx: PipelineContext,
) -> Result<(), ProxyError> {
    let mut client_to_server = tokio::spawn(forward_loop(
        client.clone(),
        server.clone(),
        Direction::ClientToServer,
        ctx.clone(),
    ));
    let mut server_to_client = tokio::spawn(forward_loop(
        server.clone(),
        client.clone(),
        Direction::ServerToClient,
        ctx.clone(),
    ));

    let first = tokio::select! {
        res = &mut client_to_server => {
            server_to_client.abort();
            res
        }
        res = &mut server_to_client => {
            client_to_server.abort();
            res
        }
    };

    // Unblock anything parked on a release signal or a replay deadline,
    // then drop the transports. Shutdown errors are absorbed.
    ctx.intercept.release_all_forward();
    ctx.cancel_pending_replays();
    client.close().await;
    server.close().await;
    ctx.store.finish();

    match first {
        Ok(result) => result,
        Err(join_err) if join_err.is_cancelled() => Ok(()),
        Err(join_err) => Err(ProxyError::transport(format!(
            "forward loop panicked: {}",
            join_err
        ))),
    }
}

/// Forward messages from `source` to `destination`.
async fn forward_loop(
    source: Arc<dyn TransportAdapter>,
    destination: Arc<dyn TransportAdapter>,
    direction: Direction,
    ctx: PipelineContext,
) -> Result<(), ProxyError> {
    loop {
        // 1. Read. A failure here ends the run; Ok(None) is a clean close.
        let Some(raw) = source.read().await? else {
            debug!(%direction, "source closed");
            return Ok(());
        };

        // 2-3. Wrap and correlate.
        let mut message = ctx.wrap(raw, direction);
        let replay_waiter = ctx.correlate(&mut message);

        // 4. Capture before anything can delay or drop the message.
        ctx.store.append(message.clone());

        if let Some(waiter) = replay_waiter {
            let _ = waiter.send(message.clone());
        }

        // 5. Announce receipt.
        ctx.notify("on_received", || ctx.observer.on_received(&message));

        // 6. Intercept check.
        let mut outgoing = message.raw.clone();
        if ctx.intercept.should_hold(&message) {
            let held = ctx.intercept.hold(message.clone());
            ctx.notify("on_held", || ctx.observer.on_held(&held));
            match held.wait().await {
                ReleaseDecision::Drop => {
                    debug!(proxy_id = %message.id, "message dropped by operator");
                    continue;
                }
                ReleaseDecision::Modify(new_raw) => {
                    ctx.store.apply_modification(&message.id, new_raw.clone());
                    message.original_raw =
                        Some(std::mem::replace(&mut message.raw, new_raw.clone()));
                    message.modified = true;
                    outgoing = new_raw;
                }
                ReleaseDecision::Forward => {}
            }
        }

        // 7. Forward.
        destination.write(&outgoing).await?;

        // 8. Announce delivery.
        ctx.notify("on_forwarded", || ctx.observer.on_forwarded(&message));
    }
}
