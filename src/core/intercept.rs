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

//! Hold/release state for the message pipeline.
//!
//! In `Intercept` mode every message is parked until the operator decides
//! to forward, modify, or drop it. Each held message carries a single-shot
//! release signal: a oneshot channel whose payload is the decision itself,
//! so the signal cannot fire before the action is known.

use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

use crate::core::errors::ProxyError;
use crate::core::models::{InterceptAction, InterceptMode, ProxyMessage, ReleaseDecision};

struct HeldEntry {
    message: ProxyMessage,
    release_tx: oneshot::Sender<ReleaseDecision>,
}

/// A message parked by the intercept engine, as seen by the waiting loop.
///
/// Dropping a `Held` without awaiting it counts as a forward: the waiting
/// side treats a closed channel the same as `ReleaseDecision::Forward`.
pub struct Held {
    message: ProxyMessage,
    release_rx: oneshot::Receiver<ReleaseDecision>,
}

impl Held {
    /// The envelope snapshot taken at hold time.
    pub fn message(&self) -> &ProxyMessage {
        &self.message
    }

    /// Proxy id of the held message; the handle the operator releases by.
    pub fn proxy_id(&self) -> Uuid {
        self.message.id
    }

    /// Wait for the operator's decision. A closed channel (engine dropped
    /// during shutdown) resolves to `Forward` so no loop parks forever.
    pub async fn wait(self) -> ReleaseDecision {
        self.release_rx
            .await
            .unwrap_or(ReleaseDecision::Forward)
    }
}

struct EngineInner {
    mode: InterceptMode,
    held: Vec<HeldEntry>,
}

/// Controls whether messages are held for inspection or passed through.
pub struct InterceptEngine {
    inner: Mutex<EngineInner>,
}

impl InterceptEngine {
    pub fn new(mode: InterceptMode) -> Self {
        Self {
            inner: Mutex::new(EngineInner {
                mode,
                held: Vec::new(),
            }),
        }
    }

    pub fn mode(&self) -> InterceptMode {
        self.lock().mode
    }

    /// Change the intercept mode.
    ///
    /// Switching to `Passthrough` releases every currently held message with
    /// `Forward`, in insertion order. Messages already in flight continue to
    /// flow; the new mode applies from the next read.
    pub fn set_mode(&self, mode: InterceptMode) {
        let drained = {
            let mut inner = self.lock();
            inner.mode = mode;
            if mode == InterceptMode::Passthrough {
                std::mem::take(&mut inner.held)
            } else {
                Vec::new()
            }
        };
        for entry in drained {
            debug!(proxy_id = %entry.message.id, "released by passthrough switch");
            let _ = entry.release_tx.send(ReleaseDecision::Forward);
        }
    }

    /// True iff the current mode holds messages for inspection.
    pub fn should_hold(&self, _message: &ProxyMessage) -> bool {
        self.lock().mode == InterceptMode::Intercept
    }

    /// Park a message and hand its release signal to the caller.
    pub fn hold(&self, message: ProxyMessage) -> Held {
        let (release_tx, release_rx) = oneshot::channel();
        let held = Held {
            message: message.clone(),
            release_rx,
        };
        self.lock().held.push(HeldEntry {
            message,
            release_tx,
        });
        held
    }

    /// Release a held message with the operator's action.
    ///
    /// `Modify` requires a replacement envelope; without one the message
    /// stays held and `InvalidAction` is reported. Releasing an unknown or
    /// already-released proxy id is reported the same way. The first release
    /// always wins because the signal is single-shot.
    pub fn release(
        &self,
        proxy_id: &Uuid,
        action: InterceptAction,
        modified_raw: Option<Value>,
    ) -> Result<(), ProxyError> {
        let decision = match action {
            InterceptAction::Forward => ReleaseDecision::Forward,
            InterceptAction::Drop => ReleaseDecision::Drop,
            InterceptAction::Modify => match modified_raw {
                Some(raw) => ReleaseDecision::Modify(raw),
                None => {
                    return Err(ProxyError::InvalidAction(
                        "modify requires a replacement envelope".to_string(),
                    ))
                }
            },
        };

        let entry = {
            let mut inner = self.lock();
            let position = inner
                .held
                .iter()
                .position(|entry| entry.message.id == *proxy_id);
            match position {
                Some(position) => inner.held.remove(position),
                None => {
                    return Err(ProxyError::InvalidAction(format!(
                        "message {} is not held (already released?)",
                        proxy_id
                    )))
                }
            }
        };

        debug!(proxy_id = %proxy_id, ?action, "held message released");
        let _ = entry.release_tx.send(decision);
        Ok(())
    }

    /// Snapshot of currently waiting messages in insertion order.
    pub fn held(&self) -> Vec<ProxyMessage> {
        self.lock()
            .held
            .iter()
            .map(|entry| entry.message.clone())
            .collect()
    }

    pub fn held_count(&self) -> usize {
        self.lock().held.len()
    }

    /// Release everything with `Forward`, in insertion order. Used by
    /// pipeline shutdown so no loop stays parked on a release signal.
    pub fn release_all_forward(&self) {
        let drained = std::mem::take(&mut self.lock().held);
        for entry in drained {
            let _ = entry.release_tx.send(ReleaseDecision::Forward);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EngineInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for InterceptEngine {
    fn default() -> Self {
        Self::new(InterceptMode::Passthrough)
    }
}
