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

//! In-memory session capture with durable JSON import/export.
//!
//! The store owns every captured envelope for the lifetime of a proxy run.
//! One session file is the unit of evidence: `save` writes the full record
//! atomically, `load` refuses anything that fails envelope validation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::core::correlation::classify;
use crate::core::errors::ProxyError;
use crate::core::models::{MessageRecord, ProxyMessage, SessionRecord, TransportKind};

#[derive(Debug)]
struct StoreInner {
    messages: Vec<ProxyMessage>,
    index: HashMap<Uuid, usize>,
    ended_at: Option<DateTime<Utc>>,
    metadata: serde_json::Map<String, Value>,
}

/// Ordered, indexed capture of all proxied messages in a session.
#[derive(Debug)]
pub struct SessionStore {
    session_id: Uuid,
    transport: TransportKind,
    server_command: Option<String>,
    server_url: Option<String>,
    started_at: DateTime<Utc>,
    inner: Mutex<StoreInner>,
}

impl SessionStore {
    pub fn new(
        transport: TransportKind,
        server_command: Option<String>,
        server_url: Option<String>,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            transport,
            server_command,
            server_url,
            started_at: crate::utils::time::now(),
            inner: Mutex::new(StoreInner {
                messages: Vec::new(),
                index: HashMap::new(),
                ended_at: None,
                metadata: serde_json::Map::new(),
            }),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    pub fn server_command(&self) -> Option<&str> {
        self.server_command.as_deref()
    }

    pub fn server_url(&self) -> Option<&str> {
        self.server_url.as_deref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Add a message to the capture. Appending the same proxy id twice is a
    /// programming error, not a user error.
    pub fn append(&self, message: ProxyMessage) {
        let mut inner = self.lock();
        debug_assert!(
            !inner.index.contains_key(&message.id),
            "duplicate proxy id appended to session store"
        );
        let position = inner.messages.len();
        inner.index.insert(message.id, position);
        inner.messages.push(message);
    }

    /// All captured messages in acquisition order. The returned list is a
    /// snapshot; callers may mutate their copy freely.
    pub fn messages(&self) -> Vec<ProxyMessage> {
        self.lock().messages.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().messages.is_empty()
    }

    /// Look up a message by its proxy-assigned id.
    pub fn by_id(&self, proxy_id: &Uuid) -> Option<ProxyMessage> {
        let inner = self.lock();
        inner
            .index
            .get(proxy_id)
            .map(|&position| inner.messages[position].clone())
    }

    /// Rewrite a captured entry after the operator released it with a
    /// modification: the original envelope moves to `original_raw` and the
    /// replacement becomes `raw`.
    pub fn apply_modification(&self, proxy_id: &Uuid, modified_raw: Value) {
        let mut inner = self.lock();
        let Some(&position) = inner.index.get(proxy_id) else {
            return;
        };
        let entry = &mut inner.messages[position];
        entry.original_raw = Some(std::mem::replace(&mut entry.raw, modified_raw));
        entry.modified = true;
    }

    /// Attach free-form operator metadata to the session.
    pub fn set_metadata(&self, key: impl Into<String>, value: Value) {
        self.lock().metadata.insert(key.into(), value);
    }

    /// Stamp the session end time. Later stamps win.
    pub fn finish(&self) {
        self.lock().ended_at = Some(crate::utils::time::now());
    }

    /// Render the full durable record.
    pub fn to_record(&self) -> SessionRecord {
        let inner = self.lock();
        SessionRecord {
            id: self.session_id,
            started_at: self.started_at,
            ended_at: inner.ended_at,
            transport: self.transport,
            server_command: self.server_command.clone(),
            server_url: self.server_url.clone(),
            messages: inner.messages.iter().map(MessageRecord::from).collect(),
            metadata: inner.metadata.clone(),
        }
    }

    /// Atomically write the session record to `path`, creating parent
    /// directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), ProxyError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let record = self.to_record();
        let json = serde_json::to_string_pretty(&record)?;

        // Write-then-rename so a crash mid-write never leaves a truncated
        // session file behind.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json.as_bytes())?;
        std::fs::rename(&tmp, path)?;
        debug!(path = %path.display(), messages = record.messages.len(), "session saved");
        Ok(())
    }

    /// Load a session from a file written by `save`.
    ///
    /// Every payload must still be a valid JSON-RPC envelope; a single bad
    /// entry fails the whole load. Partial loads are not offered.
    pub fn load(path: &Path) -> Result<Self, ProxyError> {
        let json = std::fs::read_to_string(path)?;
        let record: SessionRecord = serde_json::from_str(&json)
            .map_err(|e| ProxyError::CorruptSession(format!("{}: {}", path.display(), e)))?;

        for entry in &record.messages {
            if classify(&entry.payload).is_none() {
                return Err(ProxyError::CorruptSession(format!(
                    "message {} has an invalid JSON-RPC payload",
                    entry.proxy_id
                )));
            }
            if entry.modified != entry.original_payload.is_some() {
                return Err(ProxyError::CorruptSession(format!(
                    "message {} has inconsistent modification metadata",
                    entry.proxy_id
                )));
            }
            if let Some(original) = &entry.original_payload {
                if classify(original).is_none() {
                    return Err(ProxyError::CorruptSession(format!(
                        "message {} has an invalid original payload",
                        entry.proxy_id
                    )));
                }
            }
        }

        let messages: Vec<ProxyMessage> =
            record.messages.into_iter().map(ProxyMessage::from).collect();
        let index = messages
            .iter()
            .enumerate()
            .map(|(position, msg)| (msg.id, position))
            .collect();

        Ok(Self {
            session_id: record.id,
            transport: record.transport,
            server_command: record.server_command,
            server_url: record.server_url,
            started_at: record.started_at,
            inner: Mutex::new(StoreInner {
                messages,
                index,
                ended_at: record.ended_at,
                metadata: record.metadata,
            }),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
