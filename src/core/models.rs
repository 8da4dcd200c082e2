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

//! Domain models for the lilith-mitm interceptor.
//!
//! This module contains the envelope types that wrap every proxied JSON-RPC
//! message, the session container used for capture/export, and the intercept
//! engine's mode and action enums. It is designed to be free of I/O side
//! effects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Direction of a proxied message relative to the MCP client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    ClientToServer,
    ServerToClient,
}

impl Direction {
    /// The direction a correlated response is expected to arrive from.
    pub fn opposite(self) -> Self {
        match self {
            Direction::ClientToServer => Direction::ServerToClient,
            Direction::ServerToClient => Direction::ClientToServer,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::ClientToServer => write!(f, "client_to_server"),
            Direction::ServerToClient => write!(f, "server_to_client"),
        }
    }
}

/// MCP transport type in use for a proxy session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Stdio,
    Sse,
    StreamableHttp,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Stdio => write!(f, "stdio"),
            TransportKind::Sse => write!(f, "sse"),
            TransportKind::StreamableHttp => write!(f, "streamable_http"),
        }
    }
}

/// Operating mode for the intercept engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterceptMode {
    /// Messages flow through without being held for inspection.
    Passthrough,
    /// Messages are held for operator inspection before forwarding.
    Intercept,
}

/// Operator action on a held message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterceptAction {
    /// Forward the message to its destination unchanged.
    Forward,
    /// Forward the message with operator modifications applied.
    Modify,
    /// Discard the message without forwarding.
    Drop,
}

/// A JSON-RPC id. Both the string and integer renderings round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcId {
    String(String),
    Number(i64),
}

impl std::fmt::Display for JsonRpcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JsonRpcId::String(s) => write!(f, "{}", s),
            JsonRpcId::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<i64> for JsonRpcId {
    fn from(n: i64) -> Self {
        JsonRpcId::Number(n)
    }
}

impl From<&str> for JsonRpcId {
    fn from(s: &str) -> Self {
        JsonRpcId::String(s.to_string())
    }
}

/// Classification of a decoded JSON-RPC envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Has an id and a method.
    Request,
    /// Has an id and a result.
    Response,
    /// Has an id and an error object.
    Error,
    /// Has a method and no id.
    Notification,
}

/// A single proxied MCP JSON-RPC message with proxy metadata.
///
/// Created by the pipeline at read time. After capture only two updates are
/// permitted: `correlated_id` is set at most once when a matching response
/// arrives, and `modified`/`original_raw`/`raw` change together when the
/// operator releases the message with a modification.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyMessage {
    /// Unique proxy-assigned id.
    pub id: Uuid,
    /// Monotonic sequence number within the session, shared across both
    /// directions, starting at 0.
    pub sequence: u64,
    /// When the proxy received this message (UTC).
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub transport: TransportKind,
    /// The decoded JSON-RPC envelope.
    pub raw: Value,
    /// JSON-RPC id field (absent for notifications).
    pub jsonrpc_id: Option<JsonRpcId>,
    /// JSON-RPC method (absent for responses and errors).
    pub method: Option<String>,
    /// Proxy id of the request this response correlates to.
    pub correlated_id: Option<Uuid>,
    /// True if the operator modified this message before forwarding.
    pub modified: bool,
    /// Pre-modification snapshot (populated when `modified` is true).
    pub original_raw: Option<Value>,
}

/// The decision delivered over a held message's release signal.
///
/// Carrying the replacement envelope inside the variant combines the action
/// field and the signal into one message, so the signal cannot fire before
/// the action is known.
#[derive(Debug, Clone, PartialEq)]
pub enum ReleaseDecision {
    Forward,
    Modify(Value),
    Drop,
}

impl ReleaseDecision {
    pub fn action(&self) -> InterceptAction {
        match self {
            ReleaseDecision::Forward => InterceptAction::Forward,
            ReleaseDecision::Modify(_) => InterceptAction::Modify,
            ReleaseDecision::Drop => InterceptAction::Drop,
        }
    }
}

/// Durable representation of one proxy run.
///
/// Exactly one of `server_command` (stdio) and `server_url` (network
/// transports) is populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub transport: TransportKind,
    pub server_command: Option<String>,
    pub server_url: Option<String>,
    pub messages: Vec<MessageRecord>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
}

/// One captured envelope in the durable session format.
///
/// `jsonrpc_id`, `method`, and `correlated_id` serialize as explicit nulls
/// when absent; `original_payload` appears only on modified entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub proxy_id: Uuid,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub transport: TransportKind,
    pub jsonrpc_id: Option<JsonRpcId>,
    pub method: Option<String>,
    pub correlated_id: Option<Uuid>,
    pub modified: bool,
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_payload: Option<Value>,
}

impl From<&ProxyMessage> for MessageRecord {
    fn from(msg: &ProxyMessage) -> Self {
        MessageRecord {
            proxy_id: msg.id,
            sequence: msg.sequence,
            timestamp: msg.timestamp,
            direction: msg.direction,
            transport: msg.transport,
            jsonrpc_id: msg.jsonrpc_id.clone(),
            method: msg.method.clone(),
            correlated_id: msg.correlated_id,
            modified: msg.modified,
            payload: msg.raw.clone(),
            original_payload: msg.original_raw.clone(),
        }
    }
}

impl From<MessageRecord> for ProxyMessage {
    fn from(record: MessageRecord) -> Self {
        ProxyMessage {
            id: record.proxy_id,
            sequence: record.sequence,
            timestamp: record.timestamp,
            direction: record.direction,
            transport: record.transport,
            raw: record.payload,
            jsonrpc_id: record.jsonrpc_id,
            method: record.method,
            correlated_id: record.correlated_id,
            modified: record.modified,
            original_raw: record.original_payload,
        }
    }
}
