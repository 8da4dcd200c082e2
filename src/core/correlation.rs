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

//! JSON-RPC field extraction and message classification.
//!
//! Insulates the rest of the codebase from the raw envelope structure. The
//! pipeline, session store, and replay engine use these helpers instead of
//! reaching into `serde_json::Value` internals. All functions here are total
//! and never panic.

use serde_json::Value;

use crate::core::models::{JsonRpcId, MessageKind};

/// Classify a decoded envelope.
///
/// Returns `None` when the value is not a valid JSON-RPC 2.0 envelope:
/// not an object, wrong `jsonrpc` version, a malformed `id` or `error`
/// member, or none of the four shapes. A valid envelope classifies as
/// exactly one kind.
pub fn classify(raw: &Value) -> Option<MessageKind> {
    let obj = raw.as_object()?;
    if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        return None;
    }

    // A present id must be a string, an integer, or null (the wire allows
    // null on error responses; null never yields an extractable id). A
    // present id of any other shape makes the whole envelope invalid rather
    // than silently reclassifying it as a different message kind.
    let has_id = match obj.get("id") {
        None => false,
        Some(v) if v.is_null() || parse_id(v).is_some() => true,
        Some(_) => return None,
    };
    let has_method = obj.get("method").and_then(Value::as_str).is_some();

    if has_method {
        return Some(if has_id {
            MessageKind::Request
        } else {
            MessageKind::Notification
        });
    }

    if has_id {
        let has_result = obj.contains_key("result");
        // An error member must carry integer `code` and string `message`;
        // anything else invalidates the envelope, same as a malformed id.
        let has_error = match obj.get("error") {
            None => false,
            Some(e) => {
                let well_formed = e
                    .as_object()
                    .map(|e| {
                        e.get("code").and_then(Value::as_i64).is_some()
                            && e.get("message").and_then(Value::as_str).is_some()
                    })
                    .unwrap_or(false);
                if !well_formed {
                    return None;
                }
                true
            }
        };
        match (has_result, has_error) {
            (true, false) => return Some(MessageKind::Response),
            (false, true) => return Some(MessageKind::Error),
            _ => return None,
        }
    }

    None
}

/// Extract the JSON-RPC id from an envelope.
///
/// Returns the id for requests, responses, and errors; `None` for
/// notifications and for values that are not valid envelopes.
pub fn extract_id(raw: &Value) -> Option<JsonRpcId> {
    match classify(raw)? {
        MessageKind::Request | MessageKind::Response | MessageKind::Error => {
            parse_id(raw.as_object()?.get("id")?)
        }
        MessageKind::Notification => None,
    }
}

/// Extract the JSON-RPC method from an envelope.
///
/// Returns the method string for requests and notifications; `None` for
/// responses, errors, and values that are not valid envelopes.
pub fn extract_method(raw: &Value) -> Option<&str> {
    match classify(raw)? {
        MessageKind::Request | MessageKind::Notification => {
            raw.as_object()?.get("method")?.as_str()
        }
        MessageKind::Response | MessageKind::Error => None,
    }
}

/// True if the envelope is a request (has id and method).
pub fn is_request(raw: &Value) -> bool {
    classify(raw) == Some(MessageKind::Request)
}

/// True if the envelope is a response or error (has id, no method).
pub fn is_response(raw: &Value) -> bool {
    matches!(
        classify(raw),
        Some(MessageKind::Response) | Some(MessageKind::Error)
    )
}

/// True if the envelope is a notification (has method, no id).
pub fn is_notification(raw: &Value) -> bool {
    classify(raw) == Some(MessageKind::Notification)
}

/// Parse a JSON value into a `JsonRpcId`.
///
/// Only string and integer ids are accepted; fractional numbers, null, and
/// structured values yield `None`.
fn parse_id(value: &Value) -> Option<JsonRpcId> {
    match value {
        Value::String(s) => Some(JsonRpcId::String(s.clone())),
        Value::Number(n) => n.as_i64().map(JsonRpcId::Number),
        _ => None,
    }
}

/// Substitute the id field of a request envelope, leaving method and params
/// untouched. Non-object values are returned unchanged.
pub fn with_id(raw: &Value, id: &JsonRpcId) -> Value {
    let mut out = raw.clone();
    if let Some(obj) = out.as_object_mut() {
        let rendered = match id {
            JsonRpcId::String(s) => Value::String(s.clone()),
            JsonRpcId::Number(n) => Value::Number((*n).into()),
        };
        obj.insert("id".to_string(), rendered);
    }
    out
}
