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

//! Wire framing for MCP stdio traffic.
//!
//! MCP stdio transports exchange newline-delimited JSON: one envelope per
//! line. The decoder enforces a per-message size limit, skips blank lines,
//! and validates that every decoded value is a JSON-RPC 2.0 envelope, so the
//! pipeline only ever sees well-formed messages.

use bytes::{Buf, BufMut, BytesMut};
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::core::constants::limits;
use crate::core::correlation::classify;
use crate::core::errors::ProxyError;

pub struct JsonRpcCodec {
    max_message_bytes: u64,
    /// Offset into the buffer where the newline scan left off, so repeated
    /// decode calls on a growing buffer stay linear.
    scanned: usize,
}

impl JsonRpcCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(limits::MAX_MESSAGE_SIZE_BYTES)
    }

    #[must_use]
    pub fn with_limit(max_message_bytes: u64) -> Self {
        Self {
            max_message_bytes,
            scanned: 0,
        }
    }
}

impl Default for JsonRpcCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for JsonRpcCodec {
    type Item = Value;
    type Error = ProxyError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Value>, ProxyError> {
        loop {
            let newline = src[self.scanned..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|offset| self.scanned + offset);

            let Some(newline) = newline else {
                if src.len() as u64 > self.max_message_bytes {
                    return Err(ProxyError::decode(format!(
                        "message exceeds size limit of {} bytes",
                        self.max_message_bytes
                    )));
                }
                self.scanned = src.len();
                return Ok(None);
            };
            self.scanned = 0;

            if newline as u64 > self.max_message_bytes {
                return Err(ProxyError::decode(format!(
                    "message exceeds size limit of {} bytes",
                    self.max_message_bytes
                )));
            }

            let mut line = src.split_to(newline + 1);
            line.truncate(newline);
            if line.ends_with(b"\r") {
                line.truncate(line.len() - 1);
            }

            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let value: Value = serde_json::from_slice(&line)
                .map_err(|e| ProxyError::decode(format!("invalid JSON: {}", e)))?;

            if classify(&value).is_none() {
                return Err(ProxyError::decode(
                    "not a JSON-RPC 2.0 envelope".to_string(),
                ));
            }

            trace!(bytes = line.len(), "decoded envelope");
            return Ok(Some(value));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Value>, ProxyError> {
        if let Some(value) = self.decode(src)? {
            return Ok(Some(value));
        }
        if src.iter().all(u8::is_ascii_whitespace) {
            src.advance(src.len());
            return Ok(None);
        }
        Err(ProxyError::decode(
            "stream ended mid-message".to_string(),
        ))
    }
}

impl<'a> Encoder<&'a Value> for JsonRpcCodec {
    type Error = ProxyError;

    fn encode(&mut self, item: &'a Value, dst: &mut BytesMut) -> Result<(), ProxyError> {
        let body = serde_json::to_vec(item)?;
        dst.reserve(body.len() + 1);
        dst.extend_from_slice(&body);
        dst.put_u8(b'\n');
        Ok(())
    }
}
