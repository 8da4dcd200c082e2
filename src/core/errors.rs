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

//! Error taxonomy for the proxy core.
//!
//! Only `Transport` terminates the pipeline; every other variant is a local
//! condition reported to its originator. There are no retries; the operator
//! decides whether to reconnect.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProxyError {
    /// An adapter failed to read, write, or close. Terminates the affected
    /// direction and, by propagation, the whole pipeline.
    #[error("transport error: {0}")]
    Transport(String),

    /// A byte stream could not be parsed as a JSON-RPC envelope. Raised at
    /// the adapter boundary; the pipeline never sees raw bytes.
    #[error("decode error: {0}")]
    Decode(String),

    /// A persisted session file failed validation on load. No partial store
    /// is returned.
    #[error("corrupt session file: {0}")]
    CorruptSession(String),

    /// The operator supplied `modify` without a replacement envelope, or
    /// released an already-released message.
    #[error("invalid action: {0}")]
    InvalidAction(String),

    /// The replay deadline elapsed before the matching response arrived.
    /// The sent request and any late response remain in the session.
    #[error("replay timed out after {0:?}")]
    ReplayTimeout(Duration),

    /// A pending replay was cancelled by pipeline shutdown.
    #[error("replay cancelled")]
    ReplayCancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProxyError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }
}
