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

//! Transport adapter contract.
//!
//! Each transport requires a matched pair: one client-facing (the proxy acts
//! as the server) and one server-facing (the proxy acts as the client). The
//! pipeline interacts only with this interface; it never sees raw bytes or
//! transport-specific framing.

use async_trait::async_trait;
use serde_json::Value;

use crate::core::errors::ProxyError;

/// Interface presented by both sides of a transport pair.
///
/// Methods take `&self`: one adapter is shared between a forward loop and
/// the replay engine, so implementations use interior mutability for their
/// stream state.
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    /// Read the next decoded envelope from this side of the connection.
    ///
    /// Returns `Ok(None)` on clean end-of-stream. Fails on disconnect or an
    /// unrecoverable decode error.
    async fn read(&self) -> Result<Option<Value>, ProxyError>;

    /// Send an envelope over this side of the connection.
    async fn write(&self, message: &Value) -> Result<(), ProxyError>;

    /// Release underlying resources. Idempotent; errors during shutdown are
    /// absorbed by the implementation.
    async fn close(&self);
}
