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

//! lilith-mitm constants - single source of truth for configuration values.

/// Transport limits (DoS protection)
pub mod limits {
    /// Maximum allowed JSON-RPC message size (10 MB)
    pub const MAX_MESSAGE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
}

/// Configuration environment variables
pub mod config {
    pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
    pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";
    pub const ENV_SESSION_FILE: &str = "LILITH_MITM_SESSION_FILE";
    pub const ENV_REPLAY_TIMEOUT_SECS: &str = "LILITH_MITM_REPLAY_TIMEOUT_SECS";
    pub const ENV_MAX_MESSAGE_BYTES: &str = "LILITH_MITM_MAX_MESSAGE_BYTES";
}

/// MCP protocol methods the proxy itself emits (replay handshake)
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const NOTIFICATIONS_INITIALIZED: &str = "notifications/initialized";
}

/// Replay defaults
pub mod replay {
    use std::time::Duration;

    /// Default deadline for a replayed request's response.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
    /// Synthetic handshake request id. A string is used so it cannot
    /// collide with the integer ids the replayer generates.
    pub const HANDSHAKE_ID: &str = "__handshake__";
    /// Protocol version advertised by the synthetic handshake.
    pub const HANDSHAKE_PROTOCOL_VERSION: &str = "2024-11-05";
}
