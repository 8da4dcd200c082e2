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

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::constants::{config as env_keys, limits, replay};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub log_level: String,
    pub log_format: String, // "json" or "text"
    /// Auto-save target for the captured session.
    pub session_file: Option<PathBuf>,
    /// Deadline for replayed requests.
    pub replay_timeout: Duration,
    /// Per-message size cap enforced at the framing layer.
    pub max_message_bytes: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            log_level: env::var(env_keys::ENV_LOG_LEVEL).unwrap_or_else(|_| "info".to_string()),
            log_format: env::var(env_keys::ENV_LOG_FORMAT).unwrap_or_else(|_| "text".to_string()),
            session_file: env::var(env_keys::ENV_SESSION_FILE).ok().map(PathBuf::from),
            replay_timeout: env::var(env_keys::ENV_REPLAY_TIMEOUT_SECS)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(replay::DEFAULT_TIMEOUT),
            max_message_bytes: env::var(env_keys::ENV_MAX_MESSAGE_BYTES)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(limits::MAX_MESSAGE_SIZE_BYTES),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            session_file: None,
            replay_timeout: replay::DEFAULT_TIMEOUT,
            max_message_bytes: limits::MAX_MESSAGE_SIZE_BYTES,
        }
    }
}
