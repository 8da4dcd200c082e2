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

//! stdio transport adapters.
//!
//! `StdioServerAdapter` spawns the target MCP server as a subprocess and
//! speaks newline-delimited JSON-RPC over its pipes. `StdioClientAdapter`
//! is the other half of the pair: the proxy IS the subprocess from the real
//! client's perspective, reading its own stdin and writing its own stdout.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader, Stdin, Stdout};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::debug;

use crate::core::constants::limits;
use crate::core::errors::ProxyError;
use crate::mcp::adapter::TransportAdapter;
use crate::mcp::codec::JsonRpcCodec;
use crate::mcp::process::UpstreamProcess;

type BoxedReader = FramedRead<Box<dyn AsyncRead + Unpin + Send>, JsonRpcCodec>;
type BoxedWriter = FramedWrite<Box<dyn AsyncWrite + Unpin + Send>, JsonRpcCodec>;

/// Server-facing adapter: the proxy connects to a real MCP server it spawns.
pub struct StdioServerAdapter {
    reader: Mutex<BoxedReader>,
    writer: Mutex<BoxedWriter>,
    process: Mutex<UpstreamProcess>,
    closed: AtomicBool,
}

impl StdioServerAdapter {
    /// Spawn `cmd args...` and frame its stdio, capping each message at
    /// `max_message_bytes`.
    ///
    /// The child's stderr is drained into the proxy log so server
    /// diagnostics stay visible without corrupting the protocol stream.
    pub fn spawn(cmd: &str, args: &[String], max_message_bytes: u64) -> Result<Self, ProxyError> {
        let (process, stdin, stdout, stderr) = UpstreamProcess::spawn(cmd, args)?;

        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let line = line.trim().to_string();
                if !line.is_empty() {
                    debug!(target: "upstream", "{}", line);
                }
            }
        });

        Ok(Self {
            reader: Mutex::new(FramedRead::new(
                stdout,
                JsonRpcCodec::with_limit(max_message_bytes),
            )),
            writer: Mutex::new(FramedWrite::new(
                stdin,
                JsonRpcCodec::with_limit(max_message_bytes),
            )),
            process: Mutex::new(process),
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl TransportAdapter for StdioServerAdapter {
    async fn read(&self) -> Result<Option<Value>, ProxyError> {
        if self.closed.load(Ordering::Relaxed) {
            return Ok(None);
        }
        let mut reader = self.reader.lock().await;
        match reader.next().await {
            Some(Ok(value)) => Ok(Some(value)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    async fn write(&self, message: &Value) -> Result<(), ProxyError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(ProxyError::transport("server adapter is closed"));
        }
        let mut writer = self.writer.lock().await;
        writer.send(message).await
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::Relaxed) {
            return;
        }
        let mut writer = self.writer.lock().await;
        let _ = SinkExt::<&Value>::flush(&mut *writer).await;
        self.process.lock().await.kill();
    }
}

/// Client-facing adapter: a real MCP client talks to the proxy over the
/// proxy's own stdin/stdout.
pub struct StdioClientAdapter {
    reader: Mutex<FramedRead<Stdin, JsonRpcCodec>>,
    writer: Mutex<FramedWrite<Stdout, JsonRpcCodec>>,
    closed: AtomicBool,
}

impl StdioClientAdapter {
    pub fn new(max_message_bytes: u64) -> Self {
        Self {
            reader: Mutex::new(FramedRead::new(
                tokio::io::stdin(),
                JsonRpcCodec::with_limit(max_message_bytes),
            )),
            writer: Mutex::new(FramedWrite::new(
                tokio::io::stdout(),
                JsonRpcCodec::with_limit(max_message_bytes),
            )),
            closed: AtomicBool::new(false),
        }
    }
}

impl Default for StdioClientAdapter {
    fn default() -> Self {
        Self::new(limits::MAX_MESSAGE_SIZE_BYTES)
    }
}

#[async_trait]
impl TransportAdapter for StdioClientAdapter {
    async fn read(&self) -> Result<Option<Value>, ProxyError> {
        if self.closed.load(Ordering::Relaxed) {
            return Ok(None);
        }
        let mut reader = self.reader.lock().await;
        match reader.next().await {
            Some(Ok(value)) => Ok(Some(value)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    async fn write(&self, message: &Value) -> Result<(), ProxyError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(ProxyError::transport("client adapter is closed"));
        }
        let mut writer = self.writer.lock().await;
        writer.send(message).await
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::Relaxed) {
            return;
        }
        let mut writer = self.writer.lock().await;
        let _ = SinkExt::<&Value>::flush(&mut *writer).await;
    }
}
