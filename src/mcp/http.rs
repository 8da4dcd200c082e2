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

//! Server-facing HTTP adapter.
//!
//! Covers both remote MCP transports: streamable HTTP (POST per message,
//! responses inline as JSON or streamed as SSE, long-lived GET stream for
//! server-initiated traffic) and the legacy HTTP+SSE pairing (POST endpoint
//! announced by the first `endpoint` event on the SSE stream).
//!
//! Redirects are disabled: a replay target that silently forwards captured
//! traffic elsewhere would undermine the session as evidence.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::io::StreamReader;
use tracing::{debug, warn};

use crate::core::correlation::classify;
use crate::core::errors::ProxyError;
use crate::mcp::adapter::TransportAdapter;

const ACCEPT_BOTH: &str = "application/json, text/event-stream";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Which wire contract the remote server speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMode {
    /// Single endpoint; POST returns the response, GET carries the rest.
    StreamableHttp,
    /// GET stream announces a separate POST endpoint via an `endpoint` event.
    Sse,
}

/// Server-facing adapter over HTTP. Used by the replay engine against live
/// remote servers and available to the pipeline as its server side.
pub struct HttpServerAdapter {
    http: reqwest::Client,
    post_url: watch::Receiver<Option<String>>,
    session_id: std::sync::Mutex<Option<String>>,
    incoming: Mutex<mpsc::Receiver<Value>>,
    incoming_tx: mpsc::Sender<Value>,
    stream_task: std::sync::Mutex<Option<JoinHandle<()>>>,
    max_message_bytes: u64,
    closed: AtomicBool,
}

impl HttpServerAdapter {
    /// Connect to `url` and start the server->client stream. Every inbound
    /// message (POST body or SSE event) is capped at `max_message_bytes`.
    pub async fn connect(
        url: &str,
        mode: HttpMode,
        max_message_bytes: u64,
    ) -> Result<Self, ProxyError> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ProxyError::transport(format!("http client build failed: {}", e)))?;

        let (incoming_tx, incoming_rx) = mpsc::channel::<Value>(64);
        let (post_url_tx, post_url_rx) = watch::channel(match mode {
            HttpMode::StreamableHttp => Some(url.to_string()),
            HttpMode::Sse => None,
        });

        let adapter = Self {
            http: http.clone(),
            post_url: post_url_rx,
            session_id: std::sync::Mutex::new(None),
            incoming: Mutex::new(incoming_rx),
            incoming_tx: incoming_tx.clone(),
            stream_task: std::sync::Mutex::new(None),
            max_message_bytes,
            closed: AtomicBool::new(false),
        };

        let stream_url = url.to_string();
        let task = tokio::spawn(run_event_stream(
            http,
            stream_url,
            mode,
            max_message_bytes,
            incoming_tx,
            post_url_tx,
        ));
        *adapter.stream_task.lock().unwrap_or_else(|p| p.into_inner()) = Some(task);

        Ok(adapter)
    }

    fn session_header(&self) -> Option<String> {
        self.session_id
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    async fn resolve_post_url(&self) -> Result<String, ProxyError> {
        let mut rx = self.post_url.clone();
        let resolved = rx
            .wait_for(|url| url.is_some())
            .await
            .map_err(|_| ProxyError::transport("event stream closed before endpoint"))?;
        Ok(resolved.clone().expect("watch guarded by wait_for"))
    }
}

#[async_trait]
impl TransportAdapter for HttpServerAdapter {
    async fn read(&self) -> Result<Option<Value>, ProxyError> {
        if self.closed.load(Ordering::Relaxed) {
            return Ok(None);
        }
        Ok(self.incoming.lock().await.recv().await)
    }

    async fn write(&self, message: &Value) -> Result<(), ProxyError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(ProxyError::transport("http adapter is closed"));
        }
        let post_url = self.resolve_post_url().await?;

        let mut request = self
            .http
            .post(&post_url)
            .header(reqwest::header::ACCEPT, ACCEPT_BOTH)
            .json(message);
        if let Some(session) = self.session_header() {
            request = request.header("mcp-session-id", session);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProxyError::transport(format!("http post failed: {}", e)))?;

        if let Some(value) = response.headers().get("mcp-session-id") {
            if let Ok(value) = value.to_str() {
                *self.session_id.lock().unwrap_or_else(|p| p.into_inner()) =
                    Some(value.to_string());
            }
        }

        let status = response.status();
        if !status.is_success() {
            return Err(ProxyError::transport(format!(
                "http post returned status {}",
                status
            )));
        }
        if status == reqwest::StatusCode::ACCEPTED {
            return Ok(());
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        if content_type.starts_with("text/event-stream") {
            // Response(s) arrive as a bounded SSE body.
            let stream = response.bytes_stream().map_err(io::Error::other);
            let mut reader = BufReader::new(StreamReader::new(stream));
            pump_sse_events(&mut reader, self.max_message_bytes, |event, data| {
                dispatch_message(event, data, &self.incoming_tx)
            })
            .await?;
            return Ok(());
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ProxyError::transport(format!("http response read failed: {}", e)))?;
        if body.is_empty() {
            return Ok(());
        }
        if body.len() as u64 > self.max_message_bytes {
            return Err(ProxyError::decode("http response too large".to_string()));
        }
        let value: Value = serde_json::from_slice(&body)
            .map_err(|e| ProxyError::decode(format!("http response is not JSON: {}", e)))?;
        push_envelope(value, &self.incoming_tx);
        Ok(())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::Relaxed) {
            return;
        }
        if let Some(task) = self
            .stream_task
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
        {
            task.abort();
        }
        self.incoming.lock().await.close();
    }
}

/// Long-lived GET stream carrying server->client traffic (and, for legacy
/// SSE, the `endpoint` announcement).
async fn run_event_stream(
    http: reqwest::Client,
    url: String,
    mode: HttpMode,
    max_message_bytes: u64,
    incoming: mpsc::Sender<Value>,
    post_url: watch::Sender<Option<String>>,
) {
    let response = match http
        .get(&url)
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .send()
        .await
    {
        Ok(response) if response.status().is_success() => response,
        Ok(response) if response.status() == reqwest::StatusCode::METHOD_NOT_ALLOWED
            && mode == HttpMode::StreamableHttp =>
        {
            // Server does not offer a GET stream; POST responses are the
            // only server->client channel.
            debug!("server offers no GET event stream");
            return;
        }
        Ok(response) => {
            warn!(status = %response.status(), "event stream connect failed");
            return;
        }
        Err(e) => {
            warn!("event stream connect failed: {}", e);
            return;
        }
    };

    let base_url = url.clone();
    let stream = response.bytes_stream().map_err(io::Error::other);
    let mut reader = BufReader::new(StreamReader::new(stream));

    let result = pump_sse_events(&mut reader, max_message_bytes, |event, data| {
        if mode == HttpMode::Sse && event == Some("endpoint") {
            match resolve_endpoint(&base_url, data) {
                Some(endpoint) => {
                    debug!(%endpoint, "sse endpoint announced");
                    let _ = post_url.send(Some(endpoint));
                }
                None => warn!("unresolvable sse endpoint: {}", data),
            }
            return;
        }
        dispatch_message(event, data, &incoming);
    })
    .await;

    match result {
        Ok(()) => debug!("event stream closed"),
        Err(e) => warn!("event stream failed: {}", e),
    }
}

/// Minimal SSE framing: `event:` names the event, `data:` lines accumulate,
/// a blank line dispatches.
async fn pump_sse_events<R, F>(
    reader: &mut BufReader<R>,
    max_message_bytes: u64,
    mut dispatch: F,
) -> Result<(), ProxyError>
where
    R: tokio::io::AsyncRead + Unpin,
    F: FnMut(Option<&str>, &str),
{
    let mut event: Option<String> = None;
    let mut data = String::new();
    let mut line = String::new();

    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Ok(());
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);

        if trimmed.is_empty() {
            if !data.is_empty() {
                dispatch(event.as_deref(), &data);
            }
            event = None;
            data.clear();
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix("event:") {
            event = Some(rest.trim_start().to_string());
        } else if let Some(rest) = trimmed.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.trim_start());
            if data.len() as u64 > max_message_bytes {
                return Err(ProxyError::decode("sse event too large".to_string()));
            }
        }
        // Comment lines (":") and unknown fields are ignored.
    }
}

fn dispatch_message(event: Option<&str>, data: &str, incoming: &mpsc::Sender<Value>) {
    if matches!(event, Some(e) if e != "message") {
        debug!(event = event.unwrap_or(""), "ignoring non-message sse event");
        return;
    }
    match serde_json::from_str::<Value>(data) {
        Ok(value) => push_envelope(value, incoming),
        Err(e) => warn!("discarding invalid sse payload: {}", e),
    }
}

/// Validate and enqueue an inbound envelope. Invalid envelopes are the
/// adapter's to recover from: they are logged and skipped.
fn push_envelope(value: Value, incoming: &mpsc::Sender<Value>) {
    if classify(&value).is_none() {
        warn!("discarding non-JSON-RPC message from server");
        return;
    }
    if incoming.try_send(value).is_err() {
        warn!("inbound queue full or closed; message discarded");
    }
}

fn resolve_endpoint(base: &str, endpoint: &str) -> Option<String> {
    let base = reqwest::Url::parse(base).ok()?;
    base.join(endpoint).ok().map(String::from)
}
