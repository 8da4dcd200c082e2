#![allow(dead_code)] // each test binary uses a different slice of this harness

//! Shared test harness: an in-memory transport adapter pair.
//!
//! `mock_pair()` returns the adapter handed to the pipeline plus a remote
//! handle the test drives: push envelopes the adapter will read, pop
//! envelopes the adapter wrote, and drop the input to simulate a clean
//! disconnect.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

use lilith_mitm::core::errors::ProxyError;
use lilith_mitm::mcp::adapter::TransportAdapter;

pub struct MockAdapter {
    reads: Mutex<mpsc::UnboundedReceiver<Value>>,
    writes: mpsc::UnboundedSender<Value>,
    closed: AtomicBool,
}

pub struct MockRemote {
    input: Option<mpsc::UnboundedSender<Value>>,
    output: mpsc::UnboundedReceiver<Value>,
}

pub fn mock_pair() -> (MockAdapter, MockRemote) {
    let (input_tx, input_rx) = mpsc::unbounded_channel();
    let (output_tx, output_rx) = mpsc::unbounded_channel();
    (
        MockAdapter {
            reads: Mutex::new(input_rx),
            writes: output_tx,
            closed: AtomicBool::new(false),
        },
        MockRemote {
            input: Some(input_tx),
            output: output_rx,
        },
    )
}

#[async_trait]
impl TransportAdapter for MockAdapter {
    async fn read(&self) -> Result<Option<Value>, ProxyError> {
        if self.closed.load(Ordering::Relaxed) {
            return Ok(None);
        }
        Ok(self.reads.lock().await.recv().await)
    }

    async fn write(&self, message: &Value) -> Result<(), ProxyError> {
        self.writes
            .send(message.clone())
            .map_err(|_| ProxyError::transport("mock peer went away"))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

impl MockRemote {
    /// Queue an envelope for the adapter's next read.
    pub fn send(&self, message: Value) {
        self.input
            .as_ref()
            .expect("input already closed")
            .send(message)
            .expect("adapter dropped");
    }

    /// Wait for the next envelope the pipeline forwarded to this side.
    pub async fn recv(&mut self) -> Value {
        tokio::time::timeout(Duration::from_secs(2), self.output.recv())
            .await
            .expect("timed out waiting for forwarded message")
            .expect("output channel closed")
    }

    /// Try to pop a forwarded envelope without waiting.
    pub fn try_recv(&mut self) -> Option<Value> {
        self.output.try_recv().ok()
    }

    /// Simulate a clean disconnect: the adapter's next read returns EOF.
    pub fn finish(&mut self) {
        self.input = None;
    }
}

/// Poll until `predicate` holds, with a hard cap so a broken test fails
/// instead of hanging.
pub async fn wait_until(predicate: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !predicate() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition not reached in time");
}
