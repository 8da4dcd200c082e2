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

// Main entry point for the lilith-mitm proxy.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use lilith_mitm::config::Config;
use lilith_mitm::core::intercept::{Held, InterceptEngine};
use lilith_mitm::core::models::{InterceptMode, ProxyMessage, TransportKind};
use lilith_mitm::core::session::SessionStore;
use lilith_mitm::mcp::adapter::TransportAdapter;
use lilith_mitm::mcp::http::{HttpMode, HttpServerAdapter};
use lilith_mitm::mcp::pipeline::{run_pipeline, PipelineContext, PipelineObserver};
use lilith_mitm::mcp::replay::{replay_messages, ReplayOptions};
use lilith_mitm::mcp::stdio::{StdioClientAdapter, StdioServerAdapter};

#[derive(Parser, Debug)]
#[command(name = "lilith-mitm", version, about = "Interactive MCP traffic interceptor for security research", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TransportArg {
    Stdio,
    Sse,
    StreamableHttp,
}

impl From<TransportArg> for TransportKind {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Stdio => TransportKind::Stdio,
            TransportArg::Sse => TransportKind::Sse,
            TransportArg::StreamableHttp => TransportKind::StreamableHttp,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the proxy between an MCP client (stdio) and a target server.
    Proxy {
        /// MCP transport type.
        #[arg(long, value_enum)]
        transport: TransportArg,

        /// Server command (stdio only), e.g. "python server.py".
        #[arg(long)]
        target_command: Option<String>,

        /// Server URL (SSE/HTTP only).
        #[arg(long)]
        target_url: Option<String>,

        /// Start in intercept mode (hold every message).
        #[arg(long, default_value_t = false)]
        intercept: bool,

        /// Auto-save the session to this file on shutdown.
        #[arg(long)]
        session_file: Option<PathBuf>,
    },

    /// Replay a saved session against a live server.
    Replay {
        #[arg(long)]
        session_file: PathBuf,

        /// Server command for replay (stdio).
        #[arg(long)]
        target_command: Option<String>,

        /// Server URL for replay (SSE/HTTP).
        #[arg(long)]
        target_url: Option<String>,

        /// Seconds to wait for each response.
        #[arg(long)]
        timeout: Option<u64>,

        /// Skip the synthetic initialize handshake.
        #[arg(long, default_value_t = false)]
        no_handshake: bool,
    },

    /// Re-export a saved session (validates and rewrites the file).
    Export {
        #[arg(long)]
        session_file: PathBuf,

        /// Output file path.
        #[arg(long)]
        output: PathBuf,
    },

    /// Print session contents to stdout (non-interactive).
    Inspect {
        #[arg(long)]
        session_file: PathBuf,

        /// Show full JSON payloads.
        #[arg(short, long, default_value_t = false)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env();
    init_tracing(&config);

    match cli.command {
        Commands::Proxy {
            transport,
            target_command,
            target_url,
            intercept,
            session_file,
        } => {
            run_proxy(
                transport,
                target_command,
                target_url,
                intercept,
                session_file.or(config.session_file.clone()),
                config.max_message_bytes,
            )
            .await
        }
        Commands::Replay {
            session_file,
            target_command,
            target_url,
            timeout,
            no_handshake,
        } => {
            let timeout = timeout
                .map(Duration::from_secs)
                .unwrap_or(config.replay_timeout);
            run_replay(
                session_file,
                target_command,
                target_url,
                timeout,
                !no_handshake,
                config.max_message_bytes,
            )
            .await
        }
        Commands::Export {
            session_file,
            output,
        } => run_export(session_file, output),
        Commands::Inspect {
            session_file,
            verbose,
        } => run_inspect(session_file, verbose),
    }
}

async fn run_proxy(
    transport: TransportArg,
    target_command: Option<String>,
    target_url: Option<String>,
    intercept: bool,
    session_file: Option<PathBuf>,
    max_message_bytes: u64,
) -> anyhow::Result<()> {
    if transport != TransportArg::Stdio {
        bail!(
            "network transports are replay-only in this build; \
             run the proxy with --transport stdio"
        );
    }
    let _ = target_url;
    let Some(command_line) = target_command else {
        bail!("--target-command is required for stdio transport");
    };
    let (program, args) = split_command(&command_line)?;

    let client: Arc<dyn TransportAdapter> = Arc::new(StdioClientAdapter::new(max_message_bytes));
    let server: Arc<dyn TransportAdapter> =
        Arc::new(StdioServerAdapter::spawn(&program, &args, max_message_bytes)?);

    let store = Arc::new(SessionStore::new(
        TransportKind::Stdio,
        Some(command_line.clone()),
        None,
    ));
    let mode = if intercept {
        InterceptMode::Intercept
    } else {
        InterceptMode::Passthrough
    };
    let engine = Arc::new(InterceptEngine::new(mode));
    let ctx = PipelineContext::new(store.clone(), engine, TransportKind::Stdio)
        .with_observer(Arc::new(TraceObserver));

    info!(session = %store.session_id(), target = %command_line, "proxy starting");

    let outcome = tokio::select! {
        result = run_pipeline(client, server, ctx) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted; shutting down");
            store.finish();
            Ok(())
        }
    };

    if let Some(path) = session_file {
        store.save(&path).context("failed to save session")?;
        info!(path = %path.display(), messages = store.len(), "session saved");
    }

    match outcome {
        Ok(()) => {
            info!(messages = store.len(), "session ended");
            Ok(())
        }
        Err(e) => Err(anyhow::Error::new(e).context("pipeline terminated")),
    }
}

async fn run_replay(
    session_file: PathBuf,
    target_command: Option<String>,
    target_url: Option<String>,
    timeout: Duration,
    auto_handshake: bool,
    max_message_bytes: u64,
) -> anyhow::Result<()> {
    let store = SessionStore::load(&session_file).context("failed to load session")?;
    let messages = store.messages();

    let server: Arc<dyn TransportAdapter> = match (&target_command, &target_url) {
        (Some(command_line), None) => {
            let (program, args) = split_command(command_line)?;
            Arc::new(StdioServerAdapter::spawn(&program, &args, max_message_bytes)?)
        }
        (None, Some(url)) => {
            let mode = match store.transport() {
                TransportKind::Sse => HttpMode::Sse,
                _ => HttpMode::StreamableHttp,
            };
            Arc::new(HttpServerAdapter::connect(url, mode, max_message_bytes).await?)
        }
        _ => bail!("exactly one of --target-command and --target-url is required"),
    };

    let options = ReplayOptions {
        timeout,
        auto_handshake,
    };
    let results = replay_messages(&messages, server.as_ref(), &options).await;
    server.close().await;

    let mut failed = 0usize;
    for result in &results {
        let method = result.original.method.as_deref().unwrap_or("(no method)");
        match &result.error {
            Some(error) => {
                failed += 1;
                println!(
                    "  #{:03} {} FAILED: {} ({:.1} ms)",
                    result.original.sequence, method, error, result.duration_ms
                );
            }
            None => println!(
                "  #{:03} {} ok ({:.1} ms)",
                result.original.sequence, method, result.duration_ms
            ),
        }
    }
    println!("Replayed {} messages, {} failed", results.len(), failed);
    if failed > 0 {
        bail!("{} replayed messages failed", failed);
    }
    Ok(())
}

fn run_export(session_file: PathBuf, output: PathBuf) -> anyhow::Result<()> {
    let store = SessionStore::load(&session_file).context("failed to load session")?;
    store.save(&output).context("failed to write export")?;
    println!("Exported {} messages to {}", store.len(), output.display());
    Ok(())
}

fn run_inspect(session_file: PathBuf, verbose: bool) -> anyhow::Result<()> {
    let store = SessionStore::load(&session_file).context("failed to load session")?;
    let record = store.to_record();

    println!("Session: {}", record.id);
    println!("Transport: {}", record.transport);
    if let Some(command) = &record.server_command {
        println!("Server command: {}", command);
    }
    if let Some(url) = &record.server_url {
        println!("Server URL: {}", url);
    }
    println!("Started: {}", record.started_at.to_rfc3339());
    println!("Messages: {}", record.messages.len());
    if !record.metadata.is_empty() {
        println!(
            "Metadata: {}",
            serde_json::to_string(&record.metadata).unwrap_or_default()
        );
    }
    println!("---");

    for msg in &record.messages {
        let arrow = match msg.direction {
            lilith_mitm::core::models::Direction::ClientToServer => "->",
            lilith_mitm::core::models::Direction::ServerToClient => "<-",
        };
        let method = msg.method.as_deref().unwrap_or("(response)");
        let id = msg
            .jsonrpc_id
            .as_ref()
            .map(|id| format!(" id={}", id))
            .unwrap_or_default();
        let correlated = msg
            .correlated_id
            .map(|c| format!(" corr={:.8}", c.to_string()))
            .unwrap_or_default();
        let modified = if msg.modified { " [MODIFIED]" } else { "" };

        println!(
            "  #{:03} {} {}{}{}{}",
            msg.sequence, arrow, method, id, correlated, modified
        );

        if verbose {
            println!(
                "       {}",
                serde_json::to_string_pretty(&msg.payload).unwrap_or_default()
            );
            if let Some(original) = &msg.original_payload {
                println!(
                    "       [original] {}",
                    serde_json::to_string_pretty(original).unwrap_or_default()
                );
            }
        }
    }
    Ok(())
}

/// Observer that narrates traffic into the log stream.
struct TraceObserver;

impl PipelineObserver for TraceObserver {
    fn on_received(&self, message: &ProxyMessage) {
        info!(
            seq = message.sequence,
            direction = %message.direction,
            method = message.method.as_deref().unwrap_or("(response)"),
            "received"
        );
    }

    fn on_held(&self, held: &Held) {
        info!(
            proxy_id = %held.proxy_id(),
            method = held.message().method.as_deref().unwrap_or("(response)"),
            "held for inspection"
        );
    }

    fn on_forwarded(&self, message: &ProxyMessage) {
        info!(
            seq = message.sequence,
            direction = %message.direction,
            modified = message.modified,
            "forwarded"
        );
    }
}

/// Split a shell-ish command line into program + args. Quoting is not
/// interpreted; use the underlying shell for anything fancier.
fn split_command(command_line: &str) -> anyhow::Result<(String, Vec<String>)> {
    let mut parts = command_line.split_whitespace();
    let Some(program) = parts.next() else {
        bail!("empty target command");
    };
    Ok((program.to_string(), parts.map(String::from).collect()))
}

fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("lilith_mitm=debug,info"));

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);

    if config.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
