//! toolrelay CLI - runs one turn from JSON files.
//!
//! ```text
//! toolrelay --turn turn.json --catalog catalog.json --user alice [--config path]
//! ```
//!
//! Status events and direct-tool calls are written to stderr as JSON lines,
//! one `{"type": ...}` object per line. A direct-tool call waits for one line
//! of JSON on stdin as its result. The final turn, sources and errors are
//! printed to stdout.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use toolrelay_config::RelayConfig;
use toolrelay_engine::{ToolRelay, TurnContext};
use toolrelay_tools::{CallRequest, ChannelCaller, ChannelSink};
use toolrelay_types::{ChatTurn, StatusEvent, ToolCatalog};

#[derive(Debug, PartialEq, Eq, Parser)]
#[command(name = "toolrelay")]
#[command(about = "Run one tool-relay turn from JSON files")]
struct Args {
    /// Chat turn to process (JSON)
    #[arg(long)]
    turn: PathBuf,
    /// Tool catalog for the turn (JSON)
    #[arg(long)]
    catalog: PathBuf,
    /// User the remote tools run as
    #[arg(long)]
    user: String,
    /// Config file [default: ~/.toolrelay/config.toml]
    #[arg(long)]
    config: Option<PathBuf>,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    // stdout carries the turn output
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

async fn print_status_events(mut rx: mpsc::Receiver<StatusEvent>) {
    while let Some(event) = rx.recv().await {
        eprintln!("{}", event.to_wire());
    }
}

/// Answers direct-tool calls with one JSON line each from stdin.
async fn answer_direct_calls(mut rx: mpsc::Receiver<CallRequest>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(request) = rx.recv().await {
        eprintln!("{}", request.event.to_wire());
        let reply = match lines.next_line().await {
            Ok(Some(line)) => Ok(serde_json::from_str::<serde_json::Value>(&line)
                .unwrap_or_else(|_| serde_json::Value::String(line))),
            Ok(None) => Err("stdin closed".to_string()),
            Err(e) => Err(e.to_string()),
        };
        if request.reply.send(reply).is_err() {
            tracing::warn!(tool = %request.event.name, "Direct call abandoned before reply");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => RelayConfig::load_from(path)?,
        None => RelayConfig::load()?,
    };
    tracing::debug!(?config, "Loaded config");

    let turn: ChatTurn = read_json(&args.turn)?;
    let catalog: ToolCatalog = read_json(&args.catalog)?;
    let relay = ToolRelay::from_config(&config)?;

    let (status_tx, status_rx) = mpsc::channel(256);
    let (call_tx, call_rx) = mpsc::channel(1);
    let printer = tokio::spawn(print_status_events(status_rx));
    let answerer = tokio::spawn(answer_direct_calls(call_rx));

    let ctx = TurnContext::new(args.user)
        .with_sink(Arc::new(ChannelSink::new(status_tx)))
        .with_caller(Arc::new(ChannelCaller::new(call_tx)));
    let output = relay.run_turn(turn, &catalog, &ctx).await;
    drop(ctx);

    // Both tasks end once the context's senders are gone.
    for task in [printer, answerer] {
        if let Err(e) = task.await {
            tracing::warn!("Event task failed: {e}");
        }
    }

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
