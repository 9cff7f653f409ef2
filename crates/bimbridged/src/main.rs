//! bimbridge daemon: serves the bridge protocol over stdio.
//!
//! One JSON envelope per line on stdin, one response per line on stdout.
//! Runs against an in-memory document seeded with a small framing catalog —
//! a development harness; production deployments plug a real host adapter
//! in behind `HostDocument`.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::Level;

use bimbridge_core::{
    init_tracing, BridgeRequest, BridgeResponse, EngineConfig, ExecutionEngine, ProcessEngine,
};
use bimbridge_host::MemoryDocument;

#[derive(Parser, Debug)]
#[command(name = "bimbridged", about = "bimbridge development daemon")]
struct Args {
    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,

    /// Interpreter used for hot-loaded scripts.
    #[arg(long, default_value = "python3", env = "BIMBRIDGE_INTERPRETER")]
    interpreter: String,

    /// Log verbosity when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn seeded_document() -> MemoryDocument {
    let doc = MemoryDocument::new()
        .with_catalog("Walls", &["Generic - 6\"", "FLC_Interior", "FLC_Exterior"]);
    doc.seed_element("Levels", "Level", "Level 1", vec![]);
    doc.seed_element("Levels", "Level", "Level 2", vec![]);
    doc
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let level = args.log_level.parse().unwrap_or(Level::INFO);
    init_tracing(args.json_logs, level);

    let document = Arc::new(seeded_document());
    let engine = ExecutionEngine::new(
        document,
        Arc::new(ProcessEngine::new(args.interpreter)),
        EngineConfig::default(),
    )?;

    tracing::info!(version = bimbridge_core::VERSION, "bimbridged started");

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<BridgeRequest>(&line) {
            Ok(request) => engine.handle(request).await,
            Err(err) => BridgeResponse::failure("unknown", err.to_string(), "malformed_request"),
        };
        let mut out = serde_json::to_string(&response)?;
        out.push('\n');
        stdout.write_all(out.as_bytes()).await?;
        stdout.flush().await?;
    }

    tracing::info!("bimbridged stdin closed, shutting down");
    Ok(())
}
