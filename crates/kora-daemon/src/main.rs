//! `kora` — personal assistant daemon with a terminal transport.

mod app;
mod terminal;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use kora_core::KoraConfig;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kora", about = "Personal AI assistant with a structured memory store")]
struct Args {
    /// Path to kora.toml (defaults to ./kora.toml; env overrides apply).
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = KoraConfig::load(args.config.as_deref())?;

    let app = app::App::start(config)?;
    let approvals = Arc::clone(&app.approvals);
    let inbound_tx = app.inbound_tx.clone();

    // Terminal REPL until EOF or ctrl-c.
    let (repl_shutdown_tx, repl_shutdown_rx) = watch::channel(false);
    let repl = tokio::spawn(terminal::run_repl(inbound_tx, approvals, repl_shutdown_rx));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupt received"),
        _ = repl => info!("terminal closed"),
    }

    let _ = repl_shutdown_tx.send(true);
    app.shutdown().await;
    Ok(())
}
