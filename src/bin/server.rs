//! `roomcast-server` — CLI entry point. Binds the listening port, wires
//! up the audit log and the registries, installs the SIGINT handler, and
//! runs the accept loop until shutdown.

use std::net::TcpListener;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use roomcast::acceptor;
use roomcast::logging::AuditLog;
use roomcast::state::AppState;

/// Multi-user chat server with rooms, whispers, and brokered file transfers.
#[derive(Parser, Debug)]
#[command(name = "roomcast-server")]
struct ServerArgs {
    /// TCP port to listen on (1-65535).
    port: u16,

    /// Path to the append-only audit log.
    #[arg(long, default_value = "server.log")]
    log_path: std::path::PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .try_init()
        .ok();

    let args = ServerArgs::parse();
    if args.port == 0 {
        anyhow::bail!("port must be between 1 and 65535");
    }

    let log = AuditLog::open(&args.log_path).context("failed to open audit log")?;
    let state = AppState::new(log);
    state.log.log(roomcast::logging::Level::Server, format!("server starting on port {}", args.port));

    let listener = TcpListener::bind(("0.0.0.0", args.port))
        .with_context(|| format!("failed to bind port {}", args.port))?;
    log::info!("server listening on port {}", args.port);

    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, shutdown.clone())
        .context("failed to register SIGINT handler")?;

    acceptor::serve(listener, state, shutdown).context("server loop failed")?;
    log::info!("server shut down cleanly");
    Ok(())
}
