// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

use hostfs_daemon::logging::{self, Level, LogFormat};
use hostfs_daemon::{DaemonServer, Dispatcher, WatchHub};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the Unix socket for listening
    #[arg(long, default_value = "/tmp/hostfs/hostfs-daemon.sock")]
    socket_path: PathBuf,

    /// Default log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: Level,

    /// Log to this file instead of stdout
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Emit structured JSON log lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let Args {
        socket_path,
        log_level,
        log_file,
        log_json,
    } = Args::parse();

    let format = if log_json {
        LogFormat::Json
    } else {
        LogFormat::Plaintext
    };
    match &log_file {
        Some(path) => logging::init_to_file("hostfs_daemon", log_level, format, path)?,
        None => logging::init("hostfs_daemon", log_level, format)?,
    }

    info!(socket_path = %socket_path.display(), "starting HostFS daemon");

    let hub = WatchHub::new();
    let dispatcher = Arc::new(Dispatcher::new(hub));
    let mut server = DaemonServer::new(socket_path, dispatcher)?;

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        result = server.run() => {
            if let Err(err) = result {
                error!(error = %err, "server error during execution");
                return Err(err);
            }
        }
        _ = sigint.recv() => {
            info!(signal = "SIGINT", "shutting down");
            server.shutdown().await?;
        }
        _ = sigterm.recv() => {
            info!(signal = "SIGTERM", "shutting down");
            server.shutdown().await?;
        }
    }

    Ok(())
}
