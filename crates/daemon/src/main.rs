// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `gafferd` — the Gaffer coordination daemon.
//!
//! Usage: `gafferd [workspace-root]`. The workspace defaults to the current
//! directory; all state lives under the configured working directory
//! beneath it.

use gaffer_daemon::Daemon;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn main() {
    let exit_code = run();
    std::process::exit(exit_code);
}

fn run() -> i32 {
    let workspace = match workspace_from_args() {
        Ok(workspace) => workspace,
        Err(message) => {
            eprintln!("{message}");
            return 64;
        }
    };

    // Config decides the working directory (and is the first thing that
    // can fail: exit 64).
    let config = match gaffer_core::DaemonConfig::load(&workspace) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("gafferd: {e}");
            return 64;
        }
    };

    // Logs roll daily under <workingDir>/logs; RUST_LOG filters as usual.
    let log_dir = config.working_dir(&workspace).join("logs");
    let _ = std::fs::create_dir_all(&log_dir);
    let appender = tracing_appender::rolling::daily(&log_dir, "gafferd.log");
    let (writer, _guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("failed to start runtime: {e}");
            return 70;
        }
    };

    runtime.block_on(async {
        match Daemon::start(&workspace).await {
            Ok(daemon) => {
                daemon.run_until_signal().await;
                0
            }
            Err(e) => {
                let code = e.exit_code();
                tracing::error!(error = %e, code, "daemon failed to start");
                eprintln!("gafferd: {e}");
                code
            }
        }
    })
}

fn workspace_from_args() -> Result<PathBuf, String> {
    let mut args = std::env::args().skip(1);
    let workspace = match args.next() {
        Some(arg) if arg == "--help" || arg == "-h" => {
            return Err("usage: gafferd [workspace-root]".to_string());
        }
        Some(path) => PathBuf::from(path),
        None => std::env::current_dir().map_err(|e| format!("cannot resolve cwd: {e}"))?,
    };
    if args.next().is_some() {
        return Err("usage: gafferd [workspace-root]".to_string());
    }
    if !workspace.is_dir() {
        return Err(format!("workspace is not a directory: {}", workspace.display()));
    }
    Ok(workspace)
}
