// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `xrd` — the xenreg registry daemon.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use xr_daemon::{lifecycle, Config, LoopbackGate};

fn main() -> ExitCode {
    let config = Config::parse();

    // Daemonize before the runtime exists; forked threads don't survive.
    if config.daemon {
        if let Err(e) = nix::unistd::daemon(true, config.log_file.is_some()) {
            eprintln!("xrd: failed to daemonize: {}", e);
            return ExitCode::FAILURE;
        }
    }

    let _log_guard = lifecycle::init_logging(&config);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!("failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(async {
        // The loopback gate stands in wherever no hypervisor-backed gate
        // is wired in by the platform integration.
        let gate = Arc::new(LoopbackGate::new());
        let daemon = lifecycle::startup(&config, gate).await?;

        let shutdown = daemon.shutdown_token();
        tokio::spawn(async move {
            stop_signal().await;
            info!("stop signal received");
            shutdown.cancel();
        });

        daemon.serve().await
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("startup failed: {}", e);
            eprintln!("xrd: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Resolve on SIGINT or SIGTERM, routed through the runtime's reactor.
async fn stop_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut int = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(_) => return std::future::pending::<()>().await,
    };
    let mut term = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(_) => return std::future::pending::<()>().await,
    };
    tokio::select! {
        _ = int.recv() => {}
        _ = term.recv() => {}
    }
}
