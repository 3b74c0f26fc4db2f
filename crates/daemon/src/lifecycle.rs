// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup, serve loop, and shutdown.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use fs2::FileExt;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use xr_store::Registry;

use crate::config::Config;
use crate::domain::DomainManager;
use crate::gate::DomainGate;
use crate::listener::{ListenCtx, Listener};

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pid file is locked by another daemon: {0}")]
    LockFailed(std::io::Error),

    #[error("failed to bind {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),
}

/// A started daemon, ready to serve.
pub struct Daemon {
    config: Config,
    // Held for the daemon's lifetime; dropping releases the pid lock.
    _lock_file: Option<File>,
    pub registry: Arc<Mutex<Registry>>,
    pub domains: Arc<DomainManager>,
    shutdown: CancellationToken,
    listener: Listener,
    sweep_on_dom_exc: bool,
}

/// Bring the daemon up: pid lock first, sockets bound last.
pub async fn startup(config: &Config, gate: Arc<dyn DomainGate>) -> Result<Daemon, LifecycleError> {
    // 1. Runtime directories for the sockets.
    for sock in [&config.socket_path, &config.socket_ro_path] {
        if let Some(parent) = sock.parent() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // 2. Pid-file lock before anything else. Avoid truncating before the
    // lock is held, which would wipe a running daemon's pid.
    let lock_file = match &config.pid_file {
        Some(pid_path) => {
            if let Some(parent) = pid_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(false)
                .open(pid_path)?;
            file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;
            let mut file = file;
            file.set_len(0)?;
            writeln!(file, "{}", std::process::id())?;
            Some(file)
        }
        None => None,
    };

    // 3. Core state.
    let registry = Arc::new(Mutex::new(Registry::new()));
    let shutdown = CancellationToken::new();
    let domains =
        DomainManager::new(Arc::clone(&registry), gate, config.ring, shutdown.clone());

    // 4. Remove stale sockets and bind, read/write then read-only.
    let rw = bind(&config.socket_path)?;
    let ro = bind(&config.socket_ro_path)?;
    let listener = Listener::new(
        rw,
        ro,
        ListenCtx {
            registry: Arc::clone(&registry),
            domains: Arc::clone(&domains),
            shutdown: shutdown.clone(),
        },
    );

    info!(
        socket = %config.socket_path.display(),
        socket_ro = %config.socket_ro_path.display(),
        ring = config.ring,
        "daemon started"
    );

    Ok(Daemon {
        config: config.clone(),
        _lock_file: lock_file,
        registry,
        domains,
        shutdown,
        listener,
        sweep_on_dom_exc: config.dom_exc,
    })
}

fn bind(path: &std::path::Path) -> Result<UnixListener, LifecycleError> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    UnixListener::bind(path).map_err(|e| LifecycleError::BindFailed(path.to_path_buf(), e))
}

impl Daemon {
    /// Token that stops the daemon when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Serve until the shutdown token fires, then clean up socket files.
    pub async fn serve(self) -> Result<(), LifecycleError> {
        let Daemon { config, _lock_file, listener, domains, sweep_on_dom_exc, .. } = self;

        let sweeper = sweep_on_dom_exc.then(|| DomainManager::spawn_sweeper(&domains));
        listener.run().await;
        if let Some(sweeper) = sweeper {
            let _ = sweeper.await;
        }

        let _ = std::fs::remove_file(&config.socket_path);
        let _ = std::fs::remove_file(&config.socket_ro_path);
        if let Some(pid_path) = &config.pid_file {
            let _ = std::fs::remove_file(pid_path);
        }
        info!("daemon stopped");
        Ok(())
    }
}

/// Install the tracing subscriber: env-filtered, to stderr or the
/// configured log file. The returned guard must outlive the daemon.
pub fn init_logging(config: &Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match &config.log_file {
        Some(log_path) => {
            let dir = log_path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file = log_path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("xrd.log"));
            let appender = tracing_appender::rolling::never(dir, file);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            None
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
