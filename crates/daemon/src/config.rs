// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon option surface.

use std::path::PathBuf;

use clap::Parser;

/// xenreg registry daemon.
#[derive(Parser, Debug, Clone)]
#[command(name = "xrd", version, about = "In-memory transactional configuration registry daemon")]
pub struct Config {
    /// Run in background
    #[arg(short = 'D', long = "daemon")]
    pub daemon: bool,

    /// Write process pid to file
    #[arg(long = "pid-file")]
    pub pid_file: Option<PathBuf>,

    /// Write log output to file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Read/write socket path
    #[arg(long = "socket-path", default_value = "/run/xenreg/socket")]
    pub socket_path: PathBuf,

    /// Read-only socket path
    #[arg(long = "socket-ro-path", default_value = "/run/xenreg/socket_ro")]
    pub socket_ro_path: PathBuf,

    /// Enable the shared-memory ring transport for introduced domains
    #[arg(long = "ring")]
    pub ring: bool,

    /// Enable the domain-liveness sweep on the domain-exception interrupt
    #[arg(long = "dom-exc")]
    pub dom_exc: bool,
}

impl Config {
    /// A config suitable for tests: sockets under `dir`, everything else off.
    pub fn for_test_dir(dir: &std::path::Path) -> Self {
        Config {
            daemon: false,
            pid_file: None,
            log_file: None,
            socket_path: dir.join("socket"),
            socket_ro_path: dir.join("socket_ro"),
            ring: true,
            dom_exc: true,
        }
    }
}
