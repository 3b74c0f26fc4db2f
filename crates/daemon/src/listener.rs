// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task for accepting socket clients.
//!
//! Two listening sockets: read/write and read-only. Connections are
//! accepted without blocking request service; each one gets its own
//! client task over the split stream.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use xr_core::{path, ClientId};
use xr_store::Registry;

use crate::client::{run_client, ClientCtx};
use crate::domain::DomainManager;

/// Shared daemon context handed to every accepted client.
pub struct ListenCtx {
    pub registry: Arc<Mutex<Registry>>,
    pub domains: Arc<DomainManager>,
    pub shutdown: CancellationToken,
}

/// Accept loop over the read/write and read-only sockets.
pub struct Listener {
    rw: UnixListener,
    ro: UnixListener,
    ctx: ListenCtx,
    next_id: AtomicU64,
}

impl Listener {
    pub fn new(rw: UnixListener, ro: UnixListener, ctx: ListenCtx) -> Self {
        Listener { rw, ro, ctx, next_id: AtomicU64::new(1) }
    }

    /// Run until shutdown, spawning a task per connection.
    pub async fn run(self) {
        info!("listener running");
        loop {
            tokio::select! {
                _ = self.ctx.shutdown.cancelled() => break,
                accepted = self.rw.accept() => match accepted {
                    Ok((stream, _)) => self.spawn_client(stream, false),
                    Err(e) => error!("accept error: {}", e),
                },
                accepted = self.ro.accept() => match accepted {
                    Ok((stream, _)) => self.spawn_client(stream, true),
                    Err(e) => error!("read-only accept error: {}", e),
                },
            }
        }
        info!("listener stopped");
    }

    fn spawn_client(&self, stream: tokio::net::UnixStream, read_only: bool) {
        let id = ClientId::Socket(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (reader, writer) = stream.into_split();
        let ctx = ClientCtx {
            id,
            // Local socket clients act for the control domain.
            prefix: path::domain_prefix(0),
            read_only,
            registry: Arc::clone(&self.ctx.registry),
            domains: Arc::clone(&self.ctx.domains),
            shutdown: self.ctx.shutdown.clone(),
        };
        tokio::spawn(run_client(reader, writer, ctx));
    }
}
