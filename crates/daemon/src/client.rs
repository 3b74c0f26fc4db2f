// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection protocol engine.
//!
//! A connection is split into a reader half and a writer half. The reader
//! task decodes frames and forwards them over a depth-1 channel; the
//! engine task serves one request at a time and interleaves watch
//! delivery: after every response it emits at most one queued watch event,
//! and while idle between requests it drains the queue. Watch floods
//! therefore cannot starve requests, and request floods cannot starve
//! watches.
//!
//! Teardown is always scheduled, never inline: transport death ends the
//! reader, the engine drains, and only then are the client's watches
//! dropped and its open transactions aborted.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use xr_core::{path, ClientId, PermissionList, RegError, MAX_TRANSACTIONS_PER_CLIENT, PAYLOAD_MAX};
use xr_store::{Registry, WatchFire};
use xr_wire::{
    path_and_value, read_frame, split_fields, write_frame, Frame, Header, Op, WireError,
};

use crate::domain::DomainManager;

/// Everything a connection needs to serve requests.
pub struct ClientCtx {
    pub id: ClientId,
    /// Domain prefix for relative paths, with trailing slash.
    pub prefix: String,
    /// Clients from the read-only socket get `EACCES` for mutations.
    pub read_only: bool,
    pub registry: Arc<Mutex<Registry>>,
    pub domains: Arc<DomainManager>,
    pub shutdown: CancellationToken,
}

enum RxItem {
    Frame(Frame),
    Oversize(Header),
}

/// Drive one connection until its transport dies or the daemon stops.
pub async fn run_client<R, W>(mut reader: R, mut writer: W, ctx: ClientCtx)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send,
{
    let (fire_tx, mut fire_rx) = mpsc::unbounded_channel::<WatchFire>();
    ctx.registry.lock().register_client(ctx.id, fire_tx);
    debug!(client = %ctx.id, read_only = ctx.read_only, "client connected");

    let (req_tx, mut req_rx) = mpsc::channel::<RxItem>(1);
    let reader_task = tokio::spawn(async move {
        loop {
            let item = match read_frame(&mut reader).await {
                Ok(frame) => RxItem::Frame(frame),
                Err(WireError::Oversize { header }) => RxItem::Oversize(header),
                Err(WireError::ConnectionClosed) => break,
                Err(WireError::Io(e)) => {
                    trace!("client read failed: {}", e);
                    break;
                }
            };
            if req_tx.send(item).await.is_err() {
                break;
            }
        }
    });

    let shutdown = ctx.shutdown.clone();
    let registry = Arc::clone(&ctx.registry);
    let id = ctx.id;
    let mut engine = Engine { ctx, open_txns: HashSet::new() };

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            item = req_rx.recv() => {
                let Some(item) = item else { break };
                let response = match item {
                    RxItem::Oversize(h) => Frame::error(h.req_id, h.tx_id, RegError::Invalid),
                    RxItem::Frame(frame) => engine.dispatch(frame),
                };
                if write_frame(&mut writer, &response).await.is_err() {
                    break;
                }
                // One deferred watch event per request/response cycle.
                if let Ok(fire) = fire_rx.try_recv() {
                    let event = Frame::watch_event(&fire.path, &fire.token);
                    if write_frame(&mut writer, &event).await.is_err() {
                        break;
                    }
                }
            }
            fire = fire_rx.recv() => {
                let Some(fire) = fire else { break };
                let event = Frame::watch_event(&fire.path, &fire.token);
                if write_frame(&mut writer, &event).await.is_err() {
                    break;
                }
            }
        }
    }

    reader_task.abort();
    let open: Vec<u32> = engine.open_txns.iter().copied().collect();
    registry.lock().release_client(id, &open);
    debug!(client = %id, "client closed");
}

struct Engine {
    ctx: ClientCtx,
    open_txns: HashSet<u32>,
}

impl Engine {
    fn dispatch(&mut self, frame: Frame) -> Frame {
        let hdr = frame.header;
        let Some(op) = hdr.op() else {
            return Frame::error(hdr.req_id, hdr.tx_id, RegError::Invalid);
        };
        match self.handle(op, &frame) {
            Ok(resp) if resp.body.len() > PAYLOAD_MAX => {
                Frame::error(hdr.req_id, hdr.tx_id, RegError::NoSpace)
            }
            Ok(resp) => resp,
            Err(e) => Frame::error(hdr.req_id, hdr.tx_id, e),
        }
    }

    fn handle(&mut self, op: Op, frame: &Frame) -> Result<Frame, RegError> {
        let hdr = frame.header;
        let tid = hdr.tx_id;
        if uses_tid(op) && tid != 0 && !self.open_txns.contains(&tid) {
            return Err(RegError::Invalid);
        }
        if self.ctx.read_only && mutates(op) {
            return Err(RegError::Denied);
        }
        let who = self.ctx.id.domid();
        let reply = |body: Vec<u8>| Frame::new(op, hdr.req_id, hdr.tx_id, body);
        let ack = || Frame::ack(op, hdr.req_id, hdr.tx_id);

        match op {
            Op::Directory => {
                let path = self.resolve(self.first_field(frame)?)?;
                let children = self.registry().directory(who, tid, &path)?;
                let mut body = Vec::new();
                for child in children {
                    body.extend_from_slice(child.as_bytes());
                    body.push(0);
                }
                Ok(reply(body))
            }

            Op::Read => {
                let path = self.resolve(self.first_field(frame)?)?;
                let value = self.registry().read(who, tid, &path)?;
                Ok(reply(value))
            }

            Op::Write => {
                let (raw, value) = path_and_value(&frame.body)?;
                let path = self.resolve(raw)?;
                self.registry().write(who, tid, &path, value)?;
                Ok(ack())
            }

            Op::Mkdir => {
                let path = self.resolve(self.first_field(frame)?)?;
                self.registry().mkdir(who, tid, &path)?;
                Ok(ack())
            }

            Op::Rm => {
                let path = self.resolve(self.first_field(frame)?)?;
                self.registry().rm(who, tid, &path)?;
                Ok(ack())
            }

            Op::GetPerms => {
                let path = self.resolve(self.first_field(frame)?)?;
                let perms = self.registry().get_perms(who, tid, &path)?;
                let mut body = Vec::new();
                for field in perms.encode_fields() {
                    body.extend_from_slice(field.as_bytes());
                    body.push(0);
                }
                Ok(reply(body))
            }

            Op::SetPerms => {
                let fields = split_fields(&frame.body)?;
                let (raw, perm_fields) = fields.split_first().ok_or(RegError::Invalid)?;
                let path = self.resolve(raw)?;
                let perms = PermissionList::parse_fields(perm_fields)?;
                self.registry().set_perms(who, tid, &path, perms)?;
                Ok(ack())
            }

            Op::Watch => {
                let fields = split_fields(&frame.body)?;
                let [raw, token] = fields.as_slice() else { return Err(RegError::Invalid) };
                let (abs, strip) = self.resolve_watch(raw)?;
                self.registry().watch(self.ctx.id, &abs, token, strip)?;
                Ok(ack())
            }

            Op::Unwatch => {
                let fields = split_fields(&frame.body)?;
                let [raw, token] = fields.as_slice() else { return Err(RegError::Invalid) };
                let (abs, _) = self.resolve_watch(raw)?;
                self.registry().unwatch(self.ctx.id, &abs, token)?;
                Ok(ack())
            }

            Op::TransactionStart => {
                if self.open_txns.len() >= MAX_TRANSACTIONS_PER_CLIENT {
                    return Err(RegError::NoSpace);
                }
                let new_tid = self.registry().transaction_start();
                self.open_txns.insert(new_tid);
                let mut body = new_tid.to_string().into_bytes();
                body.push(0);
                Ok(reply(body))
            }

            Op::TransactionEnd => {
                if tid == 0 || !self.open_txns.contains(&tid) {
                    return Err(RegError::Invalid);
                }
                let commit = match self.first_field(frame)? {
                    "T" => true,
                    "F" => false,
                    _ => return Err(RegError::Invalid),
                };
                self.open_txns.remove(&tid);
                self.registry().transaction_end(tid, commit)?;
                Ok(ack())
            }

            Op::Introduce => {
                if who != 0 {
                    return Err(RegError::Denied);
                }
                let fields = split_fields(&frame.body)?;
                let [domid, mfn, port] = fields.as_slice() else { return Err(RegError::Invalid) };
                let domid = parse_domid(domid)?;
                let mfn = mfn.parse::<u64>().map_err(|_| RegError::Invalid)?;
                let port = port.parse::<u32>().map_err(|_| RegError::Invalid)?;
                DomainManager::introduce(&self.ctx.domains, domid, mfn, port)?;
                Ok(ack())
            }

            Op::Release => {
                if who != 0 {
                    return Err(RegError::Denied);
                }
                let domid = parse_domid(self.first_field(frame)?)?;
                self.ctx.domains.destroy(domid)?;
                Ok(ack())
            }

            Op::IsDomainIntroduced => {
                let domid = parse_domid(self.first_field(frame)?)?;
                let body = if self.ctx.domains.is_introduced(domid) { b"T\0" } else { b"F\0" };
                Ok(reply(body.to_vec()))
            }

            Op::GetDomainPath => {
                let domid = parse_domid(self.first_field(frame)?)?;
                let mut body = path::domain_path(domid).into_bytes();
                body.push(0);
                Ok(reply(body))
            }

            Op::ResetWatches => {
                self.registry().reset_watches(self.ctx.id);
                Ok(ack())
            }

            Op::Debug | Op::Resume => Ok(ack()),

            Op::SetTarget | Op::Restrict => Err(RegError::Unsupported),

            // Response-only types are not valid requests.
            Op::WatchEvent | Op::Error => Err(RegError::Invalid),
        }
    }

    fn registry(&self) -> parking_lot::MutexGuard<'_, Registry> {
        self.ctx.registry.lock()
    }

    fn first_field<'a>(&self, frame: &'a Frame) -> Result<&'a str, RegError> {
        let fields = split_fields(&frame.body)?;
        fields.first().copied().ok_or(RegError::Invalid)
    }

    fn resolve(&self, raw: &str) -> Result<String, RegError> {
        path::resolve(&self.ctx.prefix, raw)
    }

    /// Watch paths keep track of how they were written: relative
    /// registrations are delivered relative again.
    fn resolve_watch(&self, raw: &str) -> Result<(String, usize), RegError> {
        let abs = path::resolve(&self.ctx.prefix, raw)?;
        let strip = if raw.starts_with('/') || raw.starts_with('@') { 0 } else { self.ctx.prefix.len() };
        Ok((abs, strip))
    }
}

fn parse_domid(field: &str) -> Result<u16, RegError> {
    field.parse::<u16>().map_err(|_| RegError::Invalid)
}

fn uses_tid(op: Op) -> bool {
    matches!(
        op,
        Op::Directory
            | Op::Read
            | Op::Write
            | Op::Mkdir
            | Op::Rm
            | Op::GetPerms
            | Op::SetPerms
            | Op::TransactionEnd
    )
}

fn mutates(op: Op) -> bool {
    matches!(
        op,
        Op::Write
            | Op::Mkdir
            | Op::Rm
            | Op::SetPerms
            | Op::Introduce
            | Op::Release
            | Op::Resume
            | Op::SetTarget
    )
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
