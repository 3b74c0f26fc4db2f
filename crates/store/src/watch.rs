// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Watch registration, matching, and transaction-deferred firing.
//!
//! Fires with `tid = 0` deliver immediately onto each matching client's
//! queue; fires inside a transaction are recorded and flushed only when
//! the transaction commits, in recording order, with duplicates coalesced
//! per (watch, delivered path) within the flush.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace};
use xr_core::{path, ClientId, RegError, MAX_WATCHES_PER_CLIENT};

/// One queued watch delivery: the matched path (already made relative for
/// relative registrations) and the subscriber's token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchFire {
    pub path: String,
    pub token: String,
}

/// How a recorded fire matches watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FireKind {
    /// The mutated path itself: matches watches at the path or any
    /// ancestor, delivering the fired path. Sentinels match exactly.
    Node,
    /// Ancestor notification: matches watches exactly, delivering the
    /// ancestor path.
    Parent,
    /// Subtree notification (deletes): matches watches strictly below the
    /// fired path — whether or not their path exists — delivering the
    /// watch's own path.
    Child,
}

struct ClientWatches {
    sink: UnboundedSender<WatchFire>,
    /// (absolute path, token) → prefix bytes stripped on delivery.
    watches: IndexMap<(String, String), usize>,
}

/// Path-scoped subscriptions across all clients.
pub struct WatchManager {
    clients: HashMap<ClientId, ClientWatches>,
    pending: HashMap<u32, Vec<(FireKind, String)>>,
}

impl WatchManager {
    pub fn new() -> Self {
        WatchManager { clients: HashMap::new(), pending: HashMap::new() }
    }

    /// Attach a client's fire queue. Must precede any `add` for the client.
    pub fn register_client(&mut self, id: ClientId, sink: UnboundedSender<WatchFire>) {
        self.clients.insert(id, ClientWatches { sink, watches: IndexMap::new() });
    }

    /// Drop a client and all of its watches.
    pub fn drop_client(&mut self, id: ClientId) {
        self.clients.remove(&id);
    }

    /// Register a watch and deliver its initial fire.
    ///
    /// `strip` is the prefix length removed on delivery for relative
    /// registrations (0 for absolute ones).
    pub fn add(
        &mut self,
        id: ClientId,
        abs_path: &str,
        token: &str,
        strip: usize,
    ) -> Result<(), RegError> {
        let client = self.clients.get_mut(&id).ok_or(RegError::Invalid)?;
        if client.watches.len() >= MAX_WATCHES_PER_CLIENT {
            return Err(RegError::NoSpace);
        }
        let key = (abs_path.to_string(), token.to_string());
        if client.watches.contains_key(&key) {
            return Err(RegError::Exists);
        }
        client.watches.insert(key, strip);
        debug!(client = %id, path = abs_path, token, "watch added");
        // Initial fire: the path exactly as the client registered it.
        let fire = WatchFire { path: abs_path[strip..].to_string(), token: token.to_string() };
        let _ = client.sink.send(fire);
        Ok(())
    }

    /// Remove a watch; `NotFound` when the pair was never registered.
    pub fn del(&mut self, id: ClientId, abs_path: &str, token: &str) -> Result<(), RegError> {
        let client = self.clients.get_mut(&id).ok_or(RegError::Invalid)?;
        let key = (abs_path.to_string(), token.to_string());
        client.watches.shift_remove(&key).map(|_| ()).ok_or(RegError::NotFound)
    }

    /// Remove every watch a client holds (RESET_WATCHES).
    pub fn reset(&mut self, id: ClientId) {
        if let Some(client) = self.clients.get_mut(&id) {
            client.watches.clear();
        }
    }

    /// Fire the mutated path: immediate at `tid = 0`, else deferred.
    pub fn fire(&mut self, tid: u32, path: &str) {
        self.record(tid, FireKind::Node, path);
    }

    /// Fire every proper ancestor of `path`.
    pub fn fire_parents(&mut self, tid: u32, path_str: &str) {
        for anc in path::ancestors(path_str) {
            self.record(tid, FireKind::Parent, anc);
        }
    }

    /// Fire the subtree below `path` (deletes).
    pub fn fire_children(&mut self, tid: u32, path: &str) {
        self.record(tid, FireKind::Child, path);
    }

    /// Flush a committed transaction's deferred fires.
    pub fn fire_on_commit(&mut self, tid: u32) {
        let Some(recorded) = self.pending.remove(&tid) else { return };
        trace!(tid, fires = recorded.len(), "flushing deferred watch fires");
        let mut seen: HashSet<(ClientId, String, String, String)> = HashSet::new();
        for (kind, path) in recorded {
            self.deliver(kind, &path, Some(&mut seen));
        }
    }

    /// Discard an aborted transaction's deferred fires.
    pub fn abort(&mut self, tid: u32) {
        self.pending.remove(&tid);
    }

    fn record(&mut self, tid: u32, kind: FireKind, path: &str) {
        if tid == 0 {
            self.deliver(kind, path, None);
        } else {
            self.pending.entry(tid).or_default().push((kind, path.to_string()));
        }
    }

    fn deliver(
        &self,
        kind: FireKind,
        fired: &str,
        mut seen: Option<&mut HashSet<(ClientId, String, String, String)>>,
    ) {
        for (id, client) in &self.clients {
            for ((wpath, token), strip) in &client.watches {
                let delivered = match kind {
                    FireKind::Node => {
                        let matches = if path::is_special(fired) {
                            wpath == fired
                        } else {
                            wpath == fired || path::is_descendant(fired, wpath)
                        };
                        if !matches {
                            continue;
                        }
                        fired
                    }
                    FireKind::Parent => {
                        if wpath != fired {
                            continue;
                        }
                        fired
                    }
                    FireKind::Child => {
                        if !path::is_descendant(wpath, fired) {
                            continue;
                        }
                        wpath.as_str()
                    }
                };
                let delivered = delivered[*strip..].to_string();
                if let Some(seen) = seen.as_deref_mut() {
                    let key = (*id, wpath.clone(), token.clone(), delivered.clone());
                    if !seen.insert(key) {
                        continue;
                    }
                }
                let _ = client.sink.send(WatchFire { path: delivered, token: token.clone() });
            }
        }
    }
}

impl Default for WatchManager {
    fn default() -> Self {
        WatchManager::new()
    }
}

#[cfg(test)]
#[path = "watch_tests.rs"]
mod tests;
