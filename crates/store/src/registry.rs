// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The registry façade: store mutations coupled to watch fires.
//!
//! Every protocol operation lands here. The façade resolves which watches
//! an operation fires, enforces per-node permissions, and drives the
//! transaction lifecycle across both the store and the watch manager.

use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;
use xr_core::{DomId, ClientId, PermissionList, RegError};

use crate::store::Store;
use crate::watch::{WatchFire, WatchManager};

pub struct Registry {
    store: Store,
    watches: WatchManager,
}

impl Registry {
    pub fn new() -> Self {
        Registry { store: Store::new(), watches: WatchManager::new() }
    }

    pub fn read(&mut self, who: DomId, tid: u32, path: &str) -> Result<Vec<u8>, RegError> {
        self.check_read(who, tid, path)?;
        self.store.read(tid, path)
    }

    pub fn directory(&mut self, who: DomId, tid: u32, path: &str) -> Result<Vec<String>, RegError> {
        self.check_read(who, tid, path)?;
        self.store.children(tid, path)
    }

    pub fn write(
        &mut self,
        who: DomId,
        tid: u32,
        path: &str,
        value: &[u8],
    ) -> Result<(), RegError> {
        self.check_write(who, tid, path)?;
        self.store.write(tid, who, path, value)?;
        self.watches.fire(tid, path);
        self.watches.fire_parents(tid, path);
        Ok(())
    }

    pub fn mkdir(&mut self, who: DomId, tid: u32, path: &str) -> Result<(), RegError> {
        self.check_write(who, tid, path)?;
        let created = self.store.create(tid, who, path)?;
        if created {
            self.watches.fire(tid, path);
            self.watches.fire_parents(tid, path);
        }
        Ok(())
    }

    pub fn rm(&mut self, who: DomId, tid: u32, path: &str) -> Result<(), RegError> {
        self.check_write(who, tid, path)?;
        self.store.delete(tid, path)?;
        self.watches.fire(tid, path);
        self.watches.fire_parents(tid, path);
        self.watches.fire_children(tid, path);
        Ok(())
    }

    pub fn get_perms(
        &mut self,
        who: DomId,
        tid: u32,
        path: &str,
    ) -> Result<PermissionList, RegError> {
        self.check_read(who, tid, path)?;
        self.store.get_perms(tid, path)
    }

    pub fn set_perms(
        &mut self,
        who: DomId,
        tid: u32,
        path: &str,
        perms: PermissionList,
    ) -> Result<(), RegError> {
        self.check_write(who, tid, path)?;
        self.store.set_perms(tid, path, perms)
    }

    pub fn transaction_start(&mut self) -> u32 {
        self.store.branch()
    }

    /// Commit or abort; a refused commit surfaces as `Retry` after the
    /// transaction and its deferred fires are discarded.
    pub fn transaction_end(&mut self, tid: u32, commit: bool) -> Result<(), RegError> {
        if commit {
            match self.store.commit(tid) {
                Ok(()) => {
                    self.watches.fire_on_commit(tid);
                    Ok(())
                }
                Err(e) => {
                    self.watches.abort(tid);
                    Err(e)
                }
            }
        } else {
            self.store.abort(tid)?;
            self.watches.abort(tid);
            Ok(())
        }
    }

    /// Attach a client's watch fire queue.
    pub fn register_client(&mut self, id: ClientId, sink: UnboundedSender<WatchFire>) {
        self.watches.register_client(id, sink);
    }

    /// Tear a client down: abort its open transactions, drop its watches.
    pub fn release_client(&mut self, id: ClientId, open_tids: &[u32]) {
        for tid in open_tids {
            let _ = self.store.abort(*tid);
            self.watches.abort(*tid);
        }
        self.watches.drop_client(id);
        debug!(client = %id, "client released");
    }

    pub fn watch(
        &mut self,
        id: ClientId,
        abs_path: &str,
        token: &str,
        strip: usize,
    ) -> Result<(), RegError> {
        self.watches.add(id, abs_path, token, strip)
    }

    pub fn unwatch(&mut self, id: ClientId, abs_path: &str, token: &str) -> Result<(), RegError> {
        self.watches.del(id, abs_path, token)
    }

    pub fn reset_watches(&mut self, id: ClientId) {
        self.watches.reset(id);
    }

    /// Fire a sentinel path (`@introduceDomain` / `@releaseDomain`).
    pub fn fire_special(&mut self, sentinel: &str) {
        self.watches.fire(0, sentinel);
    }

    fn check_read(&self, who: DomId, tid: u32, path: &str) -> Result<(), RegError> {
        match self.store.peek_perms(tid, path) {
            Some(perms) if !perms.can_read(who) => Err(RegError::Denied),
            _ => Ok(()),
        }
    }

    fn check_write(&self, who: DomId, tid: u32, path: &str) -> Result<(), RegError> {
        if self.store.access_perms(tid, path).can_write(who) {
            Ok(())
        } else {
            Err(RegError::Denied)
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
