// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Domain manager: introduced guests and their ring clients.
//!
//! Each introduced domain owns a mapped ring page, a bound event port,
//! and a client task speaking the protocol over the ring. Destroying a
//! domain cancels the client, which tears itself down through the normal
//! drain path; the mapping is released by drop.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use xr_core::{path, ClientId, DomId, RegError, INTRODUCE_DOMAIN, RELEASE_DOMAIN};
use xr_store::Registry;

use crate::client::{run_client, ClientCtx};
use crate::gate::{DomainGate, DomainState};
use crate::ring;

struct DomainHandle {
    remote_port: u32,
    mfn: u64,
    active: bool,
    cancel: CancellationToken,
}

/// Tracks introduced guests and owns their ring clients.
pub struct DomainManager {
    registry: Arc<Mutex<Registry>>,
    gate: Arc<dyn DomainGate>,
    domains: Mutex<HashMap<DomId, DomainHandle>>,
    /// When false the ring transport is configured off and INTRODUCE
    /// answers ENOSYS.
    ring_enabled: bool,
    shutdown: CancellationToken,
}

impl DomainManager {
    pub fn new(
        registry: Arc<Mutex<Registry>>,
        gate: Arc<dyn DomainGate>,
        ring_enabled: bool,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(DomainManager {
            registry,
            gate,
            domains: Mutex::new(HashMap::new()),
            ring_enabled,
            shutdown,
        })
    }

    /// Introduce a domain: map its ring, bind its port, start its client,
    /// and fire `@introduceDomain`.
    pub fn introduce(
        mgr: &Arc<DomainManager>,
        domid: DomId,
        mfn: u64,
        remote_port: u32,
    ) -> Result<(), RegError> {
        if !mgr.ring_enabled {
            return Err(RegError::Unsupported);
        }
        if domid == 0 {
            return Err(RegError::Invalid);
        }
        {
            let mut domains = mgr.domains.lock();
            if domains.contains_key(&domid) {
                return Err(RegError::Exists);
            }
            let iface = mgr.gate.map_ring(domid, mfn)?;
            let port = mgr.gate.bind_port(domid, remote_port)?;
            let cancel = mgr.shutdown.child_token();

            let stream = ring::spawn_pump(iface, port, cancel.clone());
            let (reader, writer) = tokio::io::split(stream);
            let ctx = ClientCtx {
                id: ClientId::Domain(domid),
                prefix: path::domain_prefix(domid),
                read_only: false,
                registry: Arc::clone(&mgr.registry),
                domains: Arc::clone(mgr),
                shutdown: cancel.clone(),
            };
            tokio::spawn(run_client(reader, writer, ctx));

            domains.insert(domid, DomainHandle { remote_port, mfn, active: true, cancel });
        }
        info!(domid, mfn, remote_port, "domain introduced");
        mgr.registry.lock().fire_special(INTRODUCE_DOMAIN);
        Ok(())
    }

    /// Release a domain: cancel its client and fire `@releaseDomain`.
    pub fn destroy(&self, domid: DomId) -> Result<(), RegError> {
        let handle = self.domains.lock().remove(&domid).ok_or(RegError::NotFound)?;
        handle.cancel.cancel();
        info!(domid, "domain released");
        self.registry.lock().fire_special(RELEASE_DOMAIN);
        Ok(())
    }

    pub fn is_introduced(&self, domid: DomId) -> bool {
        self.domains.lock().contains_key(&domid)
    }

    /// Reconcile the domain table with platform liveness.
    ///
    /// Missing or dying domains are torn down; a shut-down domain still
    /// marked active goes inactive and fires `@releaseDomain` without
    /// losing its mapping.
    pub fn sweep(&self) {
        let mut dead = Vec::new();
        let mut dying = Vec::new();
        {
            let mut domains = self.domains.lock();
            for (domid, handle) in domains.iter_mut() {
                match self.gate.domain_state(*domid) {
                    DomainState::Missing | DomainState::Dying => dead.push(*domid),
                    DomainState::ShutDown if handle.active => {
                        handle.active = false;
                        dying.push(*domid);
                    }
                    _ => {}
                }
            }
        }
        for domid in dead {
            debug!(domid, "sweep: domain gone");
            if let Err(e) = self.destroy(domid) {
                warn!(domid, "sweep failed to release domain: {}", e);
            }
        }
        for domid in dying {
            debug!(domid, "sweep: domain shut down");
            self.registry.lock().fire_special(RELEASE_DOMAIN);
        }
    }

    /// Run the liveness sweep on every domain-exception interrupt.
    pub fn spawn_sweeper(mgr: &Arc<DomainManager>) -> tokio::task::JoinHandle<()> {
        let mgr = Arc::clone(mgr);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = mgr.shutdown.cancelled() => break,
                    _ = mgr.gate.dom_exc_wait() => mgr.sweep(),
                }
            }
        })
    }

    /// Introduced-domain parameters, for introspection and tests.
    pub fn channel_info(&self, domid: DomId) -> Option<(u64, u32)> {
        self.domains.lock().get(&domid).map(|h| (h.mfn, h.remote_port))
    }
}

#[cfg(test)]
#[path = "domain_tests.rs"]
mod tests;
