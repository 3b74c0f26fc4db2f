// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Platform gate for guest domains.
//!
//! [`DomainGate`] is the privileged capability the domain manager
//! consumes: map a guest's ring page, bind its event port, and query
//! domain liveness. The hypervisor-backed implementation lives with the
//! platform integration; [`LoopbackGate`] implements the same surface
//! over process-local memory and is what tests and non-virtualized runs
//! use.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use xr_core::{DomId, RegError};

use crate::ring::RingInterface;

/// Liveness of a guest domain as the platform reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainState {
    Running,
    ShutDown,
    Dying,
    Missing,
}

/// One bound event channel endpoint.
#[async_trait]
pub trait EventPort: Send + Sync {
    /// Notify the peer.
    fn signal(&self);
    /// Wait for the next notification from the peer. A signal arriving
    /// while nobody waits must be retained for the next waiter.
    async fn wait(&self);
}

/// The privileged platform capability consumed by the domain manager.
#[async_trait]
pub trait DomainGate: Send + Sync {
    /// Map the guest's reserved ring page.
    fn map_ring(&self, domid: DomId, mfn: u64) -> Result<Arc<RingInterface>, RegError>;

    /// Bind a local endpoint to the guest's interrupt port.
    fn bind_port(&self, domid: DomId, remote_port: u32) -> Result<Arc<dyn EventPort>, RegError>;

    /// Current liveness of a domain.
    fn domain_state(&self, domid: DomId) -> DomainState;

    /// Wait for the next domain-exception interrupt.
    async fn dom_exc_wait(&self);
}

struct LoopbackPort {
    wait_on: Arc<Notify>,
    peer: Arc<Notify>,
}

#[async_trait]
impl EventPort for LoopbackPort {
    fn signal(&self) {
        self.peer.notify_one();
    }

    async fn wait(&self) {
        self.wait_on.notified().await;
    }
}

struct GuestSlot {
    ring: Arc<RingInterface>,
    daemon_notify: Arc<Notify>,
    guest_notify: Arc<Notify>,
    state: DomainState,
}

impl GuestSlot {
    fn new() -> Self {
        GuestSlot {
            ring: Arc::new(RingInterface::new()),
            daemon_notify: Arc::new(Notify::new()),
            guest_notify: Arc::new(Notify::new()),
            state: DomainState::Running,
        }
    }
}

/// In-process gate: rings are plain shared allocations, ports are
/// [`Notify`] pairs, liveness is whatever the test (or nothing) set.
pub struct LoopbackGate {
    slots: Mutex<HashMap<DomId, GuestSlot>>,
    dom_exc: Notify,
}

impl LoopbackGate {
    pub fn new() -> Self {
        LoopbackGate { slots: Mutex::new(HashMap::new()), dom_exc: Notify::new() }
    }

    /// The guest's view of its channel: the shared ring and the endpoint
    /// that signals the daemon / waits on daemon signals.
    pub fn guest_channel(&self, domid: DomId) -> (Arc<RingInterface>, Arc<dyn EventPort>) {
        let mut slots = self.slots.lock();
        let slot = slots.entry(domid).or_insert_with(GuestSlot::new);
        let port = LoopbackPort {
            wait_on: Arc::clone(&slot.guest_notify),
            peer: Arc::clone(&slot.daemon_notify),
        };
        (Arc::clone(&slot.ring), Arc::new(port))
    }

    /// Override a domain's reported liveness.
    pub fn set_domain_state(&self, domid: DomId, state: DomainState) {
        let mut slots = self.slots.lock();
        slots.entry(domid).or_insert_with(GuestSlot::new).state = state;
    }

    /// Raise the domain-exception interrupt.
    pub fn raise_dom_exc(&self) {
        self.dom_exc.notify_one();
    }
}

impl Default for LoopbackGate {
    fn default() -> Self {
        LoopbackGate::new()
    }
}

#[async_trait]
impl DomainGate for LoopbackGate {
    fn map_ring(&self, domid: DomId, _mfn: u64) -> Result<Arc<RingInterface>, RegError> {
        let mut slots = self.slots.lock();
        let slot = slots.entry(domid).or_insert_with(GuestSlot::new);
        Ok(Arc::clone(&slot.ring))
    }

    fn bind_port(&self, domid: DomId, _remote_port: u32) -> Result<Arc<dyn EventPort>, RegError> {
        let mut slots = self.slots.lock();
        let slot = slots.entry(domid).or_insert_with(GuestSlot::new);
        Ok(Arc::new(LoopbackPort {
            wait_on: Arc::clone(&slot.daemon_notify),
            peer: Arc::clone(&slot.guest_notify),
        }))
    }

    fn domain_state(&self, domid: DomId) -> DomainState {
        self.slots.lock().get(&domid).map_or(DomainState::Missing, |s| s.state)
    }

    async fn dom_exc_wait(&self) {
        self.dom_exc.notified().await;
    }
}
