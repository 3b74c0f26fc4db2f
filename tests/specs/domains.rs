// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Domain introduction, the ring channel, and liveness.

use std::sync::Arc;
use std::time::Duration;

use crate::prelude::*;
use xr_daemon::{DomainState, EventPort};
use xr_wire::{Frame, Header, Op, HEADER_LEN};

/// Guest-side driver for the shared ring, mirroring what a guest kernel
/// does: produce into `req`, consume from `rsp`, signal after publishing.
struct Guest {
    ring: Arc<xr_daemon::ring::RingInterface>,
    port: Arc<dyn EventPort>,
}

impl Guest {
    fn attach(daemon: &TestDaemon, domid: u16) -> Self {
        let (ring, port) = daemon.gate.guest_channel(domid);
        Guest { ring, port }
    }

    async fn send(&self, frame: &Frame) {
        let mut bytes = frame.header.encode().to_vec();
        bytes.extend_from_slice(&frame.body);
        let mut off = 0;
        while off < bytes.len() {
            let n = self.ring.req.produce(&bytes[off..]);
            if n == 0 {
                self.port.wait().await;
            } else {
                off += n;
                self.port.signal();
            }
        }
    }

    /// Read the next frame the daemon published.
    async fn next(&self) -> Frame {
        let mut hdr = [0u8; HEADER_LEN];
        self.read_exact(&mut hdr).await;
        let header = Header::decode(&hdr);
        let mut body = vec![0u8; header.len as usize];
        self.read_exact(&mut body).await;
        Frame { header, body }
    }

    async fn request(&self, frame: &Frame) -> Frame {
        self.send(frame).await;
        self.next().await
    }

    async fn read_exact(&self, out: &mut [u8]) {
        let mut got = 0;
        while got < out.len() {
            let n = self.ring.rsp.consume(&mut out[got..]);
            if n == 0 {
                self.port.wait().await;
            } else {
                got += n;
                self.port.signal();
            }
        }
    }
}

#[tokio::test]
async fn introduce_starts_a_ring_client() {
    let daemon = TestDaemon::start().await;
    let mut control = daemon.connect().await;
    let guest = Guest::attach(&daemon, 7);

    control.ok(Op::Introduce, 0, b"7\04660\05\0").await;

    let resp = control.request(Op::IsDomainIntroduced, 0, b"7").await;
    assert_eq!(resp.body, b"T\0");

    // The guest can use its channel, relative to its home path.
    let resp = guest.request(&Frame::new(Op::Write, 1, 0, b"state\0running".to_vec())).await;
    assert_eq!(resp.body, b"OK\0");

    let resp = control.request(Op::Read, 0, b"/local/domain/7/state").await;
    assert_eq!(resp.body, b"running");

    daemon.stop().await;
}

#[tokio::test]
async fn introduce_and_release_fire_their_sentinels_once() {
    let daemon = TestDaemon::start().await;
    let mut watcher = daemon.connect().await;
    let mut control = daemon.connect().await;

    watcher.watch("@introduceDomain", "in").await;
    watcher.watch("@releaseDomain", "out").await;

    control.ok(Op::Introduce, 0, b"7\01\01\0").await;
    watcher.expect_event("@introduceDomain", "in").await;

    control.ok(Op::Release, 0, b"7").await;
    watcher.expect_event("@releaseDomain", "out").await;

    let resp = control.request(Op::IsDomainIntroduced, 0, b"7").await;
    assert_eq!(resp.body, b"F\0");

    daemon.stop().await;
}

#[tokio::test]
async fn guest_watches_come_back_relative() {
    let daemon = TestDaemon::start().await;
    let mut control = daemon.connect().await;
    let guest = Guest::attach(&daemon, 9);

    control.ok(Op::Introduce, 0, b"9\01\01\0").await;

    let resp = guest.request(&Frame::new(Op::Watch, 1, 0, b"device\0tok\0".to_vec())).await;
    assert_eq!(resp.body, b"OK\0");

    // Initial fire, relative as registered.
    let event = guest.next().await;
    assert_eq!(event.header.op(), Some(Op::WatchEvent));
    assert_eq!(event.body, b"device\0tok\0");

    // A write from the control domain into the guest's subtree.
    control.ok(Op::Write, 0, b"/local/domain/9/device/vbd\0ready").await;
    let event = guest.next().await;
    assert_eq!(event.header.op(), Some(Op::WatchEvent));
    assert_eq!(event.body, b"device/vbd\0tok\0");

    daemon.stop().await;
}

#[tokio::test]
async fn sweep_on_dom_exc_releases_dead_domains() {
    let daemon = TestDaemon::start().await;
    let mut control = daemon.connect().await;
    let mut watcher = daemon.connect().await;

    control.ok(Op::Introduce, 0, b"5\01\01\0").await;
    watcher.watch("@releaseDomain", "out").await;

    daemon.gate.set_domain_state(5, DomainState::Missing);
    daemon.gate.raise_dom_exc();

    // The sweeper releases the domain and fires the sentinel.
    watcher.expect_event("@releaseDomain", "out").await;

    // Poll until the table reflects it.
    for _ in 0..100 {
        let resp = control.request(Op::IsDomainIntroduced, 0, b"5").await;
        if resp.body == b"F\0" {
            daemon.stop().await;
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("domain 5 was never released by the sweep");
}
