// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Basic registry operations over the socket.

use crate::prelude::*;
use xr_wire::{Frame, Op};

#[tokio::test]
async fn deep_write_creates_ancestors_and_lists_them() {
    let daemon = TestDaemon::start().await;
    let mut conn = daemon.connect().await;

    conn.ok(Op::Write, 0, b"/a/b/c\0x").await;

    let resp = conn.request(Op::Read, 0, b"/a").await;
    assert_eq!(resp.body, b"");

    let resp = conn.request(Op::Directory, 0, b"/a").await;
    assert_eq!(resp.body, b"b\0");

    let resp = conn.request(Op::Read, 0, b"/a/b/c").await;
    assert_eq!(resp.body, b"x");

    daemon.stop().await;
}

#[tokio::test]
async fn watches_fire_for_a_deep_write() {
    let daemon = TestDaemon::start().await;
    let mut watcher = daemon.connect().await;
    let mut writer = daemon.connect().await;

    watcher.watch("/a", "a").await;
    watcher.watch("/a/b", "ab").await;
    watcher.watch("/a/b/c", "abc").await;

    writer.ok(Op::Write, 0, b"/a/b/c\0x").await;

    // Node fire reaches every watch at or above the written path, in
    // registration order, carrying the written path.
    watcher.expect_event("/a/b/c", "a").await;
    watcher.expect_event("/a/b/c", "ab").await;
    watcher.expect_event("/a/b/c", "abc").await;
    // Parent fan-out then notifies the exact ancestor watches.
    watcher.expect_event("/a/b", "ab").await;
    watcher.expect_event("/a", "a").await;

    daemon.stop().await;
}

#[tokio::test]
async fn subtree_delete_notifies_every_level() {
    let daemon = TestDaemon::start().await;
    let mut watcher = daemon.connect().await;
    let mut writer = daemon.connect().await;

    writer.ok(Op::Write, 0, b"/a/b/c\0x").await;
    watcher.watch("/", "root").await;
    watcher.watch("/a", "a").await;
    watcher.watch("/a/b", "ab").await;
    watcher.watch("/a/b/c", "abc").await;

    writer.ok(Op::Rm, 0, b"/a").await;

    watcher.expect_event("/a", "root").await;
    watcher.expect_event("/a", "a").await;
    watcher.expect_event("/", "root").await;
    watcher.expect_event("/a/b", "ab").await;
    watcher.expect_event("/a/b/c", "abc").await;

    let resp = writer.request(Op::Read, 0, b"/a/b/c").await;
    assert_eq!(resp.header.op(), Some(Op::Error));

    daemon.stop().await;
}

#[tokio::test]
async fn payload_boundary_is_exact() {
    let daemon = TestDaemon::start().await;
    let mut conn = daemon.connect().await;

    // Body exactly at the payload limit is accepted.
    let mut body = b"/big\0".to_vec();
    body.resize(xr_core::PAYLOAD_MAX, b'x');
    let resp = conn.request(Op::Write, 0, &body).await;
    assert_eq!(resp.body, b"OK\0");

    // One byte over is rejected with EINVAL and the connection survives.
    let mut body = b"/big\0".to_vec();
    body.resize(xr_core::PAYLOAD_MAX + 1, b'x');
    conn.expect_error(Op::Write, 0, &body, "EINVAL").await;
    let resp = conn.request(Op::Read, 0, b"/big").await;
    assert_eq!(resp.body.len(), xr_core::PAYLOAD_MAX - 5);

    daemon.stop().await;
}

#[tokio::test]
async fn read_only_socket_rejects_mutations() {
    let daemon = TestDaemon::start().await;
    let mut rw = daemon.connect().await;
    let mut ro = daemon.connect_ro().await;

    rw.ok(Op::Write, 0, b"/public\0data").await;

    let resp = ro.request(Op::Read, 0, b"/public").await;
    assert_eq!(resp.body, b"data");

    ro.expect_error(Op::Write, 0, b"/public\0clobber", "EACCES").await;
    ro.expect_error(Op::Rm, 0, b"/public", "EACCES").await;

    daemon.stop().await;
}

#[tokio::test]
async fn error_frames_echo_request_ids() {
    let daemon = TestDaemon::start().await;
    let mut conn = daemon.connect().await;

    let resp = conn.request(Op::Read, 0, b"/nope").await;
    assert_eq!(resp.header.op(), Some(Op::Error));
    assert_eq!(resp.header.req_id, 1);
    assert_eq!(resp.body, b"ENOENT\0");

    let resp = conn.request(Op::Read, 0, b"/nope").await;
    assert_eq!(resp.header.req_id, 2);

    daemon.stop().await;
}

#[tokio::test]
async fn idempotent_create_and_write() {
    let daemon = TestDaemon::start().await;
    let mut conn = daemon.connect().await;
    let mut watcher = daemon.connect().await;
    watcher.watch("/twice", "t").await;

    conn.ok(Op::Mkdir, 0, b"/twice").await;
    watcher.expect_event("/twice", "t").await;

    // Second mkdir: silent. Both writes of the same value: both fire.
    conn.ok(Op::Mkdir, 0, b"/twice").await;
    conn.ok(Op::Write, 0, b"/twice\0same").await;
    watcher.expect_event("/twice", "t").await;
    conn.ok(Op::Write, 0, b"/twice\0same").await;
    watcher.expect_event("/twice", "t").await;

    let resp = conn.request(Op::Read, 0, b"/twice").await;
    assert_eq!(resp.body, b"same");

    daemon.stop().await;
}

#[tokio::test]
async fn perms_survive_a_roundtrip_exactly() {
    let daemon = TestDaemon::start().await;
    let mut conn = daemon.connect().await;

    conn.ok(Op::Mkdir, 0, b"/node").await;
    conn.ok(Op::SetPerms, 0, b"/node\0w9\0r1\0n2\0").await;

    let resp = conn.request(Op::GetPerms, 0, b"/node").await;
    assert_eq!(resp.body, b"w9\0r1\0n2\0");

    daemon.stop().await;
}

#[tokio::test]
async fn connection_teardown_releases_watches() {
    let daemon = TestDaemon::start().await;
    let mut doomed = daemon.connect().await;
    let mut survivor = daemon.connect().await;

    doomed.watch("/shared", "doomed").await;
    survivor.watch("/shared", "survivor").await;

    drop(doomed);
    // Give the daemon a beat to drain the dead client.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let mut writer = daemon.connect().await;
    writer.ok(Op::Write, 0, b"/shared\0v").await;
    survivor.expect_event("/shared", "survivor").await;

    daemon.stop().await;
}

#[tokio::test]
async fn watch_frames_use_frame_constants() {
    // The watch event layout is part of the wire contract.
    let frame = Frame::watch_event("/p", "t");
    assert_eq!(frame.header.ty, 15);
    assert_eq!(frame.header.len as usize, frame.body.len());
}
