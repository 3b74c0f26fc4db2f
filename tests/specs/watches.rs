// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Watch delivery as observed on the wire.

use crate::prelude::*;
use xr_wire::Op;

#[tokio::test]
async fn bootstrap_sequence_for_a_directory_watch() {
    let daemon = TestDaemon::start().await;
    let mut conn = daemon.connect().await;

    conn.ok(Op::Mkdir, 0, b"/d").await;

    // Registration delivers the initial fire.
    conn.ok(Op::Watch, 0, b"/d\0tok\0").await;
    conn.expect_event("/d", "tok").await;

    // A write below delivers the written path, then the parent fan-out.
    conn.ok(Op::Write, 0, b"/d/x\0v").await;
    conn.expect_event("/d/x", "tok").await;
    conn.expect_event("/d", "tok").await;

    daemon.stop().await;
}

#[tokio::test]
async fn events_interleave_with_request_service() {
    let daemon = TestDaemon::start().await;
    let mut conn = daemon.connect().await;

    conn.watch("/busy", "tok").await;

    // Every mutation's events arrive without blocking further requests:
    // response, then the event pair, then the next response.
    for i in 0..10u8 {
        conn.ok(Op::Write, 0, format!("/busy/{}\0v", i).as_bytes()).await;
        conn.expect_event(&format!("/busy/{}", i), "tok").await;
        conn.expect_event("/busy", "tok").await;
    }

    daemon.stop().await;
}

#[tokio::test]
async fn watch_on_nonexistent_path_fires_when_it_appears() {
    let daemon = TestDaemon::start().await;
    let mut watcher = daemon.connect().await;
    let mut writer = daemon.connect().await;

    // The path does not exist yet; the initial fire still happens.
    watcher.watch("/future", "tok").await;

    writer.ok(Op::Mkdir, 0, b"/future").await;
    watcher.expect_event("/future", "tok").await;

    daemon.stop().await;
}

#[tokio::test]
async fn unwatch_stops_delivery() {
    let daemon = TestDaemon::start().await;
    let mut watcher = daemon.connect().await;
    let mut writer = daemon.connect().await;

    watcher.watch("/w", "tok").await;
    watcher.ok(Op::Unwatch, 0, b"/w\0tok\0").await;

    writer.ok(Op::Write, 0, b"/w\0v").await;

    // Provoke a fresh watch to prove no stale event was queued first.
    watcher.watch("/w2", "fresh").await;

    daemon.stop().await;
}

#[tokio::test]
async fn relative_watch_delivers_relative_paths() {
    let daemon = TestDaemon::start().await;
    let mut conn = daemon.connect().await;

    // Socket clients live under the control domain's home path.
    conn.ok(Op::Watch, 0, b"memory\0tok\0").await;
    conn.expect_event("memory", "tok").await;

    conn.ok(Op::Write, 0, b"memory/target\0512").await;
    conn.expect_event("memory/target", "tok").await;
    conn.expect_event("memory", "tok").await;

    daemon.stop().await;
}

#[tokio::test]
async fn sentinel_watch_paths_are_valid_but_not_stored() {
    let daemon = TestDaemon::start().await;
    let mut conn = daemon.connect().await;

    conn.ok(Op::Watch, 0, b"@releaseDomain\0tok\0").await;
    conn.expect_event("@releaseDomain", "tok").await;

    conn.expect_error(Op::Read, 0, b"@releaseDomain", "EINVAL").await;
    conn.expect_error(Op::Watch, 0, b"@unknownSentinel\0tok\0", "EINVAL").await;

    daemon.stop().await;
}
