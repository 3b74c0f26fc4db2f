// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transaction semantics across real connections.

use crate::prelude::*;
use xr_wire::Op;

#[tokio::test]
async fn first_committer_wins_across_connections() {
    let daemon = TestDaemon::start().await;
    let mut alice = daemon.connect().await;
    let mut bob = daemon.connect().await;

    let t1 = alice.txn_start().await;
    alice.ok(Op::Write, t1, b"/k\01").await;

    let t2 = bob.txn_start().await;
    bob.ok(Op::Write, t2, b"/k\02").await;

    alice.ok(Op::TransactionEnd, t1, b"T\0").await;
    bob.expect_error(Op::TransactionEnd, t2, b"T\0", "EAGAIN").await;

    let resp = alice.request(Op::Read, 0, b"/k").await;
    assert_eq!(resp.body, b"1");

    daemon.stop().await;
}

#[tokio::test]
async fn transaction_ids_are_unique_across_clients() {
    let daemon = TestDaemon::start().await;
    let mut alice = daemon.connect().await;
    let mut bob = daemon.connect().await;

    let t1 = alice.txn_start().await;
    let t2 = bob.txn_start().await;
    let t3 = alice.txn_start().await;
    assert!(t1 != t2 && t2 != t3 && t1 != t3);

    daemon.stop().await;
}

#[tokio::test]
async fn transaction_is_isolated_from_other_connections() {
    let daemon = TestDaemon::start().await;
    let mut alice = daemon.connect().await;
    let mut bob = daemon.connect().await;

    let tid = alice.txn_start().await;
    alice.ok(Op::Write, tid, b"/staged\0v").await;

    bob.expect_error(Op::Read, 0, b"/staged", "ENOENT").await;

    alice.ok(Op::TransactionEnd, tid, b"T\0").await;
    let resp = bob.request(Op::Read, 0, b"/staged").await;
    assert_eq!(resp.body, b"v");

    daemon.stop().await;
}

#[tokio::test]
async fn read_only_transaction_commits_iff_undisturbed() {
    let daemon = TestDaemon::start().await;
    let mut reader = daemon.connect().await;
    let mut writer = daemon.connect().await;

    writer.ok(Op::Write, 0, b"/cfg\0v1").await;

    // Undisturbed read-only transaction commits.
    let t1 = reader.txn_start().await;
    let resp = reader.request(Op::Read, t1, b"/cfg").await;
    assert_eq!(resp.body, b"v1");
    reader.ok(Op::TransactionEnd, t1, b"T\0").await;

    // The same dance with an interleaved external write is refused.
    let t2 = reader.txn_start().await;
    let resp = reader.request(Op::Read, t2, b"/cfg").await;
    assert_eq!(resp.body, b"v1");
    writer.ok(Op::Write, 0, b"/cfg\0v2").await;
    reader.expect_error(Op::TransactionEnd, t2, b"T\0", "EAGAIN").await;

    daemon.stop().await;
}

#[tokio::test]
async fn watches_fire_after_commit_not_before() {
    let daemon = TestDaemon::start().await;
    let mut watcher = daemon.connect().await;
    let mut writer = daemon.connect().await;

    watcher.watch("/t", "tok").await;

    let tid = writer.txn_start().await;
    writer.ok(Op::Write, tid, b"/t/a\0x").await;
    writer.ok(Op::Write, tid, b"/t/b\0y").await;

    // Nothing yet: prove it by provoking an unrelated immediate fire.
    writer.ok(Op::Write, 0, b"/t\0direct").await;
    watcher.expect_event("/t", "tok").await;

    writer.ok(Op::TransactionEnd, tid, b"T\0").await;
    watcher.expect_event("/t/a", "tok").await;
    watcher.expect_event("/t", "tok").await;
    watcher.expect_event("/t/b", "tok").await;

    daemon.stop().await;
}

#[tokio::test]
async fn aborted_transaction_fires_nothing() {
    let daemon = TestDaemon::start().await;
    let mut watcher = daemon.connect().await;
    let mut writer = daemon.connect().await;

    watcher.watch("/t", "tok").await;

    let tid = writer.txn_start().await;
    writer.ok(Op::Write, tid, b"/t/a\0x").await;
    writer.ok(Op::TransactionEnd, tid, b"F\0").await;

    // A later direct write is the first thing the watcher sees.
    writer.ok(Op::Write, 0, b"/t\0marker").await;
    watcher.expect_event("/t", "tok").await;

    writer.expect_error(Op::Read, 0, b"/t/a", "ENOENT").await;

    daemon.stop().await;
}

#[tokio::test]
async fn dead_connection_aborts_its_transactions() {
    let daemon = TestDaemon::start().await;
    let mut doomed = daemon.connect().await;
    let mut other = daemon.connect().await;

    let tid = doomed.txn_start().await;
    doomed.ok(Op::Write, tid, b"/staged\0v").await;
    drop(doomed);

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    other.expect_error(Op::Read, 0, b"/staged", "ENOENT").await;

    daemon.stop().await;
}
