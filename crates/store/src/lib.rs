// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! xr-store: the transactional tree store and watch manager.
//!
//! [`Store`] holds the committed tree and per-transaction working copies;
//! [`WatchManager`] owns path subscriptions and their fire queues;
//! [`Registry`] couples the two so every mutation produces the right fires.

mod node;
mod registry;
mod store;
mod watch;

pub use node::Node;
pub use registry::Registry;
pub use store::Store;
pub use watch::{WatchFire, WatchManager};
