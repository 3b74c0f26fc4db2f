// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! xenreg daemon library.
//!
//! Wires the store and watch manager to the transports: Unix socket
//! clients, shared-memory ring clients for introduced domains, and the
//! lifecycle around them. The `xrd` binary is a thin shell over
//! [`lifecycle::startup`] and [`lifecycle::Daemon::serve`].

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod client;
pub mod config;
pub mod domain;
pub mod gate;
pub mod lifecycle;
pub mod listener;
pub mod ring;

pub use client::{run_client, ClientCtx};
pub use config::Config;
pub use domain::DomainManager;
pub use gate::{DomainGate, DomainState, EventPort, LoopbackGate};
pub use lifecycle::{startup, Daemon, LifecycleError};
