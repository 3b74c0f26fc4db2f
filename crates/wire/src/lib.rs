// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC protocol for registry communication.
//!
//! Wire format: 16-byte header quad `(type, req_id, tx_id, len)` of
//! native-endian u32s, followed by `len` body bytes. Body fields are
//! NUL-separated strings except for WRITE values, which are raw bytes.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod frame;
mod header;

pub use frame::{path_and_value, read_frame, split_fields, write_frame, Frame, WireError};
pub use header::{Header, Op, HEADER_LEN};
