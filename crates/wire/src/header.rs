// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frame header and operation codes.
//!
//! The numeric values are the well-known on-the-wire constants of the
//! xenstore protocol and must never be renumbered.

/// Byte length of the header quad.
pub const HEADER_LEN: usize = 16;

/// Operation type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Op {
    Debug = 0,
    Directory = 1,
    Read = 2,
    GetPerms = 3,
    Watch = 4,
    Unwatch = 5,
    TransactionStart = 6,
    TransactionEnd = 7,
    Introduce = 8,
    Release = 9,
    GetDomainPath = 10,
    Write = 11,
    Mkdir = 12,
    Rm = 13,
    SetPerms = 14,
    WatchEvent = 15,
    Error = 16,
    IsDomainIntroduced = 17,
    Resume = 18,
    SetTarget = 19,
    Restrict = 20,
    ResetWatches = 21,
}

impl Op {
    /// Decode a raw type code; `None` for codes outside the table.
    pub fn from_raw(raw: u32) -> Option<Op> {
        Some(match raw {
            0 => Op::Debug,
            1 => Op::Directory,
            2 => Op::Read,
            3 => Op::GetPerms,
            4 => Op::Watch,
            5 => Op::Unwatch,
            6 => Op::TransactionStart,
            7 => Op::TransactionEnd,
            8 => Op::Introduce,
            9 => Op::Release,
            10 => Op::GetDomainPath,
            11 => Op::Write,
            12 => Op::Mkdir,
            13 => Op::Rm,
            14 => Op::SetPerms,
            15 => Op::WatchEvent,
            16 => Op::Error,
            17 => Op::IsDomainIntroduced,
            18 => Op::Resume,
            19 => Op::SetTarget,
            20 => Op::Restrict,
            21 => Op::ResetWatches,
            _ => return None,
        })
    }
}

/// The fixed-size frame header.
///
/// `ty` stays raw so a frame with an unknown type code still decodes and
/// can be answered with an error instead of killing the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub ty: u32,
    pub req_id: u32,
    pub tx_id: u32,
    pub len: u32,
}

impl Header {
    pub fn new(op: Op, req_id: u32, tx_id: u32, len: u32) -> Self {
        Header { ty: op as u32, req_id, tx_id, len }
    }

    pub fn op(&self) -> Option<Op> {
        Op::from_raw(self.ty)
    }

    /// Native-endian encoding, as the wire protocol mandates.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&self.ty.to_ne_bytes());
        buf[4..8].copy_from_slice(&self.req_id.to_ne_bytes());
        buf[8..12].copy_from_slice(&self.tx_id.to_ne_bytes());
        buf[12..16].copy_from_slice(&self.len.to_ne_bytes());
        buf
    }

    pub fn decode(buf: &[u8; HEADER_LEN]) -> Header {
        let word = |i: usize| {
            let mut w = [0u8; 4];
            w.copy_from_slice(&buf[i..i + 4]);
            u32::from_ne_bytes(w)
        };
        Header { ty: word(0), req_id: word(4), tx_id: word(8), len: word(12) }
    }
}

#[cfg(test)]
#[path = "header_tests.rs"]
mod tests;
