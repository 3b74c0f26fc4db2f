// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry error taxonomy.
//!
//! Every variant corresponds to one of the well-known wire error tokens, so
//! the protocol engine can format an ERROR frame from any registry failure
//! without translation tables.

use thiserror::Error;

/// Errors produced by store, watch, and domain operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegError {
    #[error("invalid argument")]
    Invalid,
    #[error("no such entry")]
    NotFound,
    #[error("permission denied")]
    Denied,
    #[error("transaction conflict, retry")]
    Retry,
    #[error("entry already exists")]
    Exists,
    #[error("i/o failure")]
    Io,
    #[error("resource cap exceeded")]
    NoSpace,
    #[error("operation not supported")]
    Unsupported,
    #[error("entry is a directory")]
    IsDir,
    #[error("entry is not a directory")]
    NotDir,
    #[error("out of memory")]
    NoMemory,
}

impl RegError {
    /// The wire token sent in an ERROR frame body.
    pub fn token(self) -> &'static str {
        match self {
            RegError::Invalid => "EINVAL",
            RegError::NotFound => "ENOENT",
            RegError::Denied => "EACCES",
            RegError::Retry => "EAGAIN",
            RegError::Exists => "EEXIST",
            RegError::Io => "EIO",
            RegError::NoSpace => "ENOSPC",
            RegError::Unsupported => "ENOSYS",
            RegError::IsDir => "EISDIR",
            RegError::NotDir => "ENOTDIR",
            RegError::NoMemory => "ENOMEM",
        }
    }
}
