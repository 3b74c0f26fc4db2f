// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry path handling.
//!
//! Paths are slash-separated absolute keys rooted at `/`. Two sentinel
//! paths exist only as watch subscriptions and are never stored. Relative
//! paths arriving from a client are resolved against that client's domain
//! prefix before they reach the store.

use crate::error::RegError;
use crate::id::DomId;
use crate::limits::{ABS_PATH_MAX, REL_PATH_MAX};

/// Watch sentinel fired when a domain is introduced.
pub const INTRODUCE_DOMAIN: &str = "@introduceDomain";

/// Watch sentinel fired when a domain is released.
pub const RELEASE_DOMAIN: &str = "@releaseDomain";

/// The home path of a domain, without trailing slash.
pub fn domain_path(domid: DomId) -> String {
    format!("/local/domain/{}", domid)
}

/// The prefix prepended to a domain client's relative paths.
pub fn domain_prefix(domid: DomId) -> String {
    format!("/local/domain/{}/", domid)
}

/// True for the `@…` sentinel namespace.
pub fn is_special(path: &str) -> bool {
    path.starts_with('@')
}

/// Validate an absolute path or sentinel.
pub fn validate(path: &str) -> Result<(), RegError> {
    if is_special(path) {
        return match path {
            INTRODUCE_DOMAIN | RELEASE_DOMAIN => Ok(()),
            _ => Err(RegError::Invalid),
        };
    }
    if path.is_empty() || path.len() > ABS_PATH_MAX || !path.starts_with('/') {
        return Err(RegError::Invalid);
    }
    if path == "/" {
        return Ok(());
    }
    if path.ends_with('/') {
        return Err(RegError::Invalid);
    }
    for seg in path[1..].split('/') {
        if seg.is_empty() || seg == "." || seg == ".." || seg.contains('\0') {
            return Err(RegError::Invalid);
        }
    }
    Ok(())
}

/// Resolve a raw client path against a domain prefix and validate it.
///
/// Absolute paths and sentinels pass through; anything else is joined to
/// `prefix` (which always carries a trailing slash).
pub fn resolve(prefix: &str, raw: &str) -> Result<String, RegError> {
    let abs = if raw.starts_with('/') || is_special(raw) {
        raw.to_string()
    } else {
        if raw.is_empty() || raw.len() > REL_PATH_MAX {
            return Err(RegError::Invalid);
        }
        format!("{}{}", prefix, raw)
    };
    validate(&abs)?;
    Ok(abs)
}

/// Parent of a path; `None` for the root and for sentinels.
pub fn parent(path: &str) -> Option<&str> {
    if path == "/" || is_special(path) {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Proper ancestors of a path, nearest first, ending at the root.
pub fn ancestors(path: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut cur = path;
    while let Some(p) = parent(cur) {
        out.push(p);
        cur = p;
    }
    out
}

/// Final path segment. The root's basename is the empty string.
pub fn basename(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// True when `path` lies strictly below `above`.
pub fn is_descendant(path: &str, above: &str) -> bool {
    if is_special(path) || is_special(above) {
        return false;
    }
    if above == "/" {
        return path != "/";
    }
    path.len() > above.len() && path.starts_with(above) && path.as_bytes()[above.len()] == b'/'
}

#[cfg(test)]
#[path = "path_tests.rs"]
mod tests;
