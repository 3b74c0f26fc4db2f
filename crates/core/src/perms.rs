// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-node permission lists.
//!
//! A node carries a non-empty ordered list of entries. The first entry
//! names the owner and doubles as the default access for domains without
//! an entry of their own; later entries refine access per domain. The wire
//! encoding is the classic letter form: `n`/`r`/`w`/`b` + decimal domid.

use crate::error::RegError;
use crate::id::DomId;

/// One permission entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Perm {
    pub id: DomId,
    pub read: bool,
    pub write: bool,
}

impl Perm {
    /// Parse a wire field like `b0`, `r7`, `w3`, `n12`.
    pub fn parse(field: &str) -> Result<Perm, RegError> {
        let mut chars = field.chars();
        let (read, write) = match chars.next() {
            Some('n') => (false, false),
            Some('r') => (true, false),
            Some('w') => (false, true),
            Some('b') => (true, true),
            _ => return Err(RegError::Invalid),
        };
        let id = chars.as_str().parse::<DomId>().map_err(|_| RegError::Invalid)?;
        Ok(Perm { id, read, write })
    }

    /// Wire encoding of this entry.
    pub fn encode(&self) -> String {
        let letter = match (self.read, self.write) {
            (false, false) => 'n',
            (true, false) => 'r',
            (false, true) => 'w',
            (true, true) => 'b',
        };
        format!("{}{}", letter, self.id)
    }
}

/// Ordered, non-empty permission list; entry 0 is the owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionList(Vec<Perm>);

impl PermissionList {
    /// The list a freshly created node gets with no parent to inherit
    /// from: owner only, no access for other domains.
    pub fn owned_by(id: DomId) -> Self {
        PermissionList(vec![Perm { id, read: false, write: false }])
    }

    /// Build from parsed entries; the list must be non-empty.
    pub fn new(entries: Vec<Perm>) -> Result<Self, RegError> {
        if entries.is_empty() {
            return Err(RegError::Invalid);
        }
        Ok(PermissionList(entries))
    }

    /// Parse the NUL-separated wire fields of a SET_PERMS body.
    pub fn parse_fields<S: AsRef<str>>(fields: &[S]) -> Result<Self, RegError> {
        let entries =
            fields.iter().map(|f| Perm::parse(f.as_ref())).collect::<Result<Vec<_>, _>>()?;
        Self::new(entries)
    }

    /// The permissions a child created under this node receives: the
    /// parent's list with the owner slot taken by the creating domain.
    pub fn inherit(&self, owner: DomId) -> Self {
        let mut entries = self.0.clone();
        entries[0].id = owner;
        PermissionList(entries)
    }

    pub fn owner(&self) -> DomId {
        self.0[0].id
    }

    pub fn entries(&self) -> &[Perm] {
        &self.0
    }

    /// Wire fields for a GET_PERMS response, in list order.
    pub fn encode_fields(&self) -> Vec<String> {
        self.0.iter().map(Perm::encode).collect()
    }

    pub fn can_read(&self, who: DomId) -> bool {
        self.check(who, |p| p.read)
    }

    pub fn can_write(&self, who: DomId) -> bool {
        self.check(who, |p| p.write)
    }

    fn check(&self, who: DomId, bit: impl Fn(&Perm) -> bool) -> bool {
        // Domain 0 and the owner are never restricted.
        if who == 0 || who == self.owner() {
            return true;
        }
        match self.0[1..].iter().find(|p| p.id == who) {
            Some(p) => bit(p),
            None => bit(&self.0[0]),
        }
    }
}

#[cfg(test)]
#[path = "perms_tests.rs"]
mod tests;
