// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The transactional tree store.
//!
//! The committed tree maps paths to immutable `Arc<Node>` records and
//! carries a monotonic generation counter. A transaction is a working copy:
//! an Arc-shared snapshot of the tree taken at branch time, an ordered
//! override map (the write-set), and the set of paths it observed (the
//! read-set). Commit is optimistic: it fails with [`RegError::Retry`] when
//! any observed or overridden path changed after the branch generation.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::trace;
use xr_core::{path, DomId, PermissionList, RegError};

use crate::node::Node;

#[derive(Debug, Clone)]
enum Override {
    Write(Node),
    Delete,
}

#[derive(Debug)]
struct Txn {
    branch_gen: u64,
    snapshot: HashMap<String, Arc<Node>>,
    overrides: IndexMap<String, Override>,
    reads: HashSet<String>,
}

impl Txn {
    fn lookup<'a>(&'a self, path: &str) -> Option<&'a Node> {
        match self.overrides.get(path) {
            Some(Override::Write(n)) => Some(n),
            Some(Override::Delete) => None,
            None => self.snapshot.get(path).map(|a| a.as_ref()),
        }
    }

    /// Missing ancestors of `path` (shallow first) and the permissions of
    /// the nearest ancestor that does exist in this view.
    fn missing_chain(&self, path: &str) -> (Vec<String>, PermissionList) {
        let mut missing = Vec::new();
        for anc in path::ancestors(path) {
            if let Some(node) = self.lookup(anc) {
                missing.reverse();
                return (missing, node.perms.clone());
            }
            missing.push(anc.to_string());
        }
        // Unreachable in practice: the root always exists.
        missing.reverse();
        (missing, PermissionList::owned_by(0))
    }

    /// Every path at or below `root` visible in this view.
    fn subtree(&self, root: &str) -> Vec<String> {
        let mut out = BTreeSet::new();
        out.insert(root.to_string());
        for k in self.snapshot.keys() {
            if path::is_descendant(k, root) && !matches!(self.overrides.get(k), Some(Override::Delete)) {
                out.insert(k.clone());
            }
        }
        for (k, ov) in &self.overrides {
            if path::is_descendant(k, root) && matches!(ov, Override::Write(_)) {
                out.insert(k.clone());
            }
        }
        out.into_iter().collect()
    }
}

/// The store: committed tree plus live transactions.
pub struct Store {
    tree: HashMap<String, Arc<Node>>,
    generation: u64,
    /// Generation at which each path's value, existence, or permissions
    /// last changed. Entries survive deletion so negative reads conflict.
    last_change: HashMap<String, u64>,
    txns: HashMap<u32, Txn>,
    next_tid: u32,
}

impl Store {
    pub fn new() -> Self {
        let mut tree = HashMap::new();
        tree.insert("/".to_string(), Arc::new(Node::empty(PermissionList::owned_by(0))));
        Store { tree, generation: 0, last_change: HashMap::new(), txns: HashMap::new(), next_tid: 0 }
    }

    /// Current committed generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Open a new transaction against the current committed tree.
    pub fn branch(&mut self) -> u32 {
        loop {
            self.next_tid = self.next_tid.wrapping_add(1);
            if self.next_tid != 0 && !self.txns.contains_key(&self.next_tid) {
                break;
            }
        }
        let tid = self.next_tid;
        self.txns.insert(
            tid,
            Txn {
                branch_gen: self.generation,
                snapshot: self.tree.clone(),
                overrides: IndexMap::new(),
                reads: HashSet::new(),
            },
        );
        trace!(tid, generation = self.generation, "transaction branched");
        tid
    }

    pub fn read(&mut self, tid: u32, path: &str) -> Result<Vec<u8>, RegError> {
        storable(path)?;
        if tid == 0 {
            return self.tree.get(path).map(|n| n.value.clone()).ok_or(RegError::NotFound);
        }
        let txn = self.txn_mut(tid)?;
        txn.reads.insert(path.to_string());
        txn.lookup(path).map(|n| n.value.clone()).ok_or(RegError::NotFound)
    }

    /// Upsert a value, creating missing ancestors owned by `who`.
    pub fn write(&mut self, tid: u32, who: DomId, path: &str, value: &[u8]) -> Result<(), RegError> {
        storable(path)?;
        if tid == 0 {
            self.generation += 1;
            let now = self.generation;
            if let Some(cur) = self.tree.get(path) {
                if cur.value != value {
                    let mut node = (**cur).clone();
                    node.value = value.to_vec();
                    self.tree.insert(path.to_string(), Arc::new(node));
                    self.last_change.insert(path.to_string(), now);
                }
            } else {
                let (missing, base) = self.missing_chain_direct(path);
                let inherited = base.inherit(who);
                for p in missing {
                    self.tree.insert(p.clone(), Arc::new(Node::empty(inherited.clone())));
                    self.last_change.insert(p, now);
                }
                let mut node = Node::empty(inherited);
                node.value = value.to_vec();
                self.tree.insert(path.to_string(), Arc::new(node));
                self.last_change.insert(path.to_string(), now);
            }
            return Ok(());
        }
        let txn = self.txn_mut(tid)?;
        match txn.lookup(path) {
            Some(cur) => {
                let mut node = cur.clone();
                node.value = value.to_vec();
                txn.overrides.insert(path.to_string(), Override::Write(node));
            }
            None => {
                let (missing, base) = txn.missing_chain(path);
                let inherited = base.inherit(who);
                for p in missing {
                    txn.overrides.insert(p, Override::Write(Node::empty(inherited.clone())));
                }
                let mut node = Node::empty(inherited);
                node.value = value.to_vec();
                txn.overrides.insert(path.to_string(), Override::Write(node));
            }
        }
        Ok(())
    }

    /// Idempotent create; returns whether the final node was newly made.
    pub fn create(&mut self, tid: u32, who: DomId, path: &str) -> Result<bool, RegError> {
        storable(path)?;
        if tid == 0 {
            if self.tree.contains_key(path) {
                return Ok(false);
            }
            let (missing, base) = self.missing_chain_direct(path);
            let inherited = base.inherit(who);
            self.generation += 1;
            let now = self.generation;
            for p in missing {
                self.tree.insert(p.clone(), Arc::new(Node::empty(inherited.clone())));
                self.last_change.insert(p, now);
            }
            self.tree.insert(path.to_string(), Arc::new(Node::empty(inherited)));
            self.last_change.insert(path.to_string(), now);
            return Ok(true);
        }
        let txn = self.txn_mut(tid)?;
        if txn.lookup(path).is_some() {
            txn.reads.insert(path.to_string());
            return Ok(false);
        }
        let (missing, base) = txn.missing_chain(path);
        let inherited = base.inherit(who);
        for p in missing {
            txn.overrides.insert(p, Override::Write(Node::empty(inherited.clone())));
        }
        txn.overrides.insert(path.to_string(), Override::Write(Node::empty(inherited)));
        Ok(true)
    }

    /// Remove a path and its whole subtree in one unit.
    pub fn delete(&mut self, tid: u32, path_str: &str) -> Result<(), RegError> {
        storable(path_str)?;
        if path_str == "/" {
            return Err(RegError::Invalid);
        }
        if tid == 0 {
            if !self.tree.contains_key(path_str) {
                return Err(RegError::NotFound);
            }
            self.generation += 1;
            let now = self.generation;
            let doomed: Vec<String> = self
                .tree
                .keys()
                .filter(|k| k.as_str() == path_str || path::is_descendant(k, path_str))
                .cloned()
                .collect();
            for p in doomed {
                self.tree.remove(&p);
                self.last_change.insert(p, now);
            }
            return Ok(());
        }
        let txn = self.txn_mut(tid)?;
        if txn.lookup(path_str).is_none() {
            txn.reads.insert(path_str.to_string());
            return Err(RegError::NotFound);
        }
        for p in txn.subtree(path_str) {
            txn.overrides.insert(p, Override::Delete);
        }
        Ok(())
    }

    /// Immediate children of a path, sorted.
    pub fn children(&mut self, tid: u32, path_str: &str) -> Result<Vec<String>, RegError> {
        storable(path_str)?;
        if tid == 0 {
            if !self.tree.contains_key(path_str) {
                return Err(RegError::NotFound);
            }
            let set: BTreeSet<String> = self
                .tree
                .keys()
                .filter(|k| path::parent(k) == Some(path_str))
                .map(|k| path::basename(k).to_string())
                .collect();
            return Ok(set.into_iter().collect());
        }
        let txn = self.txn_mut(tid)?;
        txn.reads.insert(path_str.to_string());
        if txn.lookup(path_str).is_none() {
            return Err(RegError::NotFound);
        }
        let mut set = BTreeSet::new();
        for k in txn.snapshot.keys() {
            if path::parent(k) == Some(path_str)
                && !matches!(txn.overrides.get(k), Some(Override::Delete))
            {
                set.insert(path::basename(k).to_string());
            }
        }
        for (k, ov) in &txn.overrides {
            if path::parent(k) == Some(path_str) && matches!(ov, Override::Write(_)) {
                set.insert(path::basename(k).to_string());
            }
        }
        Ok(set.into_iter().collect())
    }

    pub fn get_perms(&mut self, tid: u32, path: &str) -> Result<PermissionList, RegError> {
        storable(path)?;
        if tid == 0 {
            return self.tree.get(path).map(|n| n.perms.clone()).ok_or(RegError::NotFound);
        }
        let txn = self.txn_mut(tid)?;
        txn.reads.insert(path.to_string());
        txn.lookup(path).map(|n| n.perms.clone()).ok_or(RegError::NotFound)
    }

    pub fn set_perms(
        &mut self,
        tid: u32,
        path: &str,
        perms: PermissionList,
    ) -> Result<(), RegError> {
        storable(path)?;
        if tid == 0 {
            let cur = self.tree.get(path).ok_or(RegError::NotFound)?;
            if cur.perms != perms {
                let mut node = (**cur).clone();
                node.perms = perms;
                self.generation += 1;
                self.tree.insert(path.to_string(), Arc::new(node));
                self.last_change.insert(path.to_string(), self.generation);
            }
            return Ok(());
        }
        let txn = self.txn_mut(tid)?;
        let cur = txn.lookup(path).ok_or(RegError::NotFound)?;
        let mut node = cur.clone();
        node.perms = perms;
        txn.overrides.insert(path.to_string(), Override::Write(node));
        Ok(())
    }

    /// Permissions of a node without recording a read; `None` if absent.
    pub fn peek_perms(&self, tid: u32, path: &str) -> Option<PermissionList> {
        if tid == 0 {
            return self.tree.get(path).map(|n| n.perms.clone());
        }
        self.txns.get(&tid).and_then(|t| t.lookup(path)).map(|n| n.perms.clone())
    }

    /// Permissions governing access to `path`: the node's own if it exists,
    /// otherwise those of its nearest existing ancestor (the ones a created
    /// node would inherit from).
    pub fn access_perms(&self, tid: u32, path_str: &str) -> PermissionList {
        if let Some(p) = self.peek_perms(tid, path_str) {
            return p;
        }
        for anc in path::ancestors(path_str) {
            if let Some(p) = self.peek_perms(tid, anc) {
                return p;
            }
        }
        PermissionList::owned_by(0)
    }

    /// Try to commit: one atomic generation bump on success, `Retry` when
    /// any observed path changed since branch. The transaction is gone
    /// either way.
    pub fn commit(&mut self, tid: u32) -> Result<(), RegError> {
        if tid == 0 {
            return Err(RegError::Invalid);
        }
        let txn = self.txns.remove(&tid).ok_or(RegError::Invalid)?;
        for p in txn.reads.iter().chain(txn.overrides.keys()) {
            if self.last_change.get(p).copied().unwrap_or(0) > txn.branch_gen {
                trace!(tid, path = %p, "commit refused, path changed since branch");
                return Err(RegError::Retry);
            }
        }
        self.generation += 1;
        let now = self.generation;
        for (p, ov) in txn.overrides {
            match ov {
                Override::Write(node) => {
                    let changed = self
                        .tree
                        .get(&p)
                        .map_or(true, |cur| cur.value != node.value || cur.perms != node.perms);
                    self.tree.insert(p.clone(), Arc::new(node));
                    if changed {
                        self.last_change.insert(p, now);
                    }
                }
                Override::Delete => {
                    if self.tree.remove(&p).is_some() {
                        self.last_change.insert(p.clone(), now);
                    }
                    // Subtree delete also takes nodes committed under the
                    // deleted path after our branch.
                    let strays: Vec<String> =
                        self.tree.keys().filter(|k| path::is_descendant(k, &p)).cloned().collect();
                    for k in strays {
                        self.tree.remove(&k);
                        self.last_change.insert(k, now);
                    }
                }
            }
        }
        trace!(tid, generation = now, "transaction committed");
        Ok(())
    }

    /// Discard a transaction without touching the committed tree.
    pub fn abort(&mut self, tid: u32) -> Result<(), RegError> {
        self.txns.remove(&tid).map(|_| ()).ok_or(RegError::Invalid)
    }

    fn txn_mut(&mut self, tid: u32) -> Result<&mut Txn, RegError> {
        self.txns.get_mut(&tid).ok_or(RegError::Invalid)
    }

    fn missing_chain_direct(&self, path_str: &str) -> (Vec<String>, PermissionList) {
        let mut missing = Vec::new();
        for anc in path::ancestors(path_str) {
            if let Some(node) = self.tree.get(anc) {
                missing.reverse();
                return (missing, node.perms.clone());
            }
            missing.push(anc.to_string());
        }
        missing.reverse();
        (missing, PermissionList::owned_by(0))
    }
}

impl Default for Store {
    fn default() -> Self {
        Store::new()
    }
}

fn storable(path_str: &str) -> Result<(), RegError> {
    path::validate(path_str)?;
    if path::is_special(path_str) {
        return Err(RegError::Invalid);
    }
    Ok(())
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
