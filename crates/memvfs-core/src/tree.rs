// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Node arena and path resolution
//!
//! Nodes live in an arena keyed by inode number; directories map child names
//! to inode numbers, so a hard-linked node is simply referenced from several
//! directories.

use std::collections::{HashMap, VecDeque};

use tracing::{trace, warn};

use crate::error::ErrorKind;
use crate::node::{Node, NodeKind};
use crate::path::{split_segments, VPath};
use crate::permissions::Guard;
use crate::types::{AccessMode, NodeId};

/// A resolved node and the directory entry it was reached through
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Lookup {
    pub node: NodeId,
    /// `None` for the root
    pub parent: Option<(NodeId, String)>,
    /// Directories physically above `node`, root first
    pub ancestors: Vec<NodeId>,
}

#[derive(Debug)]
pub(crate) struct Tree {
    nodes: HashMap<NodeId, Node>,
    root: NodeId,
    next_id: u64,
    max_symlink_depth: u32,
}

impl Tree {
    pub fn new(root_mode: u32, uid: u32, gid: u32, now: i64, max_symlink_depth: u32) -> Self {
        let mut tree = Self {
            nodes: HashMap::new(),
            root: NodeId(0),
            next_id: 1,
            max_symlink_depth,
        };
        tree.root = tree.alloc(
            NodeKind::Directory {
                children: HashMap::new(),
            },
            root_mode,
            uid,
            gid,
            now,
        );
        tree
    }

    pub fn alloc(&mut self, kind: NodeKind, mode: u32, uid: u32, gid: u32, now: i64) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, Node::new(id, kind, mode, uid, gid, now));
        id
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, ErrorKind> {
        self.nodes.get(&id).ok_or(ErrorKind::NotFound)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, ErrorKind> {
        self.nodes.get_mut(&id).ok_or(ErrorKind::NotFound)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn max_symlink_depth(&self) -> u32 {
        self.max_symlink_depth
    }

    /// Walk `path` from the root.
    ///
    /// Intermediate symlinks are always followed; the final one only when
    /// `follow_final` is set. Relative link targets resolve from the link's
    /// directory and `..` inside a target climbs the physical parent chain.
    pub fn lookup(&self, path: &VPath, follow_final: bool) -> Result<Lookup, ErrorKind> {
        let mut pending: VecDeque<String> = path.segments().iter().cloned().collect();
        // (directory, name) pairs leading to `current`
        let mut ancestors: Vec<(NodeId, String)> = Vec::new();
        let mut current = self.root;
        let mut hops = 0u32;

        while let Some(segment) = pending.pop_front() {
            if segment == ".." {
                if let Some((dir, _)) = ancestors.pop() {
                    current = dir;
                }
                continue;
            }

            let dir = self.node(current)?;
            let children = dir.children().ok_or(ErrorKind::NotADirectory)?;
            let child_id = *children.get(&segment).ok_or(ErrorKind::NotFound)?;
            let child = self.node(child_id)?;

            if let Some(target) = child.symlink_target() {
                if follow_final || !pending.is_empty() {
                    hops += 1;
                    if hops > self.max_symlink_depth {
                        warn!(path = %path, hops, "symlink resolution depth exceeded");
                        return Err(ErrorKind::Loop);
                    }
                    trace!(link = %segment, target, "following symlink");
                    if target.starts_with('/') {
                        ancestors.clear();
                        current = self.root;
                    }
                    for part in split_segments(target).collect::<Vec<_>>().into_iter().rev() {
                        pending.push_front(part.to_string());
                    }
                    continue;
                }
            }

            ancestors.push((current, segment));
            current = child_id;
        }

        let chain = ancestors.iter().map(|(dir, _)| *dir).collect();
        Ok(Lookup {
            node: current,
            parent: ancestors.pop(),
            ancestors: chain,
        })
    }

    /// Where creating a node at `path` lands: `path` itself, or the end of the
    /// chain of dangling symlinks it names. Link targets join lexically onto
    /// the link's parent.
    pub fn create_target(&self, path: &VPath) -> Result<VPath, ErrorKind> {
        let mut current = path.clone();
        for _ in 0..=self.max_symlink_depth {
            let found = match self.lookup(&current, false) {
                Ok(found) => found,
                Err(ErrorKind::NotFound) => return Ok(current),
                Err(kind) => return Err(kind),
            };
            let Some(target) = self.node(found.node)?.symlink_target() else {
                return Ok(current);
            };
            let mut next = if target.starts_with('/') {
                VPath::root()
            } else {
                current.parent().unwrap_or_default()
            };
            next.push_str(target);
            current = next;
        }
        warn!(path = %path, "symlink depth exceeded resolving create target");
        Err(ErrorKind::Loop)
    }

    /// Directory that holds (or would hold) the last segment of `path`
    pub fn lookup_parent<'p>(&self, path: &'p VPath) -> Result<(NodeId, &'p str), ErrorKind> {
        let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
            return Err(ErrorKind::Busy);
        };
        let found = self.lookup(&parent, true)?;
        if !self.node(found.node)?.is_dir() {
            return Err(ErrorKind::NotADirectory);
        }
        Ok((found.node, name))
    }

    /// Add `child` under the parent of `path`, which must be a writable directory
    pub fn insert(
        &mut self,
        path: &VPath,
        child: NodeId,
        guard: &Guard<'_>,
        now: i64,
    ) -> Result<(), ErrorKind> {
        let (parent, name) = self.lookup_parent(path)?;
        guard.check_access(self.node(parent)?, AccessMode::WRITE)?;
        self.attach(parent, name, child, now)
    }

    /// Allocate a fresh node and link it at `path`. Nothing is allocated when
    /// the parent check or the name check fails.
    pub fn create(
        &mut self,
        path: &VPath,
        kind: NodeKind,
        mode: u32,
        guard: &Guard<'_>,
        now: i64,
    ) -> Result<NodeId, ErrorKind> {
        let (parent, name) = self.lookup_parent(path)?;
        let dir = self.node(parent)?;
        guard.check_access(dir, AccessMode::WRITE)?;
        if dir.children().is_some_and(|c| c.contains_key(name)) {
            return Err(ErrorKind::AlreadyExists);
        }
        let owner = guard.identity();
        let id = self.alloc(kind, mode, owner.uid, owner.gid, now);
        self.attach(parent, name, id, now)?;
        trace!(path = %path, ino = id.0, "created node");
        Ok(id)
    }

    /// Drop the entry named by `path` from its writable parent and decrement the
    /// child's link count. The node itself stays in the arena; see [`Tree::reclaim`].
    pub fn remove(&mut self, path: &VPath, guard: &Guard<'_>, now: i64) -> Result<NodeId, ErrorKind> {
        let (parent, name) = self.lookup_parent(path)?;
        guard.check_access(self.node(parent)?, AccessMode::WRITE)?;
        let child = self.detach(parent, name, now)?;
        let node = self.node_mut(child)?;
        node.nlink = node.nlink.saturating_sub(1);
        node.touch_metadata(now);
        Ok(child)
    }

    pub fn attach(&mut self, parent: NodeId, name: &str, child: NodeId, now: i64) -> Result<(), ErrorKind> {
        let dir = self.node_mut(parent)?;
        let children = dir.children_mut().ok_or(ErrorKind::NotADirectory)?;
        if children.contains_key(name) {
            return Err(ErrorKind::AlreadyExists);
        }
        children.insert(name.to_string(), child);
        dir.touch_content(now);
        Ok(())
    }

    pub fn detach(&mut self, parent: NodeId, name: &str, now: i64) -> Result<NodeId, ErrorKind> {
        let dir = self.node_mut(parent)?;
        let children = dir.children_mut().ok_or(ErrorKind::NotADirectory)?;
        let child = children.remove(name).ok_or(ErrorKind::NotFound)?;
        dir.touch_content(now);
        Ok(child)
    }

    /// Free a node that no directory entry references any more.
    /// Callers make sure no open descriptor still uses it.
    pub fn reclaim(&mut self, id: NodeId) -> bool {
        if id == self.root {
            return false;
        }
        match self.nodes.get(&id) {
            Some(node) if node.nlink == 0 => {
                trace!(ino = id.0, "reclaiming node");
                self.nodes.remove(&id);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Identity, SecurityPolicy};
    use std::path::Path;

    fn p(raw: &str) -> VPath {
        VPath::resolve(&VPath::root(), Path::new(raw))
    }

    fn dir() -> NodeKind {
        NodeKind::Directory {
            children: HashMap::new(),
        }
    }

    fn file(data: &[u8]) -> NodeKind {
        NodeKind::File {
            content: data.to_vec(),
        }
    }

    fn link(target: &str) -> NodeKind {
        NodeKind::Symlink {
            target: target.to_string(),
        }
    }

    fn setup() -> (Tree, Identity, SecurityPolicy) {
        (Tree::new(0o777, 1000, 1000, 0, 8), Identity::new(1000, 1000), SecurityPolicy::default())
    }

    fn add(tree: &mut Tree, guard: &Guard<'_>, path: &str, kind: NodeKind) -> NodeId {
        let id = tree.alloc(kind, 0o777, 1000, 1000, 0);
        tree.insert(&p(path), id, guard, 0).unwrap();
        id
    }

    #[test]
    fn insert_then_resolve_round_trips() {
        let (mut tree, id, policy) = setup();
        let guard = Guard::new(&id, &policy);
        let tmp = add(&mut tree, &guard, "/tmp", dir());
        let f = add(&mut tree, &guard, "/tmp/file", file(b"x"));
        assert_eq!(tree.lookup(&p("/tmp"), true).unwrap().node, tmp);
        let found = tree.lookup(&p("/tmp/file"), true).unwrap();
        assert_eq!(found.node, f);
        assert_eq!(found.parent, Some((tmp, "file".to_string())));
    }

    #[test]
    fn missing_and_non_directory_segments() {
        let (mut tree, id, policy) = setup();
        let guard = Guard::new(&id, &policy);
        add(&mut tree, &guard, "/f", file(b""));
        assert_eq!(tree.lookup(&p("/nope"), true), Err(ErrorKind::NotFound));
        assert_eq!(tree.lookup(&p("/f/child"), true), Err(ErrorKind::NotADirectory));
    }

    #[test]
    fn follows_relative_and_absolute_links() {
        let (mut tree, id, policy) = setup();
        let guard = Guard::new(&id, &policy);
        add(&mut tree, &guard, "/a", dir());
        add(&mut tree, &guard, "/a/b", dir());
        let target = add(&mut tree, &guard, "/a/b/file", file(b"data"));
        add(&mut tree, &guard, "/a/rel", link("b/file"));
        add(&mut tree, &guard, "/abs", link("/a/b"));
        add(&mut tree, &guard, "/a/b/up", link("../rel"));

        assert_eq!(tree.lookup(&p("/a/rel"), true).unwrap().node, target);
        assert_eq!(tree.lookup(&p("/abs/file"), true).unwrap().node, target);
        assert_eq!(tree.lookup(&p("/a/b/up"), true).unwrap().node, target);
    }

    #[test]
    fn ancestors_are_physical_through_links() {
        let (mut tree, id, policy) = setup();
        let guard = Guard::new(&id, &policy);
        let a = add(&mut tree, &guard, "/a", dir());
        let sub = add(&mut tree, &guard, "/a/sub", dir());
        add(&mut tree, &guard, "/la", link("/a"));
        add(&mut tree, &guard, "/a/sub/back", link("../.."));

        let found = tree.lookup(&p("/la/sub"), true).unwrap();
        assert_eq!(found.node, sub);
        assert_eq!(found.ancestors, vec![tree.root, a]);
        assert_eq!(tree.lookup(&p("/a/sub/back"), true).unwrap().ancestors, Vec::<NodeId>::new());
    }

    #[test]
    fn create_target_follows_dangling_chain() {
        let (mut tree, id, policy) = setup();
        let guard = Guard::new(&id, &policy);
        add(&mut tree, &guard, "/d", dir());
        add(&mut tree, &guard, "/first", link("d/second"));
        add(&mut tree, &guard, "/d/second", link("../made"));
        assert_eq!(tree.create_target(&p("/first")).unwrap(), p("/made"));
        assert_eq!(tree.create_target(&p("/plain")).unwrap(), p("/plain"));

        add(&mut tree, &guard, "/x", link("/y"));
        add(&mut tree, &guard, "/y", link("/x"));
        assert_eq!(tree.create_target(&p("/x")), Err(ErrorKind::Loop));
    }

    #[test]
    fn final_symlink_kept_without_follow() {
        let (mut tree, id, policy) = setup();
        let guard = Guard::new(&id, &policy);
        let l = add(&mut tree, &guard, "/dangling", link("/nowhere"));
        assert_eq!(tree.lookup(&p("/dangling"), false).unwrap().node, l);
        assert_eq!(tree.lookup(&p("/dangling"), true), Err(ErrorKind::NotFound));
    }

    #[test]
    fn symlink_cycle_hits_depth_cap() {
        let (mut tree, id, policy) = setup();
        let guard = Guard::new(&id, &policy);
        add(&mut tree, &guard, "/x", link("/y"));
        add(&mut tree, &guard, "/y", link("/x"));
        assert_eq!(tree.lookup(&p("/x"), true), Err(ErrorKind::Loop));
        assert_eq!(tree.lookup(&p("/x/inner"), false), Err(ErrorKind::Loop));
    }

    #[test]
    fn insert_requires_writable_parent() {
        let (mut tree, id, policy) = setup();
        let guard = Guard::new(&id, &policy);
        let ro = tree.alloc(dir(), 0o555, 1000, 1000, 0);
        tree.insert(&p("/ro"), ro, &guard, 0).unwrap();
        let child = tree.alloc(file(b""), 0o644, 1000, 1000, 0);
        assert_eq!(tree.insert(&p("/ro/x"), child, &guard, 0), Err(ErrorKind::AccessDenied));
    }

    #[test]
    fn remove_decrements_links_and_reclaims() {
        let (mut tree, id, policy) = setup();
        let guard = Guard::new(&id, &policy);
        let f = add(&mut tree, &guard, "/f", file(b"abc"));
        let before = tree.len();
        let removed = tree.remove(&p("/f"), &guard, 5).unwrap();
        assert_eq!(removed, f);
        assert_eq!(tree.node(f).unwrap().nlink, 0);
        assert!(tree.reclaim(f));
        assert_eq!(tree.len(), before - 1);
        assert_eq!(tree.lookup(&p("/f"), true), Err(ErrorKind::NotFound));
    }
}
