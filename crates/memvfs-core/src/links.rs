// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Hard links, symlinks, rename and realpath

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{ErrorKind, Tag, VfsResult};
use crate::node::NodeKind;
use crate::path::VPath;
use crate::permissions::Guard;
use crate::types::AccessMode;
use crate::vfs::Vfs;

/// Mode given to every new symlink
const SYMLINK_MODE: u32 = 0o777;

impl Vfs {
    /// Add a second directory entry `dst` for the node at `src`
    pub fn link(&self, src: impl AsRef<Path>, dst: impl AsRef<Path>) -> VfsResult<()> {
        let (src_raw, dst_raw) = (src.as_ref(), dst.as_ref());
        let now = self.now();
        let mut state = self.lock();
        let st = &mut *state;
        let (src_path, dst_path) = (st.resolve(src_raw), st.resolve(dst_raw));
        let guard = Guard::new(&st.identity, &st.security);
        let result = (|| {
            let id = st.tree.lookup(&src_path, true)?.node;
            if st.tree.node(id)?.is_dir() {
                return Err(ErrorKind::NotPermitted);
            }
            st.tree
                .insert(&dst_path, id, &guard, now)
                .map_err(|kind| match kind {
                    ErrorKind::Busy => ErrorKind::AlreadyExists,
                    other => other,
                })?;
            let node = st.tree.node_mut(id)?;
            node.nlink += 1;
            node.touch_metadata(now);
            Ok(node.nlink)
        })();
        let nlink = result.tag2("link", &src_raw.to_string_lossy(), &dst_raw.to_string_lossy())?;
        debug!(src = %src_path, dst = %dst_path, nlink, "link");
        Ok(())
    }

    /// Remove a non-directory entry. The node goes away with its last link,
    /// or at the last close when still open.
    pub fn unlink(&self, path: impl AsRef<Path>) -> VfsResult<()> {
        let raw = path.as_ref();
        let now = self.now();
        let mut state = self.lock();
        let st = &mut *state;
        let vpath = st.resolve(raw);
        let guard = Guard::new(&st.identity, &st.security);
        let result = (|| {
            if vpath.is_root() {
                return Err(ErrorKind::IsADirectory);
            }
            let found = st.tree.lookup(&vpath, false)?;
            if st.tree.node(found.node)?.is_dir() {
                return Err(ErrorKind::IsADirectory);
            }
            st.tree.remove(&vpath, &guard, now)
        })();
        let id = result.tag("unlink", &raw.to_string_lossy())?;
        st.release(id);
        debug!(path = %vpath, "unlink");
        Ok(())
    }

    /// Create a symlink at `path` pointing at `target`. The target is stored
    /// verbatim and never checked.
    pub fn symlink(&self, target: impl AsRef<Path>, path: impl AsRef<Path>) -> VfsResult<()> {
        let (target_raw, raw) = (target.as_ref(), path.as_ref());
        let now = self.now();
        let mut state = self.lock();
        let st = &mut *state;
        let vpath = st.resolve(raw);
        let guard = Guard::new(&st.identity, &st.security);
        let target = target_raw.to_string_lossy().into_owned();
        let result = (|| {
            match st.tree.lookup(&vpath, false) {
                Ok(_) => return Err(ErrorKind::AlreadyExists),
                Err(ErrorKind::NotFound) => {}
                Err(kind) => return Err(kind),
            }
            let kind = NodeKind::Symlink {
                target: target.clone(),
            };
            st.tree.create(&vpath, kind, SYMLINK_MODE, &guard, now)
        })();
        result.tag2("symlink", &target, &raw.to_string_lossy())?;
        debug!(path = %vpath, target = %target, "symlink");
        Ok(())
    }

    pub fn readlink(&self, path: impl AsRef<Path>) -> VfsResult<String> {
        let raw = path.as_ref();
        let st = self.lock();
        let vpath = st.resolve(raw);
        st.tree
            .lookup(&vpath, false)
            .and_then(|found| st.tree.node(found.node))
            .and_then(|node| node.symlink_target().map(str::to_string).ok_or(ErrorKind::InvalidArgument))
            .tag("readlink", &raw.to_string_lossy())
    }

    /// Move the entry at `old` to `new`, replacing a compatible destination
    pub fn rename(&self, old: impl AsRef<Path>, new: impl AsRef<Path>) -> VfsResult<()> {
        let (old_raw, new_raw) = (old.as_ref(), new.as_ref());
        let now = self.now();
        let mut state = self.lock();
        let st = &mut *state;
        let (old_path, new_path) = (st.resolve(old_raw), st.resolve(new_raw));
        let guard = Guard::new(&st.identity, &st.security);
        let result = (|| {
            if old_path.is_root() || new_path.is_root() {
                return Err(ErrorKind::Busy);
            }
            let found = st.tree.lookup(&old_path, false)?;
            let (src_parent, src_name) = found.parent.ok_or(ErrorKind::Busy)?;
            let src_is_dir = st.tree.node(found.node)?.is_dir();
            if src_is_dir && new_path.is_descendant_of(&old_path) {
                return Err(ErrorKind::InvalidArgument);
            }
            if src_is_dir {
                // symlinks can hide the nesting from the path text
                let dst_dir = st.tree.lookup(&new_path.parent().unwrap_or_default(), true)?;
                if dst_dir.node == found.node || dst_dir.ancestors.contains(&found.node) {
                    return Err(ErrorKind::InvalidArgument);
                }
            }

            let (dst_parent, dst_name) = st.tree.lookup_parent(&new_path)?;
            guard.check_access(st.tree.node(src_parent)?, AccessMode::WRITE)?;
            guard.check_access(st.tree.node(dst_parent)?, AccessMode::WRITE)?;

            let existing = st
                .tree
                .node(dst_parent)?
                .children()
                .and_then(|c| c.get(dst_name).copied());
            let mut replaced = None;
            if let Some(dst_id) = existing {
                if dst_id == found.node {
                    return Ok(None);
                }
                let dst = st.tree.node(dst_id)?;
                match (src_is_dir, dst.is_dir()) {
                    (false, true) => return Err(ErrorKind::IsADirectory),
                    (true, false) => return Err(ErrorKind::NotADirectory),
                    (true, true) if dst.children().is_some_and(|c| !c.is_empty()) => {
                        return Err(ErrorKind::NotEmpty)
                    }
                    _ => {}
                }
                st.tree.detach(dst_parent, dst_name, now)?;
                let dst = st.tree.node_mut(dst_id)?;
                dst.nlink = dst.nlink.saturating_sub(1);
                dst.touch_metadata(now);
                replaced = Some(dst_id);
            }

            st.tree.detach(src_parent, &src_name, now)?;
            st.tree.attach(dst_parent, dst_name, found.node, now)?;
            st.tree.node_mut(found.node)?.touch_metadata(now);
            Ok(replaced)
        })();
        let replaced = result.tag2("rename", &old_raw.to_string_lossy(), &new_raw.to_string_lossy())?;
        if let Some(id) = replaced {
            st.release(id);
        }
        debug!(old = %old_path, new = %new_path, "rename");
        Ok(())
    }

    /// Canonical absolute path of `path` with every symlink resolved.
    ///
    /// `cache` maps already-resolved prefixes to their canonical form; it is
    /// consulted before touching the tree and filled as prefixes resolve.
    pub fn realpath(
        &self,
        path: impl AsRef<Path>,
        cache: Option<&mut HashMap<String, String>>,
    ) -> VfsResult<String> {
        let raw = path.as_ref();
        let st = self.lock();
        let start = st.resolve(raw);
        let mut scratch = HashMap::new();
        let cache = cache.unwrap_or(&mut scratch);
        let max_hops = st.tree.max_symlink_depth();

        let result = (|| {
            let mut remaining: VecDeque<String> = start.segments().iter().cloned().collect();
            let mut base = VPath::root();
            let mut hops = 0u32;

            while let Some(segment) = remaining.pop_front() {
                base.push_str(&segment);
                let key = base.to_string();

                if let Some(canonical) = cache.get(&key) {
                    if *canonical == key {
                        continue;
                    }
                    hops += 1;
                    if hops > max_hops {
                        warn!(path = %start, hops, "realpath symlink depth exceeded via cache");
                        return Err(ErrorKind::Loop);
                    }
                    let mut next = VPath::resolve(&VPath::root(), Path::new(canonical));
                    for rest in remaining.drain(..) {
                        next.push_str(&rest);
                    }
                    remaining = next.segments().iter().cloned().collect();
                    base = VPath::root();
                    continue;
                }

                let found = st.tree.lookup(&base, false)?;
                let node = st.tree.node(found.node)?;
                let Some(target) = node.symlink_target() else {
                    cache.insert(key, base.to_string());
                    continue;
                };

                hops += 1;
                if hops > max_hops {
                    warn!(path = %start, hops, "realpath symlink depth exceeded");
                    return Err(ErrorKind::Loop);
                }
                let mut resolved = base.parent().unwrap_or_default();
                if target.starts_with('/') {
                    resolved = VPath::root();
                }
                resolved.push_str(target);
                cache.insert(key, resolved.to_string());

                let mut next = resolved;
                for rest in remaining.drain(..) {
                    next.push_str(&rest);
                }
                remaining = next.segments().iter().cloned().collect();
                base = VPath::root();
            }
            Ok(base.to_string())
        })();
        result.tag("realpath", &raw.to_string_lossy())
    }
}
