// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The filesystem instance: shared state, directory and metadata operations
//!
//! File I/O lives in `io.rs` and link handling in `links.rs`; both extend
//! [`Vfs`] with further `impl` blocks over the same locked [`State`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::config::{CreationDefaults, FsLimits, Identity, SecurityPolicy, VfsConfig};
use crate::descriptor::DescriptorTable;
use crate::error::{ErrorKind, Tag, VfsResult};
use crate::node::{Node, NodeKind};
use crate::path::VPath;
use crate::permissions::Guard;
use crate::tree::Tree;
use crate::types::{AccessMode, Fd, NodeId, Stats};

/// Everything guarded by the instance mutex
#[derive(Debug)]
pub(crate) struct State {
    pub tree: Tree,
    pub descriptors: DescriptorTable,
    pub identity: Identity,
    pub security: SecurityPolicy,
    pub defaults: CreationDefaults,
    pub limits: FsLimits,
    pub cwd: VPath,
}

impl State {
    pub fn guard(&self) -> Guard<'_> {
        Guard::new(&self.identity, &self.security)
    }

    pub fn resolve(&self, raw: &Path) -> VPath {
        VPath::resolve(&self.cwd, raw)
    }

    /// Drop `node` from the arena once no entry and no open descriptor refer to it
    pub fn release(&mut self, node: NodeId) {
        if !self.descriptors.references(node) {
            self.tree.reclaim(node);
        }
    }

    /// Apply `f` to the node behind an open descriptor
    pub fn with_fd_node<T>(
        &mut self,
        fd: Fd,
        f: impl FnOnce(&Guard<'_>, &mut Node) -> Result<T, ErrorKind>,
    ) -> Result<T, ErrorKind> {
        let id = self.descriptors.get(fd)?.node;
        let guard = Guard::new(&self.identity, &self.security);
        let node = self.tree.node_mut(id)?;
        f(&guard, node)
    }

    /// Apply `f` to the node at `path`
    pub fn with_path_node<T>(
        &mut self,
        path: &VPath,
        follow: bool,
        f: impl FnOnce(&Guard<'_>, &mut Node) -> Result<T, ErrorKind>,
    ) -> Result<T, ErrorKind> {
        let id = self.tree.lookup(path, follow)?.node;
        let guard = Guard::new(&self.identity, &self.security);
        let node = self.tree.node_mut(id)?;
        f(&guard, node)
    }
}

/// In-memory filesystem
///
/// All state sits behind one mutex, so a `Vfs` can be shared through an
/// `Arc` while operations run one at a time.
pub struct Vfs {
    state: Mutex<State>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Vfs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vfs").field("state", &self.state).finish_non_exhaustive()
    }
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new(VfsConfig::default())
    }
}

impl Vfs {
    pub fn new(config: VfsConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: VfsConfig, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_millis();
        let tree = Tree::new(
            config.defaults.dir_mode,
            config.identity.uid,
            config.identity.gid,
            now,
            config.limits.max_symlink_depth,
        );
        let cwd = VPath::resolve(&VPath::root(), Path::new(&config.cwd));
        debug!(uid = config.identity.uid, gid = config.identity.gid, cwd = %cwd, "memvfs created");
        Self {
            state: Mutex::new(State {
                tree,
                descriptors: DescriptorTable::default(),
                identity: config.identity,
                security: config.security,
                defaults: config.defaults,
                limits: config.limits,
                cwd,
            }),
            clock,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    pub fn identity(&self) -> Identity {
        self.lock().identity.clone()
    }

    /// Act as a different user from now on
    pub fn set_identity(&self, identity: Identity) {
        debug!(uid = identity.uid, gid = identity.gid, "identity switched");
        self.lock().identity = identity;
    }

    pub fn cwd(&self) -> String {
        self.lock().cwd.to_string()
    }

    /// Number of live nodes, the root included
    pub fn node_count(&self) -> usize {
        self.lock().tree.len()
    }

    /// Number of descriptors not yet closed
    pub fn open_descriptors(&self) -> usize {
        self.lock().descriptors.open_count()
    }

    // Directories

    pub fn mkdir(&self, path: impl AsRef<Path>, mode: u32) -> VfsResult<()> {
        let raw = path.as_ref();
        let now = self.now();
        let mut state = self.lock();
        let st = &mut *state;
        let vpath = st.resolve(raw);
        let guard = Guard::new(&st.identity, &st.security);
        let id = st
            .tree
            .create(&vpath, new_dir(), mode, &guard, now)
            .map_err(|kind| match kind {
                ErrorKind::Busy => ErrorKind::AlreadyExists,
                other => other,
            })
            .tag("mkdir", &raw.to_string_lossy())?;
        debug!(path = %vpath, ino = id.0, mode = %format_args!("{:o}", mode), "mkdir");
        Ok(())
    }

    /// Create `path` and any missing ancestors; existing directories are fine
    pub fn mkdir_all(&self, path: impl AsRef<Path>, mode: u32) -> VfsResult<()> {
        let raw = path.as_ref();
        let now = self.now();
        let mut state = self.lock();
        let st = &mut *state;
        let vpath = st.resolve(raw);
        let guard = Guard::new(&st.identity, &st.security);
        let mut prefix = VPath::root();
        for segment in vpath.segments() {
            prefix.push_str(segment);
            match st.tree.lookup(&prefix, true) {
                Ok(found) => {
                    if !st.tree.node(found.node).tag("mkdir", &raw.to_string_lossy())?.is_dir() {
                        return Err(ErrorKind::NotADirectory).tag("mkdir", &raw.to_string_lossy());
                    }
                }
                Err(ErrorKind::NotFound) => {
                    st.tree
                        .create(&prefix, new_dir(), mode, &guard, now)
                        .tag("mkdir", &raw.to_string_lossy())?;
                    debug!(path = %prefix, "mkdir (parents)");
                }
                Err(kind) => return Err(kind).tag("mkdir", &raw.to_string_lossy()),
            }
        }
        Ok(())
    }

    pub fn rmdir(&self, path: impl AsRef<Path>) -> VfsResult<()> {
        let raw = path.as_ref();
        let now = self.now();
        let mut state = self.lock();
        let st = &mut *state;
        let vpath = st.resolve(raw);
        let result = (|| {
            if vpath.is_root() {
                return Err(ErrorKind::Busy);
            }
            let found = st.tree.lookup(&vpath, false)?;
            let children = st
                .tree
                .node(found.node)?
                .children()
                .ok_or(ErrorKind::NotADirectory)?;
            if !children.is_empty() {
                return Err(ErrorKind::NotEmpty);
            }
            let guard = Guard::new(&st.identity, &st.security);
            st.tree.remove(&vpath, &guard, now)
        })();
        let id = result.tag("rmdir", &raw.to_string_lossy())?;
        st.release(id);
        debug!(path = %vpath, "rmdir");
        Ok(())
    }

    /// Entry names of a directory, sorted
    pub fn readdir(&self, path: impl AsRef<Path>) -> VfsResult<Vec<String>> {
        let raw = path.as_ref();
        let st = self.lock();
        let vpath = st.resolve(raw);
        let result = (|| {
            let node = st.tree.node(st.tree.lookup(&vpath, true)?.node)?;
            let children = node.children().ok_or(ErrorKind::NotADirectory)?;
            st.guard().check_access(node, AccessMode::READ)?;
            let mut names: Vec<String> = children.keys().cloned().collect();
            names.sort();
            Ok(names)
        })();
        result.tag("scandir", &raw.to_string_lossy())
    }

    // Metadata

    pub fn stat(&self, path: impl AsRef<Path>) -> VfsResult<Stats> {
        self.stat_impl(path.as_ref(), true, "stat")
    }

    /// Like [`Vfs::stat`] but reports a final symlink itself
    pub fn lstat(&self, path: impl AsRef<Path>) -> VfsResult<Stats> {
        self.stat_impl(path.as_ref(), false, "lstat")
    }

    fn stat_impl(&self, raw: &Path, follow: bool, syscall: &'static str) -> VfsResult<Stats> {
        let st = self.lock();
        let vpath = st.resolve(raw);
        st.tree
            .lookup(&vpath, follow)
            .and_then(|found| st.tree.node(found.node).map(Node::stats))
            .tag(syscall, &raw.to_string_lossy())
    }

    pub fn fstat(&self, fd: Fd) -> VfsResult<Stats> {
        let st = self.lock();
        st.descriptors
            .get(fd)
            .and_then(|d| st.tree.node(d.node))
            .map(Node::stats)
            .call("fstat")
    }

    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.stat(path).is_ok()
    }

    /// access(2) against capability bits. `mask` is `F_OK` or a combination of
    /// `R_OK`, `W_OK` and `X_OK`.
    pub fn access(&self, path: impl AsRef<Path>, mask: u32) -> VfsResult<()> {
        let raw = path.as_ref();
        let st = self.lock();
        let vpath = st.resolve(raw);
        let result = (|| {
            let want = AccessMode::from_mask(mask)?;
            let node = st.tree.node(st.tree.lookup(&vpath, true)?.node)?;
            st.guard().check_access(node, want)
        })();
        result.tag("access", &raw.to_string_lossy())
    }

    // Permissions and ownership

    pub fn chmod(&self, path: impl AsRef<Path>, mode: u32) -> VfsResult<()> {
        self.chmod_impl(path.as_ref(), mode, true, "chmod")
    }

    pub fn lchmod(&self, path: impl AsRef<Path>, mode: u32) -> VfsResult<()> {
        self.chmod_impl(path.as_ref(), mode, false, "lchmod")
    }

    fn chmod_impl(&self, raw: &Path, mode: u32, follow: bool, syscall: &'static str) -> VfsResult<()> {
        let now = self.now();
        let mut state = self.lock();
        let st = &mut *state;
        let vpath = st.resolve(raw);
        st.with_path_node(&vpath, follow, |guard, node| {
            guard.authorize_mode_change(node)?;
            node.set_mode(mode, now);
            Ok(())
        })
        .tag(syscall, &raw.to_string_lossy())?;
        debug!(path = %vpath, mode = %format_args!("{:o}", mode), syscall, "mode changed");
        Ok(())
    }

    pub fn fchmod(&self, fd: Fd, mode: u32) -> VfsResult<()> {
        let now = self.now();
        self.lock()
            .with_fd_node(fd, |guard, node| {
                guard.authorize_mode_change(node)?;
                node.set_mode(mode, now);
                Ok(())
            })
            .call("fchmod")
    }

    pub fn chown(&self, path: impl AsRef<Path>, uid: u32, gid: u32) -> VfsResult<()> {
        self.chown_impl(path.as_ref(), uid, gid, true, "chown")
    }

    pub fn lchown(&self, path: impl AsRef<Path>, uid: u32, gid: u32) -> VfsResult<()> {
        self.chown_impl(path.as_ref(), uid, gid, false, "lchown")
    }

    fn chown_impl(
        &self,
        raw: &Path,
        uid: u32,
        gid: u32,
        follow: bool,
        syscall: &'static str,
    ) -> VfsResult<()> {
        let now = self.now();
        let mut state = self.lock();
        let st = &mut *state;
        let vpath = st.resolve(raw);
        st.with_path_node(&vpath, follow, |guard, node| change_owner(guard, node, uid, gid, now))
            .tag(syscall, &raw.to_string_lossy())?;
        debug!(path = %vpath, uid, gid, syscall, "owner changed");
        Ok(())
    }

    pub fn fchown(&self, fd: Fd, uid: u32, gid: u32) -> VfsResult<()> {
        let now = self.now();
        self.lock()
            .with_fd_node(fd, |guard, node| change_owner(guard, node, uid, gid, now))
            .call("fchown")
    }

    // Timestamps

    /// Set atime and mtime (milliseconds); ctime becomes now
    pub fn utimes(&self, path: impl AsRef<Path>, atime: i64, mtime: i64) -> VfsResult<()> {
        self.utimes_impl(path.as_ref(), atime, mtime, true, "utime")
    }

    pub fn lutimes(&self, path: impl AsRef<Path>, atime: i64, mtime: i64) -> VfsResult<()> {
        self.utimes_impl(path.as_ref(), atime, mtime, false, "lutime")
    }

    fn utimes_impl(
        &self,
        raw: &Path,
        atime: i64,
        mtime: i64,
        follow: bool,
        syscall: &'static str,
    ) -> VfsResult<()> {
        let now = self.now();
        let mut state = self.lock();
        let st = &mut *state;
        let vpath = st.resolve(raw);
        st.with_path_node(&vpath, follow, |_, node| {
            set_times(node, atime, mtime, now);
            Ok(())
        })
        .tag(syscall, &raw.to_string_lossy())
    }

    pub fn futimes(&self, fd: Fd, atime: i64, mtime: i64) -> VfsResult<()> {
        let now = self.now();
        self.lock()
            .with_fd_node(fd, |_, node| {
                set_times(node, atime, mtime, now);
                Ok(())
            })
            .call("futime")
    }
}

pub(crate) fn new_dir() -> NodeKind {
    NodeKind::Directory {
        children: HashMap::new(),
    }
}

fn change_owner(guard: &Guard<'_>, node: &mut Node, uid: u32, gid: u32, now: i64) -> Result<(), ErrorKind> {
    guard.authorize_owner_change(node, gid)?;
    node.set_owner(uid, gid, now);
    Ok(())
}

fn set_times(node: &mut Node, atime: i64, mtime: i64, now: i64) {
    node.times.atime = atime;
    node.times.mtime = mtime;
    node.touch_metadata(now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::error::VfsError;
    use crate::types::{OpenFlags, F_OK, R_OK, W_OK, X_OK};

    fn vfs_as(uid: u32) -> Vfs {
        Vfs::new(VfsConfig::default().with_identity(Identity::new(uid, uid)))
    }

    #[test]
    fn mkdir_and_readdir_sorted() {
        let vfs = vfs_as(1000);
        vfs.mkdir("/b", 0o755).unwrap();
        vfs.mkdir("/a", 0o755).unwrap();
        vfs.mkdir("/a/inner", 0o755).unwrap();
        assert_eq!(vfs.readdir("/").unwrap(), vec!["a", "b"]);
        assert_eq!(vfs.readdir("/a").unwrap(), vec!["inner"]);

        let err = vfs.mkdir("/a", 0o755).unwrap_err();
        assert_eq!(err.kind, ErrorKind::AlreadyExists);
        assert_eq!(err.syscall, "mkdir");
        assert_eq!(vfs.mkdir("/", 0o755).unwrap_err().kind, ErrorKind::AlreadyExists);
        assert_eq!(vfs.mkdir("/x/y", 0o755).unwrap_err().kind, ErrorKind::NotFound);
    }

    #[test]
    fn mkdir_all_creates_missing_parents() {
        let vfs = vfs_as(1000);
        vfs.mkdir_all("/one/two/three", 0o700).unwrap();
        assert!(vfs.stat("/one/two/three").unwrap().is_dir());
        vfs.mkdir_all("/one/two", 0o700).unwrap();
    }

    #[test]
    fn rmdir_rules() {
        let vfs = vfs_as(1000);
        vfs.mkdir_all("/full/child", 0o755).unwrap();
        assert_eq!(vfs.rmdir("/full").unwrap_err().kind, ErrorKind::NotEmpty);
        assert_eq!(vfs.rmdir("/").unwrap_err().kind, ErrorKind::Busy);
        let before = vfs.node_count();
        vfs.rmdir("/full/child").unwrap();
        assert_eq!(vfs.node_count(), before - 1);
        assert!(!vfs.exists("/full/child"));
    }

    #[test]
    fn readdir_requires_read_capability() {
        let vfs = vfs_as(1000);
        vfs.mkdir("/locked", 0o300).unwrap();
        let err = vfs.readdir("/locked").unwrap_err();
        assert_eq!(err.kind, ErrorKind::AccessDenied);
        assert_eq!(err.syscall, "scandir");
    }

    #[test]
    fn access_mask_and_capabilities() {
        let vfs = vfs_as(1000);
        vfs.mkdir("/d", 0o555).unwrap();
        vfs.access("/d", F_OK).unwrap();
        vfs.access("/d", R_OK | X_OK).unwrap();
        assert_eq!(vfs.access("/d", W_OK).unwrap_err().kind, ErrorKind::AccessDenied);
        assert_eq!(vfs.access("/d", 0o10).unwrap_err().kind, ErrorKind::InvalidArgument);
        assert_eq!(vfs.access("/missing", F_OK).unwrap_err().kind, ErrorKind::NotFound);
    }

    #[test]
    fn root_identity_bypasses_capabilities() {
        let vfs = vfs_as(0);
        vfs.mkdir("/d", 0o000).unwrap();
        vfs.access("/d", R_OK | W_OK | X_OK).unwrap();
        vfs.readdir("/d").unwrap();
    }

    #[test]
    fn chmod_by_non_owner_is_eperm() {
        let vfs = vfs_as(1000);
        vfs.mkdir("/mine", 0o755).unwrap();
        vfs.set_identity(Identity::new(1001, 1001));
        let err = vfs.chmod("/mine", 0o700).unwrap_err();
        assert_eq!(
            err,
            VfsError::new(ErrorKind::NotPermitted, "chmod").with_path("/mine")
        );
        vfs.set_identity(Identity::root());
        vfs.chmod("/mine", 0o700).unwrap();
        assert_eq!(vfs.stat("/mine").unwrap().permissions(), 0o700);
    }

    #[test]
    fn chown_rules() {
        let vfs = vfs_as(1000);
        vfs.set_identity(Identity::new(1000, 1000).with_groups([50]));
        vfs.mkdir("/d", 0o755).unwrap();
        vfs.chown("/d", 1000, 50).unwrap();
        assert_eq!(vfs.stat("/d").unwrap().gid, 50);
        assert_eq!(vfs.chown("/d", 1000, 60).unwrap_err().kind, ErrorKind::NotPermitted);
        // the owner may hand the node to another uid
        vfs.chown("/d", 2000, 50).unwrap();
        assert_eq!(vfs.stat("/d").unwrap().uid, 2000);
        // after which it is no longer theirs to change
        assert_eq!(vfs.chown("/d", 1000, 50).unwrap_err().kind, ErrorKind::NotPermitted);
        vfs.set_identity(Identity::root());
        vfs.chown("/d", 3000, 60).unwrap();
        let stats = vfs.stat("/d").unwrap();
        assert_eq!((stats.uid, stats.gid), (3000, 60));
    }

    #[test]
    fn l_variants_act_on_the_link_itself() {
        let vfs = vfs_as(1000);
        vfs.set_identity(Identity::new(1000, 1000).with_groups([50]));
        vfs.write_file("/target", "data").unwrap();
        vfs.chmod("/target", 0o644).unwrap();
        vfs.symlink("/target", "/link").unwrap();

        vfs.lchmod("/link", 0o700).unwrap();
        assert_eq!(vfs.lstat("/link").unwrap().permissions(), 0o700);
        assert_eq!(vfs.stat("/target").unwrap().permissions(), 0o644);
        vfs.chmod("/link", 0o600).unwrap();
        assert_eq!(vfs.stat("/target").unwrap().permissions(), 0o600);
        assert_eq!(vfs.lstat("/link").unwrap().permissions(), 0o700);

        vfs.lchown("/link", 1000, 50).unwrap();
        assert_eq!(vfs.lstat("/link").unwrap().gid, 50);
        assert_eq!(vfs.stat("/target").unwrap().gid, 1000);
        vfs.chown("/link", 1000, 50).unwrap();
        assert_eq!(vfs.stat("/target").unwrap().gid, 50);

        vfs.lutimes("/link", 11, 12).unwrap();
        let link = vfs.lstat("/link").unwrap();
        assert_eq!((link.atime, link.mtime), (11, 12));
        let target = vfs.stat("/target").unwrap();
        assert_ne!((target.atime, target.mtime), (11, 12));
        vfs.utimes("/link", 21, 22).unwrap();
        let target = vfs.stat("/target").unwrap();
        assert_eq!((target.atime, target.mtime), (21, 22));
        assert_eq!(vfs.lstat("/link").unwrap().mtime, 12);

        assert_eq!(vfs.lchmod("/missing", 0o600).unwrap_err().syscall, "lchmod");
        assert_eq!(vfs.lchown("/missing", 1, 1).unwrap_err().syscall, "lchown");
        assert_eq!(vfs.lutimes("/missing", 1, 1).unwrap_err().syscall, "lutime");
    }

    #[test]
    fn f_variants_act_on_the_open_node() {
        let vfs = vfs_as(1000);
        vfs.set_identity(Identity::new(1000, 1000).with_groups([50]));
        vfs.write_file("/f", "data").unwrap();
        let fd = vfs.open("/f", OpenFlags::READ_ONLY, 0).unwrap();

        vfs.fchmod(fd, 0o640).unwrap();
        vfs.fchown(fd, 1000, 50).unwrap();
        vfs.futimes(fd, 31, 32).unwrap();
        let stats = vfs.stat("/f").unwrap();
        assert_eq!(stats.permissions(), 0o640);
        assert_eq!(stats.gid, 50);
        assert_eq!((stats.atime, stats.mtime), (31, 32));
        assert_eq!(vfs.fstat(fd).unwrap(), stats);

        vfs.set_identity(Identity::new(1001, 1001));
        assert_eq!(vfs.fchmod(fd, 0o777).unwrap_err().kind, ErrorKind::NotPermitted);
        assert_eq!(vfs.fchown(fd, 1001, 1001).unwrap_err().kind, ErrorKind::NotPermitted);

        vfs.close(fd).unwrap();
        for err in [
            vfs.fchmod(fd, 0o600).unwrap_err(),
            vfs.fchown(fd, 1000, 1000).unwrap_err(),
            vfs.futimes(fd, 1, 1).unwrap_err(),
        ] {
            assert_eq!(err.kind, ErrorKind::BadDescriptor);
            assert_eq!(err.path, None);
        }
        assert_eq!(vfs.futimes(fd, 1, 1).unwrap_err().syscall, "futime");
    }

    #[test]
    fn timestamps_follow_the_clock() {
        let mut clock = MockClock::new();
        let mut ticks = vec![400, 300, 200, 100];
        clock.expect_now_millis().returning(move || ticks.pop().unwrap_or(999));
        let vfs = Vfs::with_clock(
            VfsConfig::default().with_identity(Identity::new(1, 1)),
            Arc::new(clock),
        );
        // 100: root, 200: mkdir
        vfs.mkdir("/d", 0o755).unwrap();
        let created = vfs.stat("/d").unwrap();
        assert_eq!((created.birthtime, created.mtime, created.ctime), (200, 200, 200));

        // 300: chmod bumps only ctime
        vfs.chmod("/d", 0o700).unwrap();
        let changed = vfs.stat("/d").unwrap();
        assert_eq!((changed.mtime, changed.ctime), (200, 300));

        // 400: utimes sets atime/mtime and bumps ctime
        vfs.utimes("/d", 5, 6).unwrap();
        let touched = vfs.stat("/d").unwrap();
        assert_eq!((touched.atime, touched.mtime, touched.ctime), (5, 6, 400));
    }

    #[test]
    fn relative_paths_use_configured_cwd() {
        let config = VfsConfig {
            cwd: "/work".to_string(),
            ..VfsConfig::default().with_identity(Identity::new(1, 1))
        };
        let vfs = Vfs::new(config);
        vfs.mkdir("/work", 0o755).unwrap();
        vfs.mkdir("sub", 0o755).unwrap();
        assert!(vfs.exists("/work/sub"));
        assert_eq!(vfs.cwd(), "/work");
    }
}
