// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Async facade over [`Vfs`]
//!
//! Each call runs the synchronous operation to completion, then yields once
//! to the runtime before handing back the result, so callers observe the same
//! deferred completion as with a real asynchronous filesystem.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::VfsResult;
use crate::types::{Fd, OpenFlags, Stats};
use crate::vfs::Vfs;

/// Expands one `async fn` per listed operation, forwarding to [`Vfs`]
macro_rules! async_ops {
    ($( $(#[$meta:meta])* fn $name:ident(&self $(, $arg:ident: $ty:ty)*) -> $ret:ty; )*) => {
        impl AsyncVfs {
            $(
                $(#[$meta])*
                pub async fn $name(&self $(, $arg: $ty)*) -> $ret {
                    let result = self.inner.$name($($arg),*);
                    tokio::task::yield_now().await;
                    result
                }
            )*
        }
    };
}

#[derive(Clone, Debug)]
pub struct AsyncVfs {
    inner: Arc<Vfs>,
}

impl AsyncVfs {
    pub fn new(vfs: Vfs) -> Self {
        Self { inner: Arc::new(vfs) }
    }

    pub fn from_arc(inner: Arc<Vfs>) -> Self {
        Self { inner }
    }

    /// The synchronous filesystem underneath
    pub fn sync(&self) -> &Arc<Vfs> {
        &self.inner
    }
}

async_ops! {
    fn open(&self, path: impl AsRef<Path>, flags: OpenFlags, mode: u32) -> VfsResult<Fd>;
    fn read(&self, fd: Fd, buffer: &mut [u8], offset: usize, length: usize, position: Option<u64>) -> VfsResult<usize>;
    fn write(&self, fd: Fd, buffer: &[u8], offset: usize, length: usize, position: Option<u64>) -> VfsResult<usize>;
    fn ftruncate(&self, fd: Fd, length: u64) -> VfsResult<()>;
    fn truncate(&self, path: impl AsRef<Path>, length: u64) -> VfsResult<()>;
    fn close(&self, fd: Fd) -> VfsResult<()>;
    fn fsync(&self, fd: Fd) -> VfsResult<()>;
    fn fdatasync(&self, fd: Fd) -> VfsResult<()>;
    fn read_file(&self, path: impl AsRef<Path>) -> VfsResult<Vec<u8>>;
    fn write_file(&self, path: impl AsRef<Path>, data: impl AsRef<[u8]>) -> VfsResult<()>;
    fn append_file(&self, path: impl AsRef<Path>, data: impl AsRef<[u8]>) -> VfsResult<()>;

    fn mkdir(&self, path: impl AsRef<Path>, mode: u32) -> VfsResult<()>;
    fn mkdir_all(&self, path: impl AsRef<Path>, mode: u32) -> VfsResult<()>;
    fn rmdir(&self, path: impl AsRef<Path>) -> VfsResult<()>;
    fn readdir(&self, path: impl AsRef<Path>) -> VfsResult<Vec<String>>;

    fn stat(&self, path: impl AsRef<Path>) -> VfsResult<Stats>;
    fn lstat(&self, path: impl AsRef<Path>) -> VfsResult<Stats>;
    fn fstat(&self, fd: Fd) -> VfsResult<Stats>;
    fn exists(&self, path: impl AsRef<Path>) -> bool;
    fn access(&self, path: impl AsRef<Path>, mask: u32) -> VfsResult<()>;

    fn chmod(&self, path: impl AsRef<Path>, mode: u32) -> VfsResult<()>;
    fn lchmod(&self, path: impl AsRef<Path>, mode: u32) -> VfsResult<()>;
    fn fchmod(&self, fd: Fd, mode: u32) -> VfsResult<()>;
    fn chown(&self, path: impl AsRef<Path>, uid: u32, gid: u32) -> VfsResult<()>;
    fn lchown(&self, path: impl AsRef<Path>, uid: u32, gid: u32) -> VfsResult<()>;
    fn fchown(&self, fd: Fd, uid: u32, gid: u32) -> VfsResult<()>;
    fn utimes(&self, path: impl AsRef<Path>, atime: i64, mtime: i64) -> VfsResult<()>;
    fn lutimes(&self, path: impl AsRef<Path>, atime: i64, mtime: i64) -> VfsResult<()>;
    fn futimes(&self, fd: Fd, atime: i64, mtime: i64) -> VfsResult<()>;

    fn link(&self, src: impl AsRef<Path>, dst: impl AsRef<Path>) -> VfsResult<()>;
    fn unlink(&self, path: impl AsRef<Path>) -> VfsResult<()>;
    fn symlink(&self, target: impl AsRef<Path>, path: impl AsRef<Path>) -> VfsResult<()>;
    fn readlink(&self, path: impl AsRef<Path>) -> VfsResult<String>;
    fn rename(&self, old: impl AsRef<Path>, new: impl AsRef<Path>) -> VfsResult<()>;
    fn realpath(&self, path: impl AsRef<Path>, cache: Option<&mut HashMap<String, String>>) -> VfsResult<String>;
}
