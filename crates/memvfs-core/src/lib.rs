// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! memvfs core: an in-memory, POSIX-flavored filesystem
//!
//! The whole tree, its metadata and file contents live in memory behind a
//! [`Vfs`] instance. Operations mirror the classic syscalls (open, read,
//! write, link, rename, chmod, ...) and fail with the errno a real kernel
//! would report, tagged with the syscall name and the path(s) involved.
//!
//! ```
//! use memvfs_core::{Identity, OpenFlags, Vfs, VfsConfig};
//!
//! let vfs = Vfs::new(VfsConfig::default().with_identity(Identity::new(1000, 1000)));
//! let fd = vfs.open("/greeting", OpenFlags::parse("w+")?, 0o644)?;
//! vfs.write(fd, b"hello", 0, 5, None)?;
//! vfs.close(fd)?;
//! assert_eq!(vfs.read_file("/greeting")?, b"hello");
//! # Ok::<(), memvfs_core::VfsError>(())
//! ```

pub mod builder;
pub mod clock;
pub mod config;
pub mod error;
pub mod types;
pub mod vfs;

mod descriptor;
mod io;
mod links;
mod node;
mod path;
mod permissions;
mod tree;

#[cfg(feature = "tokio")]
pub mod nonblocking;

pub use builder::VfsBuilder;
pub use clock::{Clock, SystemClock};
pub use config::{CreationDefaults, FsLimits, Identity, SecurityPolicy, VfsConfig};
pub use descriptor::FIRST_FD;
pub use error::{ErrorKind, VfsError, VfsResult};
#[cfg(feature = "tokio")]
pub use nonblocking::AsyncVfs;
pub use types::{AccessMode, Fd, FileTimes, FileType, OpenFlags, Stats, F_OK, R_OK, W_OK, X_OK};
pub use vfs::Vfs;
