// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Core type definitions for memvfs

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, VfsError};

/// Open file descriptor number
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fd(pub u32);

impl fmt::Display for Fd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inode number, unique within one filesystem instance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Node kind tag
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileType {
    File,
    Directory,
    Symlink,
}

impl FileType {
    /// `S_IF*` bits for this kind
    pub fn type_bits(self) -> u32 {
        match self {
            FileType::File => libc::S_IFREG as u32,
            FileType::Directory => libc::S_IFDIR as u32,
            FileType::Symlink => libc::S_IFLNK as u32,
        }
    }
}

/// Node timestamps, milliseconds since the Unix epoch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTimes {
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub birthtime: i64,
}

impl FileTimes {
    pub fn all(now: i64) -> Self {
        Self {
            atime: now,
            mtime: now,
            ctime: now,
            birthtime: now,
        }
    }
}

/// Result of stat/lstat/fstat
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub dev: u64,
    pub ino: u64,
    /// Type bits plus permission bits
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: u64,
    pub blksize: u64,
    pub blocks: u64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub birthtime: i64,
}

impl Stats {
    pub fn file_type(&self) -> FileType {
        let bits = self.mode & libc::S_IFMT as u32;
        if bits == libc::S_IFDIR as u32 {
            FileType::Directory
        } else if bits == libc::S_IFLNK as u32 {
            FileType::Symlink
        } else {
            FileType::File
        }
    }

    pub fn is_file(&self) -> bool {
        self.file_type() == FileType::File
    }

    pub fn is_dir(&self) -> bool {
        self.file_type() == FileType::Directory
    }

    pub fn is_symlink(&self) -> bool {
        self.file_type() == FileType::Symlink
    }

    /// The nine rwx permission bits
    pub fn permissions(&self) -> u32 {
        self.mode & 0o777
    }
}

bitflags! {
    /// open(2) flags. Read-only access is the empty set.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        const WRITE_ONLY = libc::O_WRONLY as u32;
        const READ_WRITE = libc::O_RDWR as u32;
        const CREATE = libc::O_CREAT as u32;
        const EXCLUSIVE = libc::O_EXCL as u32;
        const TRUNCATE = libc::O_TRUNC as u32;
        const APPEND = libc::O_APPEND as u32;
        const DIRECTORY = libc::O_DIRECTORY as u32;
        const NO_FOLLOW = libc::O_NOFOLLOW as u32;
        const SYNC = libc::O_SYNC as u32;
    }
}

impl OpenFlags {
    pub const READ_ONLY: Self = Self::empty();

    /// Flags from a raw integer, keeping unknown bits
    pub fn from_raw(raw: u32) -> Self {
        Self::from_bits_retain(raw)
    }

    pub fn is_readable(self) -> bool {
        !self.contains(Self::WRITE_ONLY) || self.contains(Self::READ_WRITE)
    }

    pub fn is_writable(self) -> bool {
        self.intersects(Self::WRITE_ONLY | Self::READ_WRITE)
    }

    /// Parse fopen-style shorthand ("r", "w+", "ax", ...)
    pub fn parse(flags: &str) -> Result<Self, VfsError> {
        let create_write = Self::CREATE | Self::WRITE_ONLY;
        let create_rw = Self::CREATE | Self::READ_WRITE;
        let parsed = match flags {
            "r" => Self::READ_ONLY,
            "rs" | "sr" => Self::SYNC,
            "r+" => Self::READ_WRITE,
            "rs+" | "sr+" => Self::READ_WRITE | Self::SYNC,
            "w" => Self::TRUNCATE | create_write,
            "wx" | "xw" => Self::TRUNCATE | create_write | Self::EXCLUSIVE,
            "w+" => Self::TRUNCATE | create_rw,
            "wx+" | "xw+" => Self::TRUNCATE | create_rw | Self::EXCLUSIVE,
            "a" => Self::APPEND | create_write,
            "ax" | "xa" => Self::APPEND | create_write | Self::EXCLUSIVE,
            "as" | "sa" => Self::APPEND | create_write | Self::SYNC,
            "a+" => Self::APPEND | create_rw,
            "ax+" | "xa+" => Self::APPEND | create_rw | Self::EXCLUSIVE,
            "as+" | "sa+" => Self::APPEND | create_rw | Self::SYNC,
            _ => {
                return Err(VfsError::new(ErrorKind::InvalidArgument, "open").with_path(flags));
            }
        };
        Ok(parsed)
    }
}

impl FromStr for OpenFlags {
    type Err = VfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// access(2) mask bits
pub const F_OK: u32 = libc::F_OK as u32;
pub const R_OK: u32 = libc::R_OK as u32;
pub const W_OK: u32 = libc::W_OK as u32;
pub const X_OK: u32 = libc::X_OK as u32;

bitflags! {
    /// Capability request checked against a node's mode
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct AccessMode: u32 {
        const READ = R_OK;
        const WRITE = W_OK;
        const EXECUTE = X_OK;
    }
}

impl AccessMode {
    /// Validate a raw access(2) mask; `F_OK` maps to the empty set
    pub fn from_mask(mask: u32) -> Result<Self, ErrorKind> {
        Self::from_bits(mask).ok_or(ErrorKind::InvalidArgument)
    }
}
