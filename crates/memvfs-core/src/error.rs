// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for memvfs
//!
//! Every public operation fails with exactly one [`VfsError`]: an [`ErrorKind`]
//! (the errno class) plus the syscall that raised it and the path(s) involved.

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};

/// Errno class of a failed operation
#[derive(thiserror::Error, Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[error("permission denied")]
    AccessDenied,
    #[error("bad file descriptor")]
    BadDescriptor,
    #[error("file already exists")]
    AlreadyExists,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("illegal operation on a directory")]
    IsADirectory,
    #[error("not a directory")]
    NotADirectory,
    #[error("no such file or directory")]
    NotFound,
    #[error("too many symbolic links encountered")]
    Loop,
    #[error("operation not permitted")]
    NotPermitted,
    #[error("directory not empty")]
    NotEmpty,
    #[error("resource busy or locked")]
    Busy,
    #[error("file too large")]
    FileTooLarge,
}

impl ErrorKind {
    /// Symbolic errno name, e.g. `"ENOENT"`
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::AccessDenied => "EACCES",
            ErrorKind::BadDescriptor => "EBADF",
            ErrorKind::AlreadyExists => "EEXIST",
            ErrorKind::InvalidArgument => "EINVAL",
            ErrorKind::IsADirectory => "EISDIR",
            ErrorKind::NotADirectory => "ENOTDIR",
            ErrorKind::NotFound => "ENOENT",
            ErrorKind::Loop => "ELOOP",
            ErrorKind::NotPermitted => "EPERM",
            ErrorKind::NotEmpty => "ENOTEMPTY",
            ErrorKind::Busy => "EBUSY",
            ErrorKind::FileTooLarge => "EFBIG",
        }
    }

    /// Numeric errno of the host platform
    pub fn errno(self) -> i32 {
        match self {
            ErrorKind::AccessDenied => libc::EACCES,
            ErrorKind::BadDescriptor => libc::EBADF,
            ErrorKind::AlreadyExists => libc::EEXIST,
            ErrorKind::InvalidArgument => libc::EINVAL,
            ErrorKind::IsADirectory => libc::EISDIR,
            ErrorKind::NotADirectory => libc::ENOTDIR,
            ErrorKind::NotFound => libc::ENOENT,
            ErrorKind::Loop => libc::ELOOP,
            ErrorKind::NotPermitted => libc::EPERM,
            ErrorKind::NotEmpty => libc::ENOTEMPTY,
            ErrorKind::Busy => libc::EBUSY,
            ErrorKind::FileTooLarge => libc::EFBIG,
        }
    }
}

/// A failed filesystem call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VfsError {
    pub kind: ErrorKind,
    pub syscall: &'static str,
    pub path: Option<String>,
    pub dest: Option<String>,
}

impl VfsError {
    pub fn new(kind: ErrorKind, syscall: &'static str) -> Self {
        Self {
            kind,
            syscall,
            path: None,
            dest: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_dest(mut self, dest: impl Into<String>) -> Self {
        self.dest = Some(dest.into());
        self
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn errno(&self) -> i32 {
        self.kind.errno()
    }
}

impl fmt::Display for VfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}, {}", self.kind.code(), self.kind, self.syscall)?;
        match (&self.path, &self.dest) {
            (Some(path), Some(dest)) => write!(f, " '{}' -> '{}'", path, dest),
            (Some(path), None) => write!(f, " '{}'", path),
            (None, _) => Ok(()),
        }
    }
}

impl std::error::Error for VfsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl From<VfsError> for io::Error {
    fn from(err: VfsError) -> Self {
        let kind = io::Error::from_raw_os_error(err.errno()).kind();
        io::Error::new(kind, err)
    }
}

pub type VfsResult<T> = Result<T, VfsError>;

/// Attach syscall/path context to an untagged [`ErrorKind`] result
pub(crate) trait Tag<T> {
    /// Descriptor calls carry no path
    fn call(self, syscall: &'static str) -> VfsResult<T>;
    fn tag(self, syscall: &'static str, path: &str) -> VfsResult<T>;
    fn tag2(self, syscall: &'static str, path: &str, dest: &str) -> VfsResult<T>;
}

impl<T> Tag<T> for Result<T, ErrorKind> {
    fn call(self, syscall: &'static str) -> VfsResult<T> {
        self.map_err(|kind| VfsError::new(kind, syscall))
    }

    fn tag(self, syscall: &'static str, path: &str) -> VfsResult<T> {
        self.map_err(|kind| VfsError::new(kind, syscall).with_path(path))
    }

    fn tag2(self, syscall: &'static str, path: &str, dest: &str) -> VfsResult<T> {
        self.map_err(|kind| VfsError::new(kind, syscall).with_path(path).with_dest(dest))
    }
}
