// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Configuration types for memvfs

use serde::{Deserialize, Serialize};

/// Security identity the filesystem acts as (uid, primary gid, supplementary groups)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: u32,
    pub gid: u32,
    #[serde(default)]
    pub groups: Vec<u32>,
}

impl Identity {
    pub fn new(uid: u32, gid: u32) -> Self {
        Self {
            uid,
            gid,
            groups: Vec::new(),
        }
    }

    pub fn with_groups(mut self, groups: impl IntoIterator<Item = u32>) -> Self {
        self.groups = groups.into_iter().collect();
        self
    }

    /// The superuser
    pub fn root() -> Self {
        Self::new(0, 0)
    }

    /// Real uid/gid of the running process
    pub fn current() -> Self {
        // SAFETY: getuid/getgid are always successful and have no preconditions
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        Self::new(uid as u32, gid as u32)
    }

    pub fn is_privileged(&self) -> bool {
        self.uid == 0
    }

    /// Primary group or any supplementary group
    pub fn in_group(&self, gid: u32) -> bool {
        self.gid == gid || self.groups.contains(&gid)
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::current()
    }
}

/// Permission policy
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityPolicy {
    /// uid 0 skips capability checks in access/open/insert
    pub root_bypass_permissions: bool,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            root_bypass_permissions: true,
        }
    }
}

/// Resource limits
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsLimits {
    /// Symlinks followed by a single lookup before ELOOP
    pub max_symlink_depth: u32,
    /// Largest file content in bytes; writes ending past it fail with EFBIG
    pub max_file_size: u64,
}

impl Default for FsLimits {
    fn default() -> Self {
        Self {
            max_symlink_depth: 40,
            max_file_size: 1 << 31,
        }
    }
}

/// Modes applied when the caller does not pass one
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreationDefaults {
    pub file_mode: u32,
    pub dir_mode: u32,
}

impl Default for CreationDefaults {
    fn default() -> Self {
        Self {
            file_mode: 0o666,
            dir_mode: 0o777,
        }
    }
}

/// Top-level filesystem configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VfsConfig {
    pub identity: Identity,
    pub security: SecurityPolicy,
    pub limits: FsLimits,
    pub defaults: CreationDefaults,
    /// Working directory used to absolutize relative paths
    pub cwd: String,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            identity: Identity::default(),
            security: SecurityPolicy::default(),
            limits: FsLimits::default(),
            defaults: CreationDefaults::default(),
            cwd: "/".to_string(),
        }
    }
}

impl VfsConfig {
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }
}
