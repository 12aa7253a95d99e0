// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Capability and ownership checks
//!
//! Read/write/execute checks look only at whether *some* class of the mode
//! holds the bit; the caller's identity matters only for the privileged bypass.
//! Ownership mutation is identity-based.

use crate::config::{Identity, SecurityPolicy};
use crate::error::ErrorKind;
use crate::node::Node;
use crate::types::AccessMode;

#[derive(Clone, Copy, Debug)]
pub(crate) struct Guard<'a> {
    identity: &'a Identity,
    policy: &'a SecurityPolicy,
}

impl<'a> Guard<'a> {
    pub fn new(identity: &'a Identity, policy: &'a SecurityPolicy) -> Self {
        Self { identity, policy }
    }

    pub fn identity(&self) -> &Identity {
        self.identity
    }

    fn bypass(&self) -> bool {
        self.policy.root_bypass_permissions && self.identity.is_privileged()
    }

    /// EACCES unless every requested capability exists on the node
    pub fn check_access(&self, node: &Node, want: AccessMode) -> Result<(), ErrorKind> {
        if self.bypass() {
            return Ok(());
        }
        let denied = (want.contains(AccessMode::READ) && !node.is_readable())
            || (want.contains(AccessMode::WRITE) && !node.is_writable())
            || (want.contains(AccessMode::EXECUTE) && !node.is_executable());
        if denied {
            return Err(ErrorKind::AccessDenied);
        }
        Ok(())
    }

    /// chmod: owner or root
    pub fn authorize_mode_change(&self, node: &Node) -> Result<(), ErrorKind> {
        if self.identity.is_privileged() || self.identity.uid == node.uid {
            return Ok(());
        }
        Err(ErrorKind::NotPermitted)
    }

    /// chown: owner or root; a new gid must be one of the caller's groups
    pub fn authorize_owner_change(&self, node: &Node, gid: u32) -> Result<(), ErrorKind> {
        if self.identity.is_privileged() {
            return Ok(());
        }
        if self.identity.uid != node.uid {
            return Err(ErrorKind::NotPermitted);
        }
        if gid != node.gid && !self.identity.in_group(gid) {
            return Err(ErrorKind::NotPermitted);
        }
        Ok(())
    }
}
