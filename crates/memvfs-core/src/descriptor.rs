// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Open file descriptor table

use std::collections::HashMap;

use crate::error::ErrorKind;
use crate::types::{Fd, NodeId, OpenFlags};

/// First descriptor handed out; 0-2 are left to the standard streams
pub const FIRST_FD: u32 = 3;

/// Open file state
#[derive(Clone, Debug)]
pub(crate) struct Descriptor {
    pub node: NodeId,
    /// Path as given to open(), kept for diagnostics
    pub path: String,
    pub flags: OpenFlags,
    pub read_pos: u64,
    pub write_pos: u64,
}

impl Descriptor {
    pub fn new(node: NodeId, path: String, flags: OpenFlags) -> Self {
        Self {
            node,
            path,
            flags,
            read_pos: 0,
            write_pos: 0,
        }
    }
}

#[derive(Debug)]
pub(crate) struct DescriptorTable {
    entries: HashMap<Fd, Descriptor>,
    next: u32,
}

impl Default for DescriptorTable {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            next: FIRST_FD,
        }
    }
}

impl DescriptorTable {
    pub fn allocate(&mut self, descriptor: Descriptor) -> Fd {
        let fd = Fd(self.next);
        self.next += 1;
        self.entries.insert(fd, descriptor);
        fd
    }

    /// An open descriptor; unknown and closed ones are both EBADF
    pub fn get(&self, fd: Fd) -> Result<&Descriptor, ErrorKind> {
        self.entries.get(&fd).ok_or(ErrorKind::BadDescriptor)
    }

    pub fn get_mut(&mut self, fd: Fd) -> Result<&mut Descriptor, ErrorKind> {
        self.entries.get_mut(&fd).ok_or(ErrorKind::BadDescriptor)
    }

    /// Drop the descriptor from the table. Its number is not handed out again.
    pub fn close(&mut self, fd: Fd) -> Result<Descriptor, ErrorKind> {
        self.entries.remove(&fd).ok_or(ErrorKind::BadDescriptor)
    }

    /// Whether any open descriptor still refers to `node`
    pub fn references(&self, node: NodeId) -> bool {
        self.entries.values().any(|d| d.node == node)
    }

    pub fn open_count(&self) -> usize {
        self.entries.len()
    }
}
