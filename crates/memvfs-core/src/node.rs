// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Filesystem nodes

use std::collections::HashMap;

use crate::types::{FileTimes, FileType, NodeId, Stats};

const BLOCK_SIZE: u64 = 4096;

/// Kind-dependent node content
#[derive(Clone, Debug)]
pub(crate) enum NodeKind {
    File { content: Vec<u8> },
    Directory { children: HashMap<String, NodeId> },
    Symlink { target: String },
}

/// Filesystem node
#[derive(Clone, Debug)]
pub(crate) struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    pub times: FileTimes,
}

impl Node {
    pub fn new(id: NodeId, kind: NodeKind, mode: u32, uid: u32, gid: u32, now: i64) -> Self {
        Self {
            id,
            kind,
            mode: mode & 0o777,
            uid,
            gid,
            nlink: 1,
            times: FileTimes::all(now),
        }
    }

    pub fn file_type(&self) -> FileType {
        match self.kind {
            NodeKind::File { .. } => FileType::File,
            NodeKind::Directory { .. } => FileType::Directory,
            NodeKind::Symlink { .. } => FileType::Symlink,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory { .. })
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self.kind, NodeKind::Symlink { .. })
    }

    // Capability bits: any class holding the bit grants it.

    pub fn is_readable(&self) -> bool {
        self.mode & 0o444 != 0
    }

    pub fn is_writable(&self) -> bool {
        self.mode & 0o222 != 0
    }

    pub fn is_executable(&self) -> bool {
        self.mode & 0o111 != 0
    }

    pub fn children(&self) -> Option<&HashMap<String, NodeId>> {
        match &self.kind {
            NodeKind::Directory { children } => Some(children),
            _ => None,
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut HashMap<String, NodeId>> {
        match &mut self.kind {
            NodeKind::Directory { children } => Some(children),
            _ => None,
        }
    }

    pub fn content(&self) -> Option<&Vec<u8>> {
        match &self.kind {
            NodeKind::File { content } => Some(content),
            _ => None,
        }
    }

    pub fn content_mut(&mut self) -> Option<&mut Vec<u8>> {
        match &mut self.kind {
            NodeKind::File { content } => Some(content),
            _ => None,
        }
    }

    pub fn symlink_target(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Symlink { target } => Some(target),
            _ => None,
        }
    }

    pub fn size(&self) -> u64 {
        match &self.kind {
            NodeKind::File { content } => content.len() as u64,
            NodeKind::Directory { .. } => 0,
            NodeKind::Symlink { target } => target.len() as u64,
        }
    }

    /// Content changed: mtime and ctime
    pub fn touch_content(&mut self, now: i64) {
        self.times.mtime = now;
        self.times.ctime = now;
    }

    /// Metadata changed: ctime only
    pub fn touch_metadata(&mut self, now: i64) {
        self.times.ctime = now;
    }

    pub fn set_atime(&mut self, atime: i64) {
        self.times.atime = atime;
    }

    pub fn set_mode(&mut self, mode: u32, now: i64) {
        self.mode = mode & 0o777;
        self.touch_metadata(now);
    }

    pub fn set_owner(&mut self, uid: u32, gid: u32, now: i64) {
        self.uid = uid;
        self.gid = gid;
        self.touch_metadata(now);
    }

    pub fn stats(&self) -> Stats {
        let size = self.size();
        Stats {
            dev: 1,
            ino: self.id.0,
            mode: self.file_type().type_bits() | self.mode,
            nlink: self.nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            size,
            blksize: BLOCK_SIZE,
            blocks: size.div_ceil(512),
            atime: self.times.atime,
            mtime: self.times.mtime,
            ctime: self.times.ctime,
            birthtime: self.times.birthtime,
        }
    }
}
