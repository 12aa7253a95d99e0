// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! open/read/write/truncate/close

use std::path::Path;

use tracing::{debug, trace};

use crate::descriptor::Descriptor;
use crate::error::{ErrorKind, Tag, VfsResult};
use crate::node::{Node, NodeKind};
use crate::permissions::Guard;
use crate::types::{AccessMode, Fd, OpenFlags};
use crate::vfs::Vfs;

/// Byte used to fill the gap when a write lands past the end of a file
const FILL_BYTE: u8 = b' ';

fn to_index(value: u64) -> Result<usize, ErrorKind> {
    usize::try_from(value).map_err(|_| ErrorKind::InvalidArgument)
}

/// `offset..offset + length` must fit inside a buffer of `len` bytes
fn buffer_range(len: usize, offset: usize, length: usize) -> Result<std::ops::Range<usize>, ErrorKind> {
    match offset.checked_add(length) {
        Some(end) if end <= len => Ok(offset..end),
        _ => Err(ErrorKind::InvalidArgument),
    }
}

impl Vfs {
    /// Open `path` and return a new descriptor
    pub fn open(&self, path: impl AsRef<Path>, flags: OpenFlags, mode: u32) -> VfsResult<Fd> {
        let raw = path.as_ref();
        let display = raw.to_string_lossy();
        let now = self.now();
        let mut state = self.lock();
        let st = &mut *state;
        let vpath = st.resolve(raw);
        let guard = Guard::new(&st.identity, &st.security);

        let result = (|| {
            let found = match st.tree.lookup(&vpath, !flags.contains(OpenFlags::NO_FOLLOW)) {
                Ok(found) => Some(found.node),
                Err(ErrorKind::NotFound) => None,
                Err(kind) => return Err(kind),
            };

            let node = match found {
                None => {
                    if !flags.contains(OpenFlags::CREATE) {
                        return Err(ErrorKind::NotFound);
                    }
                    if flags.contains(OpenFlags::DIRECTORY) {
                        return Err(ErrorKind::NotADirectory);
                    }
                    let at = st.tree.create_target(&vpath)?;
                    if at != vpath && flags.contains(OpenFlags::EXCLUSIVE) {
                        return Err(ErrorKind::AlreadyExists);
                    }
                    let kind = NodeKind::File {
                        content: Vec::new(),
                    };
                    st.tree.create(&at, kind, mode, &guard, now)?
                }
                Some(id) => {
                    let node = st.tree.node_mut(id)?;
                    if flags.contains(OpenFlags::CREATE | OpenFlags::EXCLUSIVE) {
                        return Err(ErrorKind::AlreadyExists);
                    }
                    if node.is_dir() && flags.is_writable() {
                        return Err(ErrorKind::IsADirectory);
                    }
                    if flags.contains(OpenFlags::DIRECTORY) && !node.is_dir() {
                        return Err(ErrorKind::NotADirectory);
                    }
                    if flags.contains(OpenFlags::NO_FOLLOW) && node.is_symlink() {
                        return Err(ErrorKind::Loop);
                    }
                    let mut want = AccessMode::empty();
                    if flags.is_readable() {
                        want |= AccessMode::READ;
                    }
                    if flags.is_writable() {
                        want |= AccessMode::WRITE;
                    }
                    guard.check_access(node, want)?;
                    if flags.contains(OpenFlags::TRUNCATE) {
                        if let Some(content) = node.content_mut() {
                            content.clear();
                            node.touch_content(now);
                        }
                    }
                    id
                }
            };

            let mut descriptor = Descriptor::new(node, display.to_string(), flags);
            if flags.contains(OpenFlags::APPEND) {
                descriptor.write_pos = st.tree.node(node)?.size();
            }
            Ok(st.descriptors.allocate(descriptor))
        })();

        let fd = result.tag("open", &display)?;
        debug!(path = %vpath, fd = fd.0, ?flags, "open");
        Ok(fd)
    }

    /// Open with fopen-style shorthand such as `"r"`, `"w+"` or `"ax"`
    pub fn open_str(&self, path: impl AsRef<Path>, flags: &str, mode: u32) -> VfsResult<Fd> {
        self.open(path, OpenFlags::parse(flags)?, mode)
    }

    /// Read up to `length` bytes into `buffer[offset..]`.
    ///
    /// With `position` the read is positional and leaves the descriptor's read
    /// cursor alone; without it the cursor is used and advanced.
    pub fn read(
        &self,
        fd: Fd,
        buffer: &mut [u8],
        offset: usize,
        length: usize,
        position: Option<u64>,
    ) -> VfsResult<usize> {
        let now = self.now();
        let mut state = self.lock();
        let st = &mut *state;
        let result = (|| {
            let descriptor = st.descriptors.get_mut(fd)?;
            if !descriptor.flags.is_readable() {
                return Err(ErrorKind::BadDescriptor);
            }
            let target = buffer_range(buffer.len(), offset, length)?;
            let node = st.tree.node_mut(descriptor.node)?;
            if node.is_dir() {
                return Err(ErrorKind::IsADirectory);
            }
            let content = node.content().ok_or(ErrorKind::InvalidArgument)?;
            let start = to_index(position.unwrap_or(descriptor.read_pos))?.min(content.len());
            let count = length.min(content.len() - start);
            buffer[target.start..target.start + count].copy_from_slice(&content[start..start + count]);
            node.set_atime(now);
            if position.is_none() {
                descriptor.read_pos += count as u64;
            }
            Ok(count)
        })();
        let count = result.call("read")?;
        trace!(fd = fd.0, count, "read");
        Ok(count)
    }

    /// Write `buffer[offset..offset + length]`.
    ///
    /// Appending descriptors always write at the end. A write past the end
    /// fills the gap with spaces.
    pub fn write(
        &self,
        fd: Fd,
        buffer: &[u8],
        offset: usize,
        length: usize,
        position: Option<u64>,
    ) -> VfsResult<usize> {
        let now = self.now();
        let mut state = self.lock();
        let st = &mut *state;
        let max_size = st.limits.max_file_size;
        let result = (|| {
            let descriptor = st.descriptors.get_mut(fd)?;
            if !descriptor.flags.is_writable() {
                return Err(ErrorKind::BadDescriptor);
            }
            let source = buffer_range(buffer.len(), offset, length)?;
            if length == 0 {
                return Ok(0);
            }
            let node = st.tree.node_mut(descriptor.node)?;
            let content = node.content_mut().ok_or(ErrorKind::IsADirectory)?;
            let start = if descriptor.flags.contains(OpenFlags::APPEND) {
                content.len()
            } else {
                to_index(position.unwrap_or(descriptor.write_pos))?
            };
            let end = start.checked_add(length).ok_or(ErrorKind::FileTooLarge)?;
            if end as u64 > max_size {
                return Err(ErrorKind::FileTooLarge);
            }
            if content.len() < start {
                content.resize(start, FILL_BYTE);
            }
            if content.len() < end {
                content.resize(end, 0);
            }
            content[start..end].copy_from_slice(&buffer[source]);
            node.touch_content(now);
            if position.is_none() {
                descriptor.write_pos = end as u64;
            }
            Ok(length)
        })();
        let count = result.call("write")?;
        trace!(fd = fd.0, count, "write");
        Ok(count)
    }

    /// Shrink the file behind `fd` to `length` bytes; longer lengths are a no-op
    pub fn ftruncate(&self, fd: Fd, length: u64) -> VfsResult<()> {
        let now = self.now();
        let mut state = self.lock();
        let st = &mut *state;
        let result = (|| {
            let descriptor = st.descriptors.get(fd)?;
            if !descriptor.flags.is_writable() {
                return Err(ErrorKind::BadDescriptor);
            }
            let node = st.tree.node_mut(descriptor.node)?;
            shrink(node, length, now)
        })();
        result.call("ftruncate")
    }

    /// [`Vfs::ftruncate`] by path
    pub fn truncate(&self, path: impl AsRef<Path>, length: u64) -> VfsResult<()> {
        let raw = path.as_ref();
        let now = self.now();
        let mut state = self.lock();
        let st = &mut *state;
        let vpath = st.resolve(raw);
        st.with_path_node(&vpath, true, |guard, node| {
            if node.is_dir() {
                return Err(ErrorKind::IsADirectory);
            }
            guard.check_access(node, AccessMode::WRITE)?;
            shrink(node, length, now)
        })
        .tag("truncate", &raw.to_string_lossy())
    }

    pub fn close(&self, fd: Fd) -> VfsResult<()> {
        let mut state = self.lock();
        let descriptor = state.descriptors.close(fd).call("close")?;
        let node = descriptor.node;
        trace!(fd = fd.0, path = %descriptor.path, "close");
        state.release(node);
        Ok(())
    }

    /// Nothing to flush; only validates the descriptor
    pub fn fsync(&self, fd: Fd) -> VfsResult<()> {
        self.lock().descriptors.get(fd).map(|_| ()).call("fsync")
    }

    pub fn fdatasync(&self, fd: Fd) -> VfsResult<()> {
        self.lock().descriptors.get(fd).map(|_| ()).call("fdatasync")
    }

    /// Whole content of a file
    pub fn read_file(&self, path: impl AsRef<Path>) -> VfsResult<Vec<u8>> {
        let fd = self.open(path, OpenFlags::READ_ONLY, 0)?;
        let contents = self.drain(fd);
        self.close(fd)?;
        contents
    }

    fn drain(&self, fd: Fd) -> VfsResult<Vec<u8>> {
        let size = self.fstat(fd)?.size;
        let mut buffer = vec![0u8; to_index(size).call("read")?];
        let mut filled = 0;
        while filled < buffer.len() {
            let len = buffer.len() - filled;
            let count = self.read(fd, &mut buffer, filled, len, Some(filled as u64))?;
            if count == 0 {
                break;
            }
            filled += count;
        }
        buffer.truncate(filled);
        Ok(buffer)
    }

    /// Create or replace a file with `data`
    pub fn write_file(&self, path: impl AsRef<Path>, data: impl AsRef<[u8]>) -> VfsResult<()> {
        let flags = OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE_ONLY;
        self.put(path.as_ref(), data.as_ref(), flags)
    }

    /// Append `data`, creating the file when missing
    pub fn append_file(&self, path: impl AsRef<Path>, data: impl AsRef<[u8]>) -> VfsResult<()> {
        let flags = OpenFlags::CREATE | OpenFlags::APPEND | OpenFlags::WRITE_ONLY;
        self.put(path.as_ref(), data.as_ref(), flags)
    }

    fn put(&self, path: &Path, data: &[u8], flags: OpenFlags) -> VfsResult<()> {
        let mode = self.lock().defaults.file_mode;
        let fd = self.open(path, flags, mode)?;
        let written = self.write(fd, data, 0, data.len(), None);
        self.close(fd)?;
        written.map(|_| ())
    }
}

fn shrink(node: &mut Node, length: u64, now: i64) -> Result<(), ErrorKind> {
    let content = node.content_mut().ok_or(ErrorKind::IsADirectory)?;
    let length = to_index(length)?;
    if length < content.len() {
        content.truncate(length);
        node.touch_content(now);
    }
    Ok(())
}
