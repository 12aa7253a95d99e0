// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Declarative fixture builder

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::{Identity, VfsConfig};
use crate::error::VfsResult;
use crate::vfs::Vfs;

#[derive(Clone, Debug)]
enum Entry {
    Dir { path: PathBuf, mode: u32 },
    File { path: PathBuf, contents: Vec<u8>, mode: Option<u32> },
    Symlink { target: PathBuf, path: PathBuf },
}

impl Entry {
    fn path(&self) -> &Path {
        match self {
            Entry::Dir { path, .. } | Entry::File { path, .. } | Entry::Symlink { path, .. } => path,
        }
    }
}

/// Builder for a pre-populated [`Vfs`].
///
/// Entries are created in the order they were added; missing parent
/// directories are created with the configured directory mode.
#[derive(Default)]
pub struct VfsBuilder {
    config: VfsConfig,
    clock: Option<Arc<dyn Clock>>,
    entries: Vec<Entry>,
}

impl VfsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: VfsConfig) -> Self {
        self.config = config;
        self
    }

    pub fn identity(mut self, identity: Identity) -> Self {
        self.config.identity = identity;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn dir(self, path: impl AsRef<Path>) -> Self {
        let mode = self.config.defaults.dir_mode;
        self.dir_with_mode(path, mode)
    }

    pub fn dir_with_mode(mut self, path: impl AsRef<Path>, mode: u32) -> Self {
        self.entries.push(Entry::Dir {
            path: path.as_ref().to_path_buf(),
            mode,
        });
        self
    }

    pub fn file(mut self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Self {
        self.entries.push(Entry::File {
            path: path.as_ref().to_path_buf(),
            contents: contents.as_ref().to_vec(),
            mode: None,
        });
        self
    }

    pub fn file_with_mode(mut self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>, mode: u32) -> Self {
        self.entries.push(Entry::File {
            path: path.as_ref().to_path_buf(),
            contents: contents.as_ref().to_vec(),
            mode: Some(mode),
        });
        self
    }

    pub fn symlink(mut self, target: impl AsRef<Path>, path: impl AsRef<Path>) -> Self {
        self.entries.push(Entry::Symlink {
            target: target.as_ref().to_path_buf(),
            path: path.as_ref().to_path_buf(),
        });
        self
    }

    pub fn build(self) -> VfsResult<Vfs> {
        let dir_mode = self.config.defaults.dir_mode;
        let vfs = match self.clock {
            Some(clock) => Vfs::with_clock(self.config, clock),
            None => Vfs::new(self.config),
        };
        for entry in self.entries {
            if let Some(parent) = entry.path().parent() {
                vfs.mkdir_all(parent, dir_mode)?;
            }
            match entry {
                Entry::Dir { path, mode } => vfs.mkdir_all(&path, mode)?,
                Entry::File { path, contents, mode } => {
                    vfs.write_file(&path, &contents)?;
                    if let Some(mode) = mode {
                        vfs.chmod(&path, mode)?;
                    }
                }
                Entry::Symlink { target, path } => vfs.symlink(&target, &path)?,
            }
        }
        Ok(vfs)
    }
}
