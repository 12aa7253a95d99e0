// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Path normalization

use std::fmt;
use std::path::Path;

/// Absolute, lexically normalized path as a list of non-empty segments
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub(crate) struct VPath {
    segments: Vec<String>,
}

/// Split on separators, dropping empty and `.` segments. `..` is kept.
pub(crate) fn split_segments(raw: &str) -> impl Iterator<Item = &str> {
    raw.split('/').filter(|s| !s.is_empty() && *s != ".")
}

impl VPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Normalize `raw`, joining it to `cwd` when relative
    pub fn resolve(cwd: &VPath, raw: &Path) -> Self {
        let raw = raw.to_string_lossy();
        let mut path = if raw.starts_with('/') {
            Self::root()
        } else {
            cwd.clone()
        };
        path.push_str(&raw);
        path
    }

    /// Apply `raw` segment by segment; `..` pops (never past the root)
    pub fn push_str(&mut self, raw: &str) {
        for segment in split_segments(raw) {
            if segment == ".." {
                self.segments.pop();
            } else {
                self.segments.push(segment.to_string());
            }
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn parent(&self) -> Option<VPath> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Strict descendant check on whole segments
    pub fn is_descendant_of(&self, ancestor: &VPath) -> bool {
        self.segments.len() > ancestor.segments.len()
            && self.segments[..ancestor.segments.len()] == ancestor.segments[..]
    }
}

impl fmt::Display for VPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}
