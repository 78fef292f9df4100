//! File-content records: [`FileTree`] and [`Source`].
//!
//! A [`Version`](crate::model::version::Version) points at one [`FileTree`];
//! each tree entry points at one [`Source`] blob. Both are immutable and
//! content-addressed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::Ref;

// ---------------------------------------------------------------------------
// FileTree
// ---------------------------------------------------------------------------

/// One entry in a [`FileTree`]: a source ref plus file metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTreeEntry {
    /// Content address of the [`Source`] record holding the file contents.
    pub source: Ref,
    /// Whether the file carries the executable bit.
    #[serde(default, skip_serializing_if = "is_false")]
    pub executable: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// The file listing of one version: relative path → [`FileTreeEntry`].
///
/// Paths are workspace-relative, `/`-separated, sorted by the map ordering
/// so serialization is deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTree {
    /// Relative path → entry.
    pub files: BTreeMap<String, FileTreeEntry>,
}

impl FileTree {
    /// An empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry at `path`.
    pub fn insert(&mut self, path: impl Into<String>, source: Ref) {
        self.files.insert(
            path.into(),
            FileTreeEntry {
                source,
                executable: false,
            },
        );
    }

    /// Look up the entry at `path`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&FileTreeEntry> {
        self.files.get(path)
    }

    /// Iterate the relative paths in this tree, in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Number of files in the tree.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns `true` if the tree holds no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// The contents of a single file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// File contents.
    pub contents: String,
}

impl Source {
    /// Wrap `contents` in a source record.
    #[must_use]
    pub fn new(contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
