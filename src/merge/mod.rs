//! Three-way merging: file-level, component-level, and workspace
//! dependency policy.
//!
//! - [`merge_file`] — the external line merger (UNIX merge(1) contract).
//! - [`threeway`] — per-component base/current/other file-set merge.
//! - [`config`] — the workspace dependency-policy merge.

pub mod config;
pub mod merge_file;
pub mod threeway;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use merge_file::{has_conflict_markers, merge_contents, MergeFileError, MergeFileOutcome};
pub use threeway::{merge_files, FileMergeState, FilesMergeResult, MergedFile};

// ---------------------------------------------------------------------------
// MergeStrategy
// ---------------------------------------------------------------------------

/// How overlapping edits are resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Keep the working-copy side.
    Ours,
    /// Take the incoming side.
    Theirs,
    /// Leave conflict markers for manual resolution.
    Manual,
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ours => write!(f, "ours"),
            Self::Theirs => write!(f, "theirs"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

impl FromStr for MergeStrategy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ours" => Ok(Self::Ours),
            "theirs" => Ok(Self::Theirs),
            "manual" => Ok(Self::Manual),
            other => Err(format!(
                "unknown merge strategy '{other}' (expected ours, theirs, or manual)"
            )),
        }
    }
}
