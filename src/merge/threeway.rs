//! Component-level three-way file merge.
//!
//! Given three file sets — `base` (a model version), `current` (the
//! filesystem state), and `other` (the incoming model version) — classify
//! every path and produce the component's merged file set plus a conflict
//! flag. Overlapping edits go through the external line merger
//! ([`super::merge_file`]); a pre-selected `ours`/`theirs` strategy picks a
//! side instead.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::merge_file::{merge_contents, MergeFileError, MergeFileOutcome};
use super::MergeStrategy;

// ---------------------------------------------------------------------------
// Per-file classification
// ---------------------------------------------------------------------------

/// How a single path was resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileMergeState {
    /// Current matches base: the other side's content is adopted.
    Unchanged,
    /// Only the current side changed (or added): kept as-is.
    CurrentChanged,
    /// Only the other side changed (or added): adopted.
    OtherChanged,
    /// Both sides changed to identical content.
    BothChangedEqual,
    /// Both sides changed; the line merge succeeded cleanly.
    MergedClean,
    /// Both sides changed with overlapping edits; contents carry diff3
    /// conflict markers.
    MergedConflict,
    /// Both sides changed; the pre-selected strategy picked a side.
    PickedByStrategy,
    /// The other side deleted the file and current left it unmodified:
    /// the file is removed.
    Removed,
    /// One side deleted while the other modified; kept with a conflict flag.
    ModifyDeleteConflict,
}

/// One path in a component merge result. `contents: None` means the file is
/// deleted from the working copy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergedFile {
    /// Workspace-relative path.
    pub path: String,
    /// New contents, or `None` for a deletion.
    pub contents: Option<String>,
    /// How this path was resolved.
    pub state: FileMergeState,
}

impl MergedFile {
    /// Returns `true` when this path carries an unresolved conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(
            self.state,
            FileMergeState::MergedConflict | FileMergeState::ModifyDeleteConflict
        )
    }
}

/// The merged file set of one component.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilesMergeResult {
    /// Per-path outcomes, sorted by path.
    pub files: Vec<MergedFile>,
    /// Set when any path carries an unresolved conflict.
    pub has_conflicts: bool,
}

impl FilesMergeResult {
    /// Paths still carrying conflicts, for reporting.
    #[must_use]
    pub fn conflict_paths(&self) -> Vec<&str> {
        self.files
            .iter()
            .filter(|f| f.is_conflict())
            .map(|f| f.path.as_str())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// merge_files
// ---------------------------------------------------------------------------

/// Three-way merge the file sets of one component.
///
/// `current_label`/`other_label` name the sides in conflict markers.
///
/// # Errors
/// Only on external-merger failure; conflicts are data, not errors.
pub fn merge_files(
    base: &BTreeMap<String, String>,
    current: &BTreeMap<String, String>,
    other: &BTreeMap<String, String>,
    strategy: Option<MergeStrategy>,
    current_label: &str,
    other_label: &str,
) -> Result<FilesMergeResult, MergeFileError> {
    let mut paths: BTreeSet<&String> = BTreeSet::new();
    paths.extend(base.keys());
    paths.extend(current.keys());
    paths.extend(other.keys());

    let mut files = Vec::new();
    for path in paths {
        if let Some(outcome) = merge_path(
            path,
            base.get(path),
            current.get(path),
            other.get(path),
            strategy,
            current_label,
            other_label,
        )? {
            files.push(outcome);
        }
    }

    let has_conflicts = files.iter().any(MergedFile::is_conflict);
    Ok(FilesMergeResult {
        files,
        has_conflicts,
    })
}

#[allow(clippy::too_many_arguments)]
fn merge_path(
    path: &str,
    base: Option<&String>,
    current: Option<&String>,
    other: Option<&String>,
    strategy: Option<MergeStrategy>,
    current_label: &str,
    other_label: &str,
) -> Result<Option<MergedFile>, MergeFileError> {
    let keep = |contents: &String, state| {
        Some(MergedFile {
            path: path.to_owned(),
            contents: Some(contents.clone()),
            state,
        })
    };
    let removed = Some(MergedFile {
        path: path.to_owned(),
        contents: None,
        state: FileMergeState::Removed,
    });

    let merged = match (base, current, other) {
        (_, None, None) => None,

        // Present on both sides.
        (Some(b), Some(c), Some(o)) => {
            if c == b && o == b {
                keep(o, FileMergeState::Unchanged)
            } else if c == b {
                keep(o, FileMergeState::OtherChanged)
            } else if o == b {
                keep(c, FileMergeState::CurrentChanged)
            } else if c == o {
                keep(c, FileMergeState::BothChangedEqual)
            } else {
                return both_changed(path, b, c, o, strategy, current_label, other_label)
                    .map(Some);
            }
        }
        // Added on both sides, no base.
        (None, Some(c), Some(o)) => {
            if c == o {
                keep(c, FileMergeState::BothChangedEqual)
            } else {
                return both_changed(path, "", c, o, strategy, current_label, other_label)
                    .map(Some);
            }
        }

        // Present only in the working copy.
        (None, Some(c), None) => keep(c, FileMergeState::CurrentChanged),
        (Some(b), Some(c), None) => {
            if c == b {
                removed
            } else {
                match strategy {
                    Some(MergeStrategy::Theirs) => Some(MergedFile {
                        path: path.to_owned(),
                        contents: None,
                        state: FileMergeState::PickedByStrategy,
                    }),
                    Some(MergeStrategy::Ours) => keep(c, FileMergeState::PickedByStrategy),
                    _ => Some(MergedFile {
                        path: path.to_owned(),
                        contents: Some(c.clone()),
                        state: FileMergeState::ModifyDeleteConflict,
                    }),
                }
            }
        }

        // Present only on the incoming side.
        (None, None, Some(o)) => keep(o, FileMergeState::OtherChanged),
        (Some(b), None, Some(o)) => {
            if o == b {
                // Current deleted the file and the other side left it
                // untouched: the deletion stands.
                None
            } else {
                match strategy {
                    Some(MergeStrategy::Ours) => None,
                    Some(MergeStrategy::Theirs) => keep(o, FileMergeState::PickedByStrategy),
                    _ => Some(MergedFile {
                        path: path.to_owned(),
                        contents: Some(o.clone()),
                        state: FileMergeState::ModifyDeleteConflict,
                    }),
                }
            }
        }
    };
    Ok(merged)
}

fn both_changed(
    path: &str,
    base: &str,
    current: &str,
    other: &str,
    strategy: Option<MergeStrategy>,
    current_label: &str,
    other_label: &str,
) -> Result<MergedFile, MergeFileError> {
    match strategy {
        Some(MergeStrategy::Ours) => Ok(MergedFile {
            path: path.to_owned(),
            contents: Some(current.to_owned()),
            state: FileMergeState::PickedByStrategy,
        }),
        Some(MergeStrategy::Theirs) => Ok(MergedFile {
            path: path.to_owned(),
            contents: Some(other.to_owned()),
            state: FileMergeState::PickedByStrategy,
        }),
        Some(MergeStrategy::Manual) | None => {
            match merge_contents(base, current, other, current_label, other_label)? {
                MergeFileOutcome::Clean(text) => Ok(MergedFile {
                    path: path.to_owned(),
                    contents: Some(text),
                    state: FileMergeState::MergedClean,
                }),
                MergeFileOutcome::Conflict { output } => Ok(MergedFile {
                    path: path.to_owned(),
                    contents: Some(output),
                    state: FileMergeState::MergedConflict,
                }),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
