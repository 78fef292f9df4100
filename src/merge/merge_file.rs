//! External line-level three-way merge.
//!
//! Shells out to `git merge-file -p --diff3`, which implements the UNIX
//! merge(1) contract: apply the base→other changes onto current, emitting
//! either clean merged text or diff3 conflict markers. We intentionally use
//! temp files plus git instead of a diff3 crate — the marker format and
//! merge semantics stay aligned with what users see from git itself.
//!
//! The scratch directory is a [`tempfile::TempDir`]: scoped acquisition
//! with guaranteed release on all exit paths, including errors.

use std::fmt;
use std::fs;
use std::process::Command;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from invoking the external line merger.
#[derive(Debug)]
pub enum MergeFileError {
    /// I/O while writing scratch files or spawning the merger.
    Io(std::io::Error),
    /// `git merge-file` failed unexpectedly (negative or missing exit code).
    Tool {
        /// Command line summary.
        command: String,
        /// Trimmed stderr.
        stderr: String,
        /// Exit code if available.
        exit_code: Option<i32>,
    },
}

impl fmt::Display for MergeFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error during file merge: {e}"),
            Self::Tool {
                command,
                stderr,
                exit_code,
            } => {
                write!(f, "`{command}` failed")?;
                if let Some(code) = exit_code {
                    write!(f, " (exit {code})")?;
                }
                if !stderr.is_empty() {
                    write!(f, ": {stderr}")?;
                }
                write!(f, "\n  To fix: check that git is installed and on PATH.")
            }
        }
    }
}

impl std::error::Error for MergeFileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        if let Self::Io(e) = self {
            Some(e)
        } else {
            None
        }
    }
}

impl From<std::io::Error> for MergeFileError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

// ---------------------------------------------------------------------------
// merge_contents
// ---------------------------------------------------------------------------

/// The outcome of a line-level three-way merge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeFileOutcome {
    /// The sides merged cleanly.
    Clean(String),
    /// Overlapping edits: `output` carries diff3 conflict markers.
    Conflict {
        /// The marked-up text.
        output: String,
    },
}

impl MergeFileOutcome {
    /// The merged or marked text, either way.
    #[must_use]
    pub fn into_contents(self) -> String {
        match self {
            Self::Clean(text) | Self::Conflict { output: text } => text,
        }
    }

    /// Returns `true` for the conflict outcome.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Three-way merge `current` and `other` against `base`.
///
/// `current_label` and `other_label` name the sides inside any conflict
/// markers (e.g. `1.0.1-modified` vs `1.0.0`).
///
/// # Errors
/// I/O failure, or an unexpected merger exit status. Conflicts are not
/// errors — they are the [`MergeFileOutcome::Conflict`] outcome.
pub fn merge_contents(
    base: &str,
    current: &str,
    other: &str,
    current_label: &str,
    other_label: &str,
) -> Result<MergeFileOutcome, MergeFileError> {
    let scratch = tempfile::tempdir()?;
    let current_path = scratch.path().join("current");
    let base_path = scratch.path().join("base");
    let other_path = scratch.path().join("other");
    fs::write(&current_path, current)?;
    fs::write(&base_path, base)?;
    fs::write(&other_path, other)?;

    let output = Command::new("git")
        .arg("merge-file")
        .arg("-p")
        .arg("--diff3")
        .arg("-L")
        .arg(current_label)
        .arg("-L")
        .arg("base")
        .arg("-L")
        .arg(other_label)
        .arg(&current_path)
        .arg(&base_path)
        .arg(&other_path)
        .output()?;

    let text = String::from_utf8_lossy(&output.stdout).into_owned();
    match output.status.code() {
        Some(0) => Ok(MergeFileOutcome::Clean(text)),
        // git merge-file exits with the number of conflict hunks (≥ 1) when
        // there are conflicts; the marked output is on stdout.
        Some(n) if n > 0 => Ok(MergeFileOutcome::Conflict { output: text }),
        code => Err(MergeFileError::Tool {
            command: "git merge-file -p --diff3 <current> <base> <other>".to_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            exit_code: code,
        }),
    }
}

/// Returns `true` when `contents` carries diff3/merge(1) conflict markers.
#[must_use]
pub fn has_conflict_markers(contents: &str) -> bool {
    contents
        .lines()
        .any(|line| line.starts_with("<<<<<<<") || line.starts_with(">>>>>>>"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
