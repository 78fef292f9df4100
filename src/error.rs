//! The unified weft error type.
//!
//! Kinds, not class names: validation errors surface at the edge with exit
//! code 2; preconditions, corruption, and I/O unwind with exit code 1.
//! Per-component failures are *not* errors — they accumulate in the
//! checkout summary. Conflicts are not errors either — they surface via
//! `left_unresolved_conflicts`. Write-side failures (install/compile) ride
//! back inside the result.
//!
//! Messages are designed to be actionable: each variant says what went
//! wrong and what to do next.

use std::fmt;

use crate::bitmap::BitmapError;
use crate::host::HostError;
use crate::merge::MergeFileError;
use crate::model::lane::LaneError;
use crate::model::types::ValidationError;
use crate::model::ComponentId;
use crate::store::StoreError;

// ---------------------------------------------------------------------------
// WeftError
// ---------------------------------------------------------------------------

/// Unified error type for weft operations.
#[derive(Debug)]
pub enum WeftError {
    /// An impossible argument combination (validation; exit code 2).
    InvalidArguments {
        /// Why the combination is invalid.
        reason: String,
    },

    /// An identifier failed validation (exit code 2).
    Validation(ValidationError),

    /// A lane invariant was violated.
    Lane(LaneError),

    /// An object-store failure (I/O or corruption).
    Store(StoreError),

    /// A bitmap failure (I/O, corruption, or a held checkout lock).
    Bitmap(BitmapError),

    /// A host capability failure.
    Host(HostError),

    /// The external file merger failed.
    MergeFile(MergeFileError),

    /// A three-way merge produced conflicts, no strategy was pre-selected,
    /// and prompting was disabled: the whole operation is aborted.
    MergeAborted {
        /// One offending component.
        id: ComponentId,
    },

    /// A plain I/O error.
    Io(std::io::Error),
}

impl WeftError {
    /// The process exit code this error maps to: 2 for validation, 1
    /// otherwise.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidArguments { .. } | Self::Validation(_) => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for WeftError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArguments { reason } => {
                write!(
                    f,
                    "invalid arguments: {reason}\n  To fix: see `weft checkout --help` for valid combinations."
                )
            }
            Self::Validation(e) => write!(f, "{e}"),
            Self::Lane(e) => write!(f, "{e}"),
            Self::Store(e) => write!(f, "{e}"),
            Self::Bitmap(e) => write!(f, "{e}"),
            Self::Host(e) => write!(f, "{e}"),
            Self::MergeFile(e) => write!(f, "{e}"),
            Self::MergeAborted { id } => {
                write!(
                    f,
                    "checkout would leave conflicts, e.g. in '{id}'.\n  To fix: re-run with --manual to keep conflict markers, or --ours/--theirs to pick a side."
                )
            }
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for WeftError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Validation(e) => Some(e),
            Self::Lane(e) => Some(e),
            Self::Store(e) => Some(e),
            Self::Bitmap(e) => Some(e),
            Self::Host(e) => Some(e),
            Self::MergeFile(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::InvalidArguments { .. } | Self::MergeAborted { .. } => None,
        }
    }
}

impl From<ValidationError> for WeftError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<LaneError> for WeftError {
    fn from(e: LaneError) -> Self {
        Self::Lane(e)
    }
}

impl From<StoreError> for WeftError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<BitmapError> for WeftError {
    fn from(e: BitmapError) -> Self {
        Self::Bitmap(e)
    }
}

impl From<HostError> for WeftError {
    fn from(e: HostError) -> Self {
        Self::Host(e)
    }
}

impl From<MergeFileError> for WeftError {
    fn from(e: MergeFileError) -> Self {
        Self::MergeFile(e)
    }
}

impl From<std::io::Error> for WeftError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
