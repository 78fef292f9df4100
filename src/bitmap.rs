//! The workspace bitmap: persistent mapping of tracked component →
//! checked-out version and files.
//!
//! One JSON file per workspace. Mutated only by checkout, write, and
//! removal operations; saved atomically (write-temp-then-rename). The
//! bitmap also records which lane is active, so the checkout engine can
//! filter participating ids.
//!
//! Exclusive writing is enforced by [`CheckoutLock`], a create-new lock
//! file held for the whole checkout and released on drop.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::{ComponentId, LaneId};

// ---------------------------------------------------------------------------
// BitmapEntry
// ---------------------------------------------------------------------------

/// One tracked component.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitmapEntry {
    /// The component identity (version slot unused; see `version`).
    pub id: ComponentId,
    /// The checked-out version: a tag or a snap hex. `None` for a component
    /// that was added locally and never versioned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Workspace-relative paths of the component's files.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    /// Extension ids configured for this component.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config: Vec<String>,
    /// Set when the component was made available on the default lane while
    /// a lane is active.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub available_on_main: bool,
    /// Set when a checkout left this component with unresolved conflict
    /// markers that must be resolved before the next operation.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub during_merge: bool,
}

impl BitmapEntry {
    /// Create an entry for `id` at `version`.
    #[must_use]
    pub fn new(id: ComponentId, version: Option<String>) -> Self {
        Self {
            id: id.without_version(),
            version,
            files: Vec::new(),
            config: Vec::new(),
            available_on_main: false,
            during_merge: false,
        }
    }

    /// The tracked id including the checked-out version.
    #[must_use]
    pub fn id_with_version(&self) -> ComponentId {
        match &self.version {
            Some(version) => self.id.at_version(version.clone()),
            None => self.id.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Bitmap
// ---------------------------------------------------------------------------

/// Errors from bitmap persistence and locking.
#[derive(Debug)]
pub enum BitmapError {
    /// An I/O error reading or writing the bitmap file.
    Io {
        /// The path being accessed.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },
    /// The bitmap file exists but cannot be parsed.
    Corrupt {
        /// The bitmap path.
        path: PathBuf,
        /// Parse failure detail.
        detail: String,
    },
    /// Another checkout holds the workspace lock.
    Locked {
        /// The lock-file path.
        path: PathBuf,
    },
}

impl fmt::Display for BitmapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "bitmap I/O error at '{}': {source}", path.display())
            }
            Self::Corrupt { path, detail } => {
                write!(
                    f,
                    "bitmap file '{}' is corrupt: {detail}\n  To fix: restore the file from backup or re-track the workspace components.",
                    path.display()
                )
            }
            Self::Locked { path } => {
                write!(
                    f,
                    "another checkout is in progress (lock file '{}' exists).\n  To fix: wait for it to finish, or delete the lock file if the process died.",
                    path.display()
                )
            }
        }
    }
}

impl std::error::Error for BitmapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// The persisted workspace index.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Bitmap {
    /// The active lane, when the workspace is on one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lane: Option<LaneId>,
    /// Tracked components, keyed by `scope/name`.
    #[serde(default)]
    pub components: BTreeMap<String, BitmapEntry>,
    /// The file this bitmap was loaded from.
    #[serde(skip)]
    path: PathBuf,
    /// Set when the in-memory bitmap differs from the persisted one.
    #[serde(skip)]
    pub has_changed: bool,
}

impl Bitmap {
    /// Load the bitmap at `path`; a missing file yields an empty bitmap.
    ///
    /// # Errors
    /// I/O failure, or a corrupt bitmap file.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, BitmapError> {
        let path = path.into();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self {
                    path,
                    ..Self::default()
                });
            }
            Err(source) => return Err(BitmapError::Io { path, source }),
        };
        let mut bitmap: Self =
            serde_json::from_slice(&bytes).map_err(|e| BitmapError::Corrupt {
                path: path.clone(),
                detail: e.to_string(),
            })?;
        bitmap.path = path;
        bitmap.has_changed = false;
        Ok(bitmap)
    }

    /// Persist the bitmap atomically when dirty.
    ///
    /// # Errors
    /// I/O failure.
    pub fn save(&mut self) -> Result<(), BitmapError> {
        if !self.has_changed {
            return Ok(());
        }
        let io_err = |source| BitmapError::Io {
            path: self.path.clone(),
            source,
        };
        let parent = self.path.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(parent) = parent {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let bytes = serde_json::to_vec_pretty(self).expect("bitmap serialization is infallible");
        let dir = parent.unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(&bytes).map_err(io_err)?;
        tmp.write_all(b"\n").map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;
        self.has_changed = false;
        Ok(())
    }

    /// The entry for `id` (version-insensitive), when tracked.
    #[must_use]
    pub fn entry(&self, id: &ComponentId) -> Option<&BitmapEntry> {
        self.components.get(&id.full_name())
    }

    /// The currently tracked id for `id`.
    ///
    /// With `ignore_version` the lookup matches by `scope/name` alone;
    /// without it, a versioned query must also match the tracked version.
    #[must_use]
    pub fn get_bit_id(&self, id: &ComponentId, ignore_version: bool) -> Option<ComponentId> {
        let entry = self.entry(id)?;
        if !ignore_version {
            if let Some(queried) = &id.version {
                if entry.version.as_ref() != Some(queried) {
                    return None;
                }
            }
        }
        Some(entry.id_with_version())
    }

    /// The tracked version string for `id`, when any.
    #[must_use]
    pub fn version_of(&self, id: &ComponentId) -> Option<&str> {
        self.entry(id)?.version.as_deref()
    }

    /// Track `id` at `version`, preserving any existing files/config lists.
    pub fn set_version(&mut self, id: &ComponentId, version: impl Into<String>) {
        let version = version.into();
        let entry = self
            .components
            .entry(id.full_name())
            .or_insert_with(|| BitmapEntry::new(id.clone(), None));
        if entry.version.as_deref() != Some(version.as_str()) {
            entry.version = Some(version);
            self.has_changed = true;
        }
    }

    /// Replace the tracked file list for `id`.
    pub fn set_files(&mut self, id: &ComponentId, files: Vec<String>) {
        let entry = self
            .components
            .entry(id.full_name())
            .or_insert_with(|| BitmapEntry::new(id.clone(), None));
        if entry.files != files {
            entry.files = files;
            self.has_changed = true;
        }
    }

    /// Stop tracking `id`. Returns `true` when an entry was removed.
    pub fn remove(&mut self, id: &ComponentId) -> bool {
        let removed = self.components.remove(&id.full_name()).is_some();
        if removed {
            self.has_changed = true;
        }
        removed
    }

    /// Flip the available-on-main flag for each of `ids` (used when exiting
    /// a lane).
    pub fn make_components_available_on_main(&mut self, ids: &[ComponentId]) {
        for id in ids {
            if let Some(entry) = self.components.get_mut(&id.full_name()) {
                if !entry.available_on_main {
                    entry.available_on_main = true;
                    self.has_changed = true;
                }
            }
        }
    }

    /// Mark `id` as carrying unresolved conflict markers.
    pub fn mark_during_merge(&mut self, id: &ComponentId) {
        if let Some(entry) = self.components.get_mut(&id.full_name()) {
            if !entry.during_merge {
                entry.during_merge = true;
                self.has_changed = true;
            }
        }
    }

    /// Clear the during-merge mark on `id`.
    pub fn clear_during_merge(&mut self, id: &ComponentId) {
        if let Some(entry) = self.components.get_mut(&id.full_name()) {
            if entry.during_merge {
                entry.during_merge = false;
                self.has_changed = true;
            }
        }
    }

    /// Returns `true` when `id` is marked during-merge.
    #[must_use]
    pub fn is_during_merge(&self, id: &ComponentId) -> bool {
        self.entry(id).is_some_and(|e| e.during_merge)
    }

    /// All tracked ids, with their versions, in sorted order.
    #[must_use]
    pub fn tracked_ids(&self) -> Vec<ComponentId> {
        self.components
            .values()
            .map(BitmapEntry::id_with_version)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// CheckoutLock
// ---------------------------------------------------------------------------

/// Exclusive workspace-writer lock, held for the duration of a checkout.
///
/// Acquired by atomically creating the lock file; released (file removed)
/// on drop, including the error paths.
#[derive(Debug)]
pub struct CheckoutLock {
    path: PathBuf,
}

impl CheckoutLock {
    /// Acquire the lock at `path`.
    ///
    /// # Errors
    /// [`BitmapError::Locked`] when the file already exists; I/O otherwise.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, BitmapError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| BitmapError::Io {
                path: path.clone(),
                source,
            })?;
        }
        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let _ = writeln!(file, "{}", std::process::id());
                Ok(Self { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(BitmapError::Locked { path })
            }
            Err(source) => Err(BitmapError::Io { path, source }),
        }
    }
}

impl Drop for CheckoutLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
