//! The content-addressed object store.
//!
//! Records live under a root directory, fanned out by the first two hex
//! characters of their address: `<root>/ab/<remaining-38-hex>`. The
//! serialized form is canonical JSON plus a trailing newline; the address of
//! a content-addressed record is the SHA-1 of exactly those bytes.
//!
//! Writes are atomic per record (write-temp-then-rename), so a concurrent
//! `put` of the same address is safe: both writers produce identical bytes
//! and the last rename wins. Content-addressed records are verified against
//! their address on load; a mismatch or parse failure is corruption and is
//! always fatal.

use std::fmt;
use std::fs;
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};

use crate::model::record::{component_address, history_address};
use crate::model::{
    FileTree, Lane, ModelComponent, ObjectRecord, Ref, Source, Version, VersionHistory,
};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from object-store operations.
#[derive(Debug)]
pub enum StoreError {
    /// An I/O error while reading or writing a record file.
    Io {
        /// The path being accessed.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },

    /// A record failed to serialize to canonical bytes.
    Serialize(serde_json::Error),

    /// A persisted record is corrupt: parse failure or content-address
    /// mismatch.
    Corruption {
        /// The address that was loaded.
        address: Ref,
        /// What went wrong.
        detail: String,
    },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "object store I/O error at '{}': {source}", path.display())
            }
            Self::Serialize(e) => write!(f, "failed to serialize record: {e}"),
            Self::Corruption { address, detail } => {
                write!(
                    f,
                    "corrupt object {address}: {detail}\n  To fix: delete the local objects and re-import the scope (the remote copy is authoritative)."
                )
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Serialize(e) => Some(e),
            Self::Corruption { .. } => None,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialize(e)
    }
}

// ---------------------------------------------------------------------------
// ObjectStore
// ---------------------------------------------------------------------------

/// A directory-backed store of [`ObjectRecord`]s.
///
/// All operations take `&self`: records are immutable and writes are atomic,
/// so the store itself carries no in-memory state to synchronize.
#[derive(Clone, Debug)]
pub struct ObjectStore {
    root: PathBuf,
}

impl ObjectStore {
    /// Open a store rooted at `root`. The directory is created lazily on
    /// first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The store's root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, address: &Ref) -> PathBuf {
        let hex = address.as_str();
        self.root.join(&hex[..2]).join(&hex[2..])
    }

    /// Returns `true` if a record exists at `address`.
    #[must_use]
    pub fn has(&self, address: &Ref) -> bool {
        self.path_for(address).is_file()
    }

    /// Persist `record`, returning its address.
    ///
    /// Idempotent for content-addressed records (an existing file is never
    /// rewritten — identical bytes by construction). Identity-addressed and
    /// lane records are atomically replaced.
    ///
    /// # Errors
    /// Serialization or I/O failure.
    pub fn put(&self, record: &ObjectRecord) -> Result<Ref, StoreError> {
        let address = record.address()?;
        let path = self.path_for(&address);
        if record.is_content_addressed() && path.is_file() {
            return Ok(address);
        }

        let bytes = record.canonical_bytes()?;
        let parent = path.parent().expect("record path always has a parent");
        let io_err = |source| StoreError::Io {
            path: path.clone(),
            source,
        };
        fs::create_dir_all(parent).map_err(io_err)?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(io_err)?;
        tmp.write_all(&bytes).map_err(io_err)?;
        tmp.persist(&path).map_err(|e| io_err(e.error))?;
        Ok(address)
    }

    /// Load the record at `address`, or `None` when absent.
    ///
    /// # Errors
    /// I/O failure, or corruption (parse failure / content-address
    /// mismatch).
    pub fn get(&self, address: &Ref) -> Result<Option<ObjectRecord>, StoreError> {
        let path = self.path_for(address);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        let record: ObjectRecord =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Corruption {
                address: address.clone(),
                detail: format!("parse failure: {e}"),
            })?;

        if record.is_content_addressed() {
            let actual = Ref::for_bytes(&bytes);
            if actual != *address {
                return Err(StoreError::Corruption {
                    address: address.clone(),
                    detail: format!("content hash mismatch: stored bytes hash to {actual}"),
                });
            }
        }
        Ok(Some(record))
    }

    // -- typed loaders ------------------------------------------------------

    /// Load a [`Version`] record.
    ///
    /// # Errors
    /// Corruption when the address holds a different record kind.
    pub fn get_version(&self, address: &Ref) -> Result<Option<Version>, StoreError> {
        match self.get(address)? {
            None => Ok(None),
            Some(ObjectRecord::Version(v)) => Ok(Some(v)),
            Some(other) => Err(wrong_kind(address, "version", &other)),
        }
    }

    /// Load a [`FileTree`] record.
    ///
    /// # Errors
    /// Corruption when the address holds a different record kind.
    pub fn get_file_tree(&self, address: &Ref) -> Result<Option<FileTree>, StoreError> {
        match self.get(address)? {
            None => Ok(None),
            Some(ObjectRecord::FileTree(t)) => Ok(Some(t)),
            Some(other) => Err(wrong_kind(address, "file_tree", &other)),
        }
    }

    /// Load a [`Source`] record.
    ///
    /// # Errors
    /// Corruption when the address holds a different record kind.
    pub fn get_source(&self, address: &Ref) -> Result<Option<Source>, StoreError> {
        match self.get(address)? {
            None => Ok(None),
            Some(ObjectRecord::Source(s)) => Ok(Some(s)),
            Some(other) => Err(wrong_kind(address, "source", &other)),
        }
    }

    /// Load the [`ModelComponent`] for `(scope, name)`.
    ///
    /// # Errors
    /// Corruption when the identity slot holds a different record kind.
    pub fn get_component(
        &self,
        scope: &str,
        name: &str,
    ) -> Result<Option<ModelComponent>, StoreError> {
        let address = component_address(scope, name);
        match self.get(&address)? {
            None => Ok(None),
            Some(ObjectRecord::Component(c)) => Ok(Some(c)),
            Some(other) => Err(wrong_kind(&address, "component", &other)),
        }
    }

    /// Load the [`VersionHistory`] for `(scope, name)`, or a fresh empty one
    /// when the component has no cache yet.
    ///
    /// # Errors
    /// Corruption when the identity slot holds a different record kind.
    pub fn get_history(&self, scope: &str, name: &str) -> Result<VersionHistory, StoreError> {
        let address = history_address(scope, name);
        match self.get(&address)? {
            None => Ok(VersionHistory::new(scope, name)),
            Some(ObjectRecord::VersionHistory(h)) => Ok(h),
            Some(other) => Err(wrong_kind(&address, "version_history", &other)),
        }
    }

    /// Load the [`Lane`] at `hash`.
    ///
    /// # Errors
    /// Corruption when the address holds a different record kind.
    pub fn get_lane(&self, hash: &Ref) -> Result<Option<Lane>, StoreError> {
        match self.get(hash)? {
            None => Ok(None),
            Some(ObjectRecord::Lane(l)) => Ok(Some(l)),
            Some(other) => Err(wrong_kind(hash, "lane", &other)),
        }
    }

    /// Persist a history cache if it is dirty, clearing its flag.
    ///
    /// # Errors
    /// Propagates `put` failure.
    pub fn save_history(&self, history: &mut VersionHistory) -> Result<(), StoreError> {
        if history.has_changed {
            self.put(&ObjectRecord::VersionHistory(history.clone()))?;
            history.has_changed = false;
        }
        Ok(())
    }

    /// Persist a lane if it is new or dirty, clearing its flags.
    ///
    /// # Errors
    /// Propagates `put` failure.
    pub fn save_lane(&self, lane: &mut Lane) -> Result<(), StoreError> {
        if lane.is_new || lane.has_changed {
            self.put(&ObjectRecord::Lane(lane.clone()))?;
            lane.is_new = false;
            lane.has_changed = false;
        }
        Ok(())
    }
}

fn wrong_kind(address: &Ref, expected: &str, actual: &ObjectRecord) -> StoreError {
    StoreError::Corruption {
        address: address.clone(),
        detail: format!("expected a {expected} record, found {}", actual.kind()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
