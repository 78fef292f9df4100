//! The [`Version`] record: one point in a component's history.
//!
//! A version is immutable once persisted. Its ancestry is carried by
//! `parents`; `unrelated` and `squashed` are membership hints, not ancestry
//! (see `traversal` for how each edge kind participates in queries).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::Ref;

// ---------------------------------------------------------------------------
// VersionLog
// ---------------------------------------------------------------------------

/// Authorship metadata recorded on every version.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionLog {
    /// Author username, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Author email, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Milliseconds since the epoch, as a string (stable across platforms).
    pub date: String,
    /// Commit-style message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ---------------------------------------------------------------------------
// Version
// ---------------------------------------------------------------------------

/// One version of a component.
///
/// - `parents`: zero refs for an initial version, one for a linear step,
///   two or more for a merge.
/// - `unrelated`: optional link to a formerly-separate history grafted in.
///   Carries no ancestry semantics; participates only in membership queries.
/// - `squashed`: when a range was collapsed into this version, the prior
///   parents it replaced. Membership only.
/// - `files`: content address of this version's [`FileTree`](super::files::FileTree).
/// - `extensions`: opaque per-extension config payload (`ext-id → json`).
/// - `removed`: once set, any workspace holding this component must delete
///   it on checkout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    /// Parent version refs.
    pub parents: Vec<Ref>,
    /// Grafted-history link (membership only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unrelated: Option<Ref>,
    /// Collapsed predecessor refs (membership only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub squashed: Option<Vec<Ref>>,
    /// Content address of the file tree.
    pub files: Ref,
    /// Opaque config extension payload.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, serde_json::Value>,
    /// Component-removed marker.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub removed: bool,
    /// Authorship metadata.
    #[serde(default)]
    pub log: VersionLog,
}

impl Version {
    /// Create an initial version (no parents) over `files`.
    #[must_use]
    pub fn initial(files: Ref) -> Self {
        Self {
            parents: Vec::new(),
            unrelated: None,
            squashed: None,
            files,
            extensions: BTreeMap::new(),
            removed: false,
            log: VersionLog::default(),
        }
    }

    /// Create a linear successor of `parent` over `files`.
    #[must_use]
    pub fn child_of(parent: Ref, files: Ref) -> Self {
        Self {
            parents: vec![parent],
            unrelated: None,
            squashed: None,
            files,
            extensions: BTreeMap::new(),
            removed: false,
            log: VersionLog::default(),
        }
    }

    /// Create a merge version over `files` with the given parents.
    #[must_use]
    pub fn merge_of(parents: Vec<Ref>, files: Ref) -> Self {
        Self {
            parents,
            unrelated: None,
            squashed: None,
            files,
            extensions: BTreeMap::new(),
            removed: false,
            log: VersionLog::default(),
        }
    }

    /// Returns `true` if this is an initial version.
    #[must_use]
    pub fn is_initial(&self) -> bool {
        self.parents.is_empty()
    }

    /// Returns `true` if this version has two or more parents.
    #[must_use]
    pub fn is_merge(&self) -> bool {
        self.parents.len() >= 2
    }

    /// Typed accessor into the extension payload.
    ///
    /// Returns `None` when the extension is absent or its payload does not
    /// deserialize into `T`.
    #[must_use]
    pub fn extension<T: serde::de::DeserializeOwned>(&self, ext_id: &str) -> Option<T> {
        self.extensions
            .get(ext_id)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
