//! The [`VersionHistory`] record: a denormalized per-component DAG cache.
//!
//! Traversal queries (`traversal` module) never load full [`Version`]
//! records — they walk this cache instead. Each entry mirrors one version's
//! edges: parents, the optional unrelated graft link, and the optional
//! squashed predecessor list.
//!
//! The record also memoizes "graph complete from here" marks: once every
//! transitive parent of a ref is known to be present locally, the ref is
//! added to `graph_complete_refs` so later queries skip the walk.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::types::Ref;
use super::version::Version;

// ---------------------------------------------------------------------------
// VersionParents
// ---------------------------------------------------------------------------

/// One denormalized history entry: a version's hash and its edges.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionParents {
    /// The version's content address.
    pub hash: Ref,
    /// Parent refs (ancestry edges).
    pub parents: Vec<Ref>,
    /// Grafted-history link (membership only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unrelated: Option<Ref>,
    /// Collapsed predecessor refs (membership only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub squashed: Option<Vec<Ref>>,
}

impl VersionParents {
    /// Denormalize `version` (stored at `hash`) into a history entry.
    #[must_use]
    pub fn from_version(hash: Ref, version: &Version) -> Self {
        Self {
            hash,
            parents: version.parents.clone(),
            unrelated: version.unrelated.clone(),
            squashed: version.squashed.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// VersionHistory
// ---------------------------------------------------------------------------

/// The per-component DAG cache.
///
/// Invariants:
/// - no two entries share a `hash`;
/// - a parent/unrelated/squashed ref either appears as another entry's
///   `hash` or is reported as *missing* by traversal — never a panic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionHistory {
    /// The component name.
    pub name: String,
    /// The owning scope.
    pub scope: String,
    /// Denormalized entries, keyed by hash for O(log n) lookup.
    #[serde(with = "entries_as_list")]
    pub versions: BTreeMap<Ref, VersionParents>,
    /// Refs from which every transitive parent is present locally.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub graph_complete_refs: BTreeSet<Ref>,
    /// Set when the in-memory record differs from the persisted one.
    #[serde(skip)]
    pub has_changed: bool,
}

impl VersionHistory {
    /// Create an empty history for `(scope, name)`.
    #[must_use]
    pub fn new(scope: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: scope.into(),
            versions: BTreeMap::new(),
            graph_complete_refs: BTreeSet::new(),
            has_changed: false,
        }
    }

    /// The component identity string, `scope/name`.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.scope, self.name)
    }

    /// Look up the entry for `hash`.
    #[must_use]
    pub fn get(&self, hash: &Ref) -> Option<&VersionParents> {
        self.versions.get(hash)
    }

    /// Returns `true` if `hash` has an entry.
    #[must_use]
    pub fn contains(&self, hash: &Ref) -> bool {
        self.versions.contains_key(hash)
    }

    /// Insert or replace one entry. Replacing an identical entry is a no-op
    /// and does not mark the record dirty.
    pub fn add_entry(&mut self, entry: VersionParents) {
        match self.versions.get(&entry.hash) {
            Some(existing) if *existing == entry => {}
            _ => {
                self.versions.insert(entry.hash.clone(), entry);
                self.has_changed = true;
            }
        }
    }

    /// Denormalize and insert `version` stored at `hash`.
    pub fn add_from_version(&mut self, hash: Ref, version: &Version) {
        self.add_entry(VersionParents::from_version(hash, version));
    }

    /// Record that the graph is complete from `r` onward.
    pub fn mark_graph_complete(&mut self, r: Ref) {
        if self.graph_complete_refs.insert(r) {
            self.has_changed = true;
        }
    }

    /// Returns `true` if `r` was previously marked graph-complete.
    #[must_use]
    pub fn is_marked_graph_complete(&self, r: &Ref) -> bool {
        self.graph_complete_refs.contains(r)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Returns `true` when the history holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

/// Serialize the entry map as the wire-format list of `VersionParents`.
///
/// The JSON shape is `versions: [{hash, parents, …}]`; the in-memory shape
/// is a map for fast lookup. Duplicate hashes in the input collapse to the
/// last occurrence, which preserves the no-duplicate invariant on load.
mod entries_as_list {
    use super::{BTreeMap, Ref, VersionParents};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<Ref, VersionParents>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let list: Vec<&VersionParents> = map.values().collect();
        list.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<Ref, VersionParents>, D::Error> {
        let list = Vec::<VersionParents>::deserialize(deserializer)?;
        Ok(list
            .into_iter()
            .map(|entry| (entry.hash.clone(), entry))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
