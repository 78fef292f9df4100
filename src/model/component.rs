//! The [`ModelComponent`] record: per-component head pointer and tag map.
//!
//! This is the entry point to a component's history: the current main head,
//! the latest known remote head, and the tag → ref map. Tags are immutable
//! once written and totally ordered by semver.

use std::collections::BTreeMap;

use semver::Version as Semver;
use serde::{Deserialize, Serialize};

use super::types::Ref;

// ---------------------------------------------------------------------------
// ModelComponent
// ---------------------------------------------------------------------------

/// The per-component index record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelComponent {
    /// The owning scope.
    pub scope: String,
    /// The component name.
    pub name: String,
    /// Current local main head, when the component has local history.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head: Option<Ref>,
    /// Latest known remote head, when the component was fetched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_head: Option<Ref>,
    /// Tag → version ref. Immutable once written.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, Ref>,
}

impl ModelComponent {
    /// Create an empty index for `(scope, name)`.
    #[must_use]
    pub fn new(scope: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            name: name.into(),
            head: None,
            remote_head: None,
            tags: BTreeMap::new(),
        }
    }

    /// The component identity string, `scope/name`.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.scope, self.name)
    }

    /// Prefer the local head; fall back to the latest known remote head.
    #[must_use]
    pub fn head_include_remote(&self) -> Option<&Ref> {
        self.head.as_ref().or(self.remote_head.as_ref())
    }

    /// The greatest semver tag, when any parseable tag exists.
    #[must_use]
    pub fn latest_version_if_exist(&self) -> Option<&str> {
        self.tags
            .keys()
            .filter_map(|tag| Semver::parse(tag).ok().map(|parsed| (parsed, tag)))
            .max_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, tag)| tag.as_str())
    }

    /// Resolve a version string — tag name or snap hex — to a ref.
    #[must_use]
    pub fn resolve_version(&self, version: &str) -> Option<Ref> {
        if let Some(tagged) = self.tags.get(version) {
            return Some(tagged.clone());
        }
        Ref::new(version).ok()
    }

    /// Reverse lookup: the tag naming `r`, if one exists.
    #[must_use]
    pub fn tag_for(&self, r: &Ref) -> Option<&str> {
        self.tags
            .iter()
            .find(|(_, tagged)| *tagged == r)
            .map(|(tag, _)| tag.as_str())
    }

    /// Record a new tag.
    ///
    /// Tags are immutable: re-pointing an existing tag is rejected.
    ///
    /// # Errors
    /// Returns the existing ref when `tag` is already written to a different
    /// target.
    pub fn add_tag(&mut self, tag: impl Into<String>, r: Ref) -> Result<(), Ref> {
        let tag = tag.into();
        match self.tags.get(&tag) {
            Some(existing) if *existing != r => Err(existing.clone()),
            Some(_) => Ok(()),
            None => {
                self.tags.insert(tag, r);
                Ok(())
            }
        }
    }

    /// The display form of a head ref: its tag when one names it, else the
    /// full hex.
    #[must_use]
    pub fn version_label(&self, r: &Ref) -> String {
        self.tag_for(r)
            .map_or_else(|| r.to_string(), ToOwned::to_owned)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
