//! The [`Lane`] record: a named, mutable collection of component heads.
//!
//! A lane binds component ids to head refs, forming an isolated working
//! context on top of the shared object graph. Unlike the other records a
//! lane is mutable: it is identified by a stable opaque hash assigned at
//! creation (a hashed v4 UUID), carries in-memory `is_new`/`has_changed`
//! flags, and is only persisted on explicit save.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::component::ModelComponent;
use super::history::VersionHistory;
use super::types::{ComponentId, LaneId, Ref};
use crate::traversal;

/// The reserved name of the default lane.
pub const DEFAULT_LANE: &str = "main";

/// The reserved historical name of the default lane.
pub const PREVIOUS_DEFAULT_LANE: &str = "master";

// ---------------------------------------------------------------------------
// LaneLog
// ---------------------------------------------------------------------------

/// Creation metadata recorded on a lane.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaneLog {
    /// Milliseconds since the epoch, as a string.
    pub date: String,
    /// Creator username, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Creator email, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Creator avatar URL, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
}

impl LaneLog {
    /// Build a log stamped with the current time.
    #[must_use]
    pub fn now(username: Option<String>, email: Option<String>) -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        Self {
            date: millis.to_string(),
            username,
            email,
            profile_image: None,
        }
    }
}

// ---------------------------------------------------------------------------
// LaneComponent
// ---------------------------------------------------------------------------

/// One component binding on a lane.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneComponent {
    /// The component id (version slot unused).
    pub id: ComponentId,
    /// The component's head on this lane. Must be a snap, never a tag.
    pub head: Ref,
}

// ---------------------------------------------------------------------------
// Lane
// ---------------------------------------------------------------------------

/// Errors from lane creation and validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LaneError {
    /// The requested name is reserved for the default lane.
    ReservedName {
        /// The rejected name.
        name: String,
    },
    /// Two entries name the same component.
    DuplicateComponent {
        /// The duplicated identity (`scope/name`).
        id: String,
    },
    /// A component binding carries a tag version instead of a snap.
    TagHead {
        /// The offending identity (`scope/name`).
        id: String,
    },
}

impl fmt::Display for LaneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReservedName { name } => {
                write!(
                    f,
                    "lane name '{name}' is reserved.\n  To fix: pick a name other than '{DEFAULT_LANE}' or '{PREVIOUS_DEFAULT_LANE}'."
                )
            }
            Self::DuplicateComponent { id } => {
                write!(f, "lane lists component '{id}' more than once")
            }
            Self::TagHead { id } => {
                write!(
                    f,
                    "lane head for '{id}' is a tag; lane heads must be snaps (40-hex refs)"
                )
            }
        }
    }
}

impl std::error::Error for LaneError {}

/// A named ref set: an isolated working context over the component graph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lane {
    /// The lane name. Never a reserved name.
    pub name: String,
    /// The owning scope.
    pub scope: String,
    /// Creation metadata.
    pub log: LaneLog,
    /// Component bindings. Each id unique without-version.
    pub components: Vec<LaneComponent>,
    /// The component whose readme documents this lane, when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readme_component: Option<ComponentId>,
    /// The lane this one was forked from, when any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forked_from: Option<LaneId>,
    /// Stable opaque identity, assigned at creation.
    pub hash: Ref,
    /// Set for a lane that has never been persisted.
    #[serde(skip)]
    pub is_new: bool,
    /// Set when the in-memory lane differs from the persisted one.
    #[serde(skip)]
    pub has_changed: bool,
}

impl Lane {
    /// Create a new lane with a fresh random hash.
    ///
    /// # Errors
    /// Rejects reserved names.
    pub fn create(
        name: impl Into<String>,
        scope: impl Into<String>,
        forked_from: Option<LaneId>,
        log: LaneLog,
    ) -> Result<Self, LaneError> {
        let name = name.into();
        if name == DEFAULT_LANE || name == PREVIOUS_DEFAULT_LANE {
            return Err(LaneError::ReservedName { name });
        }
        Ok(Self {
            scope: scope.into(),
            name,
            hash: Ref::random(),
            log,
            components: Vec::new(),
            readme_component: None,
            forked_from,
            is_new: true,
            has_changed: true,
        })
    }

    /// The lane identity.
    #[must_use]
    pub fn id(&self) -> LaneId {
        LaneId::new(self.scope.clone(), self.name.clone())
    }

    /// Look up the binding for `id` (version-insensitive).
    #[must_use]
    pub fn component(&self, id: &ComponentId) -> Option<&LaneComponent> {
        self.components.iter().find(|c| c.id.same_component(id))
    }

    /// Returns `true` if the lane binds `id` (version-insensitive).
    #[must_use]
    pub fn has_component(&self, id: &ComponentId) -> bool {
        self.component(id).is_some()
    }

    /// Add or replace a component binding.
    ///
    /// Replaces any existing entry naming the same component. Sets
    /// `has_changed` only when the head actually differs.
    pub fn add_component(&mut self, id: ComponentId, head: Ref) {
        if let Some(existing) = self
            .components
            .iter_mut()
            .find(|c| c.id.same_component(&id))
        {
            if existing.head != head || existing.id != id {
                existing.id = id;
                existing.head = head;
                self.has_changed = true;
            }
            return;
        }
        self.components.push(LaneComponent { id, head });
        self.has_changed = true;
    }

    /// Remove a component binding by id (version-insensitive).
    ///
    /// Returns `true` when an entry was removed.
    pub fn remove_component(&mut self, id: &ComponentId) -> bool {
        let before = self.components.len();
        self.components.retain(|c| !c.id.same_component(id));
        let removed = self.components.len() != before;
        if removed {
            self.has_changed = true;
        }
        removed
    }

    /// Set or clear the readme component.
    pub fn set_readme_component(&mut self, id: Option<ComponentId>) {
        if self.readme_component != id {
            self.readme_component = id;
            self.has_changed = true;
        }
    }

    /// Check whether every lane head has landed on its component's main head.
    ///
    /// `load` resolves a component id to its model index and history cache;
    /// a component that cannot be resolved, or whose main head does not reach
    /// the lane head, counts as unmerged.
    pub fn is_fully_merged<F>(&self, mut load: F) -> bool
    where
        F: FnMut(&ComponentId) -> Option<(ModelComponent, VersionHistory)>,
    {
        self.components.iter().all(|binding| {
            let Some((component, history)) = load(&binding.id) else {
                return false;
            };
            let Some(head) = component.head_include_remote() else {
                return false;
            };
            traversal::is_ref_part_of_history(&history, head, &binding.head)
        })
    }

    /// Enforce the lane invariants: unique ids, snap heads, non-reserved name.
    ///
    /// # Errors
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), LaneError> {
        if self.name == DEFAULT_LANE || self.name == PREVIOUS_DEFAULT_LANE {
            return Err(LaneError::ReservedName {
                name: self.name.clone(),
            });
        }
        for (i, binding) in self.components.iter().enumerate() {
            // The head field is a typed Ref, so it is a snap by construction;
            // a tag can only sneak in through the id's version slot.
            if binding.id.version.is_some() && !binding.id.has_snap_version() {
                return Err(LaneError::TagHead {
                    id: binding.id.full_name(),
                });
            }
            if self.components[..i]
                .iter()
                .any(|other| other.id.same_component(&binding.id))
            {
                return Err(LaneError::DuplicateComponent {
                    id: binding.id.full_name(),
                });
            }
        }
        Ok(())
    }

    /// Structural equality: same identity and the same sorted `(id, head)`
    /// binding set. Log metadata and flags are ignored.
    #[must_use]
    pub fn is_equal(&self, other: &Self) -> bool {
        if self.id() != other.id() {
            return false;
        }
        let mut ours: Vec<_> = self
            .components
            .iter()
            .map(|c| (c.id.full_name(), &c.head))
            .collect();
        let mut theirs: Vec<_> = other
            .components
            .iter()
            .map(|c| (c.id.full_name(), &c.head))
            .collect();
        ours.sort();
        theirs.sort();
        ours == theirs
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
