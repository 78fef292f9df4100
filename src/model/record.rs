//! The [`ObjectRecord`] sum: every record kind the object store can hold.
//!
//! Records serialize to canonical bytes — compact JSON in struct field
//! order, maps as `BTreeMap`s, plus a trailing newline — and are addressed
//! in one of three ways:
//!
//! - **content**: `Version`, `FileTree`, `Source` — address = SHA-1 of the
//!   canonical bytes. Verified on load.
//! - **identity**: `Component`, `VersionHistory` — address = SHA-1 of a
//!   type-prefixed `scope/name` string, so each `(scope, name)` pair has
//!   exactly one slot that successive writes update.
//! - **assigned**: `Lane` — address = the lane's stable opaque `hash`,
//!   chosen at creation.

use serde::{Deserialize, Serialize};

use super::component::ModelComponent;
use super::files::{FileTree, Source};
use super::history::VersionHistory;
use super::lane::Lane;
use super::types::Ref;
use super::version::Version;

// ---------------------------------------------------------------------------
// ObjectRecord
// ---------------------------------------------------------------------------

/// A typed, immutable record in the object store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectRecord {
    /// One point in a component's history.
    Version(Version),
    /// A per-component head/tag index.
    Component(ModelComponent),
    /// A named ref set.
    Lane(Lane),
    /// A denormalized per-component DAG cache.
    VersionHistory(VersionHistory),
    /// A version's file listing.
    FileTree(FileTree),
    /// A single file's contents.
    Source(Source),
}

impl ObjectRecord {
    /// Serialize to canonical bytes: compact JSON plus a trailing newline.
    ///
    /// # Errors
    /// Fails only when a contained `serde_json::Value` cannot serialize
    /// (non-string map keys injected through an extension payload).
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut bytes = serde_json::to_vec(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// The store address of this record (see module docs for the three
    /// addressing schemes).
    ///
    /// # Errors
    /// Propagates serialization failure for content-addressed records.
    pub fn address(&self) -> Result<Ref, serde_json::Error> {
        match self {
            Self::Version(_) | Self::FileTree(_) | Self::Source(_) => {
                Ok(Ref::for_bytes(&self.canonical_bytes()?))
            }
            Self::Component(c) => Ok(component_address(&c.scope, &c.name)),
            Self::VersionHistory(h) => Ok(history_address(&h.scope, &h.name)),
            Self::Lane(lane) => Ok(lane.hash.clone()),
        }
    }

    /// Returns `true` if this record kind is content-addressed, i.e. its
    /// address must equal the hash of its canonical bytes.
    #[must_use]
    pub fn is_content_addressed(&self) -> bool {
        matches!(
            self,
            Self::Version(_) | Self::FileTree(_) | Self::Source(_)
        )
    }

    /// The record kind as a static string (logging and error messages).
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Version(_) => "version",
            Self::Component(_) => "component",
            Self::Lane(_) => "lane",
            Self::VersionHistory(_) => "version_history",
            Self::FileTree(_) => "file_tree",
            Self::Source(_) => "source",
        }
    }
}

/// The store address of the [`ModelComponent`] slot for `(scope, name)`.
#[must_use]
pub fn component_address(scope: &str, name: &str) -> Ref {
    Ref::for_bytes(format!("component {scope}/{name}").as_bytes())
}

/// The store address of the [`VersionHistory`] slot for `(scope, name)`.
#[must_use]
pub fn history_address(scope: &str, name: &str) -> Ref {
    Ref::for_bytes(format!("version_history {scope}/{name}").as_bytes())
}

impl From<Version> for ObjectRecord {
    fn from(v: Version) -> Self {
        Self::Version(v)
    }
}

impl From<ModelComponent> for ObjectRecord {
    fn from(c: ModelComponent) -> Self {
        Self::Component(c)
    }
}

impl From<Lane> for ObjectRecord {
    fn from(l: Lane) -> Self {
        Self::Lane(l)
    }
}

impl From<VersionHistory> for ObjectRecord {
    fn from(h: VersionHistory) -> Self {
        Self::VersionHistory(h)
    }
}

impl From<FileTree> for ObjectRecord {
    fn from(t: FileTree) -> Self {
        Self::FileTree(t)
    }
}

impl From<Source> for ObjectRecord {
    fn from(s: Source) -> Self {
        Self::Source(s)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::lane::LaneLog;

    fn r(c: char) -> Ref {
        Ref::new(&c.to_string().repeat(40)).unwrap()
    }

    #[test]
    fn canonical_bytes_end_with_newline() {
        let record = ObjectRecord::Source(Source::new("hello"));
        let bytes = record.canonical_bytes().unwrap();
        assert_eq!(bytes.last(), Some(&b'\n'));
    }

    #[test]
    fn canonical_bytes_are_deterministic() {
        let a = ObjectRecord::Version(Version::initial(r('f')));
        let b = ObjectRecord::Version(Version::initial(r('f')));
        assert_eq!(a.canonical_bytes().unwrap(), b.canonical_bytes().unwrap());
    }

    #[test]
    fn content_address_matches_bytes_hash() {
        let record = ObjectRecord::Source(Source::new("export {};\n"));
        let address = record.address().unwrap();
        assert_eq!(address, Ref::for_bytes(&record.canonical_bytes().unwrap()));
    }

    #[test]
    fn content_address_changes_with_content() {
        let a = ObjectRecord::Source(Source::new("a"));
        let b = ObjectRecord::Source(Source::new("b"));
        assert_ne!(a.address().unwrap(), b.address().unwrap());
    }

    #[test]
    fn component_address_is_identity_stable() {
        let mut c = ModelComponent::new("acme", "button");
        let empty_address = ObjectRecord::from(c.clone()).address().unwrap();
        c.head = Some(r('a'));
        let headed_address = ObjectRecord::from(c).address().unwrap();
        // Same slot regardless of content.
        assert_eq!(empty_address, headed_address);
        assert_eq!(empty_address, component_address("acme", "button"));
    }

    #[test]
    fn history_address_differs_from_component_address() {
        assert_ne!(
            component_address("acme", "button"),
            history_address("acme", "button")
        );
    }

    #[test]
    fn lane_address_is_assigned_hash() {
        let lane = Lane::create("feature-x", "acme", None, LaneLog::default()).unwrap();
        let hash = lane.hash.clone();
        assert_eq!(ObjectRecord::from(lane).address().unwrap(), hash);
    }

    #[test]
    fn tagged_serialization() {
        let record = ObjectRecord::Version(Version::initial(r('f')));
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"type\":\"version\""));
        let decoded: ObjectRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn roundtrip_every_kind() {
        let records = vec![
            ObjectRecord::Version(Version::initial(r('f'))),
            ObjectRecord::Component(ModelComponent::new("acme", "button")),
            ObjectRecord::Lane(Lane::create("dev", "acme", None, LaneLog::default()).unwrap()),
            ObjectRecord::VersionHistory(VersionHistory::new("acme", "button")),
            ObjectRecord::FileTree(FileTree::new()),
            ObjectRecord::Source(Source::new("x")),
        ];
        for record in records {
            let json = serde_json::to_string(&record).unwrap();
            let decoded: ObjectRecord = serde_json::from_str(&json).unwrap();
            assert_eq!(decoded.kind(), record.kind());
            assert_eq!(decoded.address().unwrap(), record.address().unwrap());
        }
    }

    #[test]
    fn only_immutable_kinds_are_content_addressed() {
        assert!(ObjectRecord::Source(Source::new("x")).is_content_addressed());
        assert!(ObjectRecord::Version(Version::initial(r('f'))).is_content_addressed());
        assert!(!ObjectRecord::Component(ModelComponent::new("a", "b")).is_content_addressed());
        assert!(!ObjectRecord::VersionHistory(VersionHistory::new("a", "b")).is_content_addressed());
    }
}
