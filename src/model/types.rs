//! Core identifier types for weft.
//!
//! Foundation types used throughout the crate: content addresses ([`Ref`]),
//! component identifiers ([`ComponentId`]), and lane identifiers ([`LaneId`]).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

// ---------------------------------------------------------------------------
// Ref
// ---------------------------------------------------------------------------

/// A validated 40-character lowercase hex content address (SHA-1).
///
/// Equality is byte-wise. The short form ([`Ref::short`]) is the first nine
/// characters and is for display only — never identity.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ref(String);

impl Ref {
    /// Number of hex characters in a full ref.
    pub const LEN: usize = 40;

    /// Number of characters in the short display form.
    pub const SHORT_LEN: usize = 9;

    /// Create a new `Ref` from a string, validating format.
    ///
    /// # Errors
    /// Returns an error if the string is not exactly 40 lowercase hex
    /// characters.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        Self::validate(s)?;
        Ok(Self(s.to_owned()))
    }

    /// Hash arbitrary bytes into a `Ref` (SHA-1, hex-encoded).
    #[must_use]
    pub fn for_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(bytes);
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(Self::LEN);
        for byte in digest {
            use fmt::Write;
            let _ = write!(hex, "{byte:02x}");
        }
        Self(hex)
    }

    /// Generate a fresh random `Ref` by hashing a v4 UUID.
    ///
    /// Used for records whose identity is assigned rather than derived from
    /// content (lanes).
    #[must_use]
    pub fn random() -> Self {
        Self::for_bytes(uuid::Uuid::new_v4().as_bytes())
    }

    /// Return the inner hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Return the short display form (first nine characters).
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..Self::SHORT_LEN]
    }

    /// Returns `true` if `s` is a well-formed ref string.
    #[must_use]
    pub fn is_valid(s: &str) -> bool {
        Self::validate(s).is_ok()
    }

    fn validate(s: &str) -> Result<(), ValidationError> {
        if s.len() != Self::LEN {
            return Err(ValidationError {
                kind: ErrorKind::Ref,
                value: s.to_owned(),
                reason: format!("expected {} hex characters, got {}", Self::LEN, s.len()),
            });
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        {
            return Err(ValidationError {
                kind: ErrorKind::Ref,
                value: s.to_owned(),
                reason: "must contain only lowercase hex characters (0-9, a-f)".to_owned(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ref({})", self.0)
    }
}

impl FromStr for Ref {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Ref {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}

impl From<Ref> for String {
    fn from(r: Ref) -> Self {
        r.0
    }
}

// ---------------------------------------------------------------------------
// ComponentId
// ---------------------------------------------------------------------------

/// A component identifier: `(scope, name)` plus an optional version slot.
///
/// The version slot holds either a semver tag (`"1.0.1"`) or a 40-hex snap
/// ref. Two ids are the *same component* when scope and name match,
/// regardless of version.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId {
    /// The owning scope.
    pub scope: String,
    /// The component name within the scope.
    pub name: String,
    /// Optional version: a semver tag or a snap ref in hex form.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ComponentId {
    /// Create an id without a version.
    #[must_use]
    pub fn new(scope: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            name: name.into(),
            version: None,
        }
    }

    /// Create an id carrying a version (tag or snap hex).
    #[must_use]
    pub fn with_version(
        scope: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            scope: scope.into(),
            name: name.into(),
            version: Some(version.into()),
        }
    }

    /// The version-insensitive identity string, `scope/name`.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.scope, self.name)
    }

    /// Returns `true` if `other` names the same component, ignoring version.
    #[must_use]
    pub fn same_component(&self, other: &Self) -> bool {
        self.scope == other.scope && self.name == other.name
    }

    /// Return a copy of this id with the version slot cleared.
    #[must_use]
    pub fn without_version(&self) -> Self {
        Self {
            scope: self.scope.clone(),
            name: self.name.clone(),
            version: None,
        }
    }

    /// Return a copy of this id carrying `version`.
    #[must_use]
    pub fn at_version(&self, version: impl Into<String>) -> Self {
        Self {
            scope: self.scope.clone(),
            name: self.name.clone(),
            version: Some(version.into()),
        }
    }

    /// Returns `true` if the version slot holds a snap ref (40-hex) rather
    /// than a tag.
    #[must_use]
    pub fn has_snap_version(&self) -> bool {
        self.version.as_deref().is_some_and(Ref::is_valid)
    }

    /// Parse `scope/name[@version]`.
    ///
    /// # Errors
    /// Returns an error when the string has no `/` separator or an empty
    /// scope/name part.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let invalid = |reason: &str| ValidationError {
            kind: ErrorKind::ComponentId,
            value: s.to_owned(),
            reason: reason.to_owned(),
        };
        let (id_part, version) = match s.split_once('@') {
            Some((id, v)) if !v.is_empty() => (id, Some(v.to_owned())),
            Some(_) => return Err(invalid("empty version after '@'")),
            None => (s, None),
        };
        let (scope, name) = id_part
            .split_once('/')
            .ok_or_else(|| invalid("expected scope/name"))?;
        if scope.is_empty() || name.is_empty() {
            return Err(invalid("scope and name must be non-empty"));
        }
        Ok(Self {
            scope: scope.to_owned(),
            name: name.to_owned(),
            version,
        })
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope, self.name)?;
        if let Some(version) = &self.version {
            write!(f, "@{version}")?;
        }
        Ok(())
    }
}

impl FromStr for ComponentId {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// LaneId
// ---------------------------------------------------------------------------

/// A lane identifier: `(scope, name)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LaneId {
    /// The owning scope.
    pub scope: String,
    /// The lane name.
    pub name: String,
}

impl LaneId {
    /// Create a lane id.
    #[must_use]
    pub fn new(scope: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope, self.name)
    }
}

// ---------------------------------------------------------------------------
// Validation errors
// ---------------------------------------------------------------------------

/// The kind of value that failed validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A [`Ref`] validation error.
    Ref,
    /// A [`ComponentId`] validation error.
    ComponentId,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ref => write!(f, "Ref"),
            Self::ComponentId => write!(f, "ComponentId"),
        }
    }
}

/// A validation error for weft identifier types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    /// What kind of value was being validated.
    pub kind: ErrorKind,
    /// The invalid value.
    pub value: String,
    /// Human-readable explanation.
    pub reason: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {:?}: {}", self.kind, self.value, self.reason)
    }
}

impl std::error::Error for ValidationError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
