//! Workspace dependency-policy merge.
//!
//! After per-component merges, each component reports the dependency
//! versions it resolved cleanly and the ones that conflicted. This module
//! folds those reports into the workspace-level policy:
//!
//! 1. **Non-conflicting aggregation** — clean, auto-detected resolutions,
//!    grouped `pkg → set<version>`.
//! 2. **Conflicting aggregation** — failed merges, grouped
//!    `pkg → set<(ours, theirs)>`.
//!
//! A pkg with a single clean version that differs from the workspace value
//! schedules an update. A pkg with a single conflict tuple goes through the
//! semver decision table: a compatible incoming version clears the conflict
//! (and updates the policy, preserving the range operator); an incompatible
//! one is promoted to a workspace-level conflict. Either way the pkg is
//! removed from the per-component conflict sets.
//!
//! Unresolved workspace conflicts are encoded `CONFLICT::<ours>::<theirs>`
//! in the generated config; the config file itself is rewritten with
//! diff3-style markers via the file merger, and a failure to do so is
//! reported but non-fatal.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use semver::{Version as Semver, VersionReq};
use serde::{Deserialize, Serialize};

use crate::model::ComponentId;

use super::merge_file::{merge_contents, MergeFileOutcome};

/// Marker prefix for an unresolved policy conflict inside generated config.
pub const CONFLICT_PREFIX: &str = "CONFLICT";

/// Encode an unresolved conflict as `CONFLICT::<ours>::<theirs>`.
#[must_use]
pub fn encode_conflict(ours: &str, theirs: &str) -> String {
    format!("{CONFLICT_PREFIX}::{ours}::{theirs}")
}

/// Parse a `CONFLICT::<ours>::<theirs>` encoding.
#[must_use]
pub fn parse_conflict(value: &str) -> Option<(String, String)> {
    let rest = value.strip_prefix(CONFLICT_PREFIX)?.strip_prefix("::")?;
    let (ours, theirs) = rest.split_once("::")?;
    Some((ours.to_owned(), theirs.to_owned()))
}

// ---------------------------------------------------------------------------
// Policy types
// ---------------------------------------------------------------------------

/// The workspace dependency policy: the recognized fields only.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspacePolicy {
    /// Runtime dependencies.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
    /// Peer dependencies.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub peer_dependencies: BTreeMap<String, String>,
}

impl WorkspacePolicy {
    /// The policy value for `pkg`, searching both fields.
    #[must_use]
    pub fn get(&self, pkg: &str) -> Option<&str> {
        self.dependencies
            .get(pkg)
            .or_else(|| self.peer_dependencies.get(pkg))
            .map(String::as_str)
    }

    /// Update `pkg` in whichever field holds it. Returns `false` when the
    /// pkg is not part of the policy.
    pub fn set(&mut self, pkg: &str, value: impl Into<String>) -> bool {
        let value = value.into();
        if let Some(slot) = self.dependencies.get_mut(pkg) {
            *slot = value;
            return true;
        }
        if let Some(slot) = self.peer_dependencies.get_mut(pkg) {
            *slot = value;
            return true;
        }
        false
    }

    /// All pkg names in the policy, sorted.
    #[must_use]
    pub fn packages(&self) -> Vec<String> {
        let mut pkgs: BTreeSet<&String> = self.dependencies.keys().collect();
        pkgs.extend(self.peer_dependencies.keys());
        pkgs.into_iter().cloned().collect()
    }
}

/// One clean dependency resolution reported by a component merge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DepResolution {
    /// Package name.
    pub pkg: String,
    /// Resolved version or range.
    pub version: String,
    /// Set when the dependency was pinned by the user rather than
    /// auto-detected; forced entries never drive workspace updates.
    pub force: bool,
}

/// One conflicted dependency reported by a component merge.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct DepConflict {
    /// Package name.
    pub pkg: String,
    /// The workspace/current side.
    pub ours: String,
    /// The incoming side.
    pub theirs: String,
}

/// The dependency-policy outcome of one component's merge.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ComponentPolicyOutcome {
    /// The component these entries belong to.
    pub id: Option<ComponentId>,
    /// Clean resolutions.
    pub resolved: Vec<DepResolution>,
    /// Failed merges.
    pub conflicts: Vec<DepConflict>,
}

/// A scheduled workspace policy update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyUpdate {
    /// Package name.
    pub pkg: String,
    /// The previous policy value.
    pub from: String,
    /// The new policy value.
    pub to: String,
}

/// The outcome of the workspace policy merge.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PolicyMergeResult {
    /// Updates applied to the workspace policy.
    pub updates: Vec<PolicyUpdate>,
    /// Conflicts promoted to the workspace level.
    pub conflicts: Vec<DepConflict>,
}

impl PolicyMergeResult {
    /// Returns `true` when no workspace-level conflict remains.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Decision table
// ---------------------------------------------------------------------------

/// The decision for one `(ours, theirs)` pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VariantDecision {
    /// Incompatible: record a conflict.
    Conflict,
    /// Nothing to do.
    NoUpdate,
    /// Update the policy to this value.
    UpdateTo(String),
    /// One side is not valid semver (likely a snap hash): skip entirely.
    Skip,
}

/// The minimum version a range admits: the version of its first comparator
/// with missing minor/patch parts as zero.
fn range_min(req: &VersionReq) -> Option<Semver> {
    let comparator = req.comparators.first()?;
    Some(Semver::new(
        comparator.major,
        comparator.minor.unwrap_or(0),
        comparator.patch.unwrap_or(0),
    ))
}

/// Carry the range operator of `current` (e.g. `^`/`~`) onto the plain
/// version `version`.
fn carry_prefix(current: &str, version: &str) -> String {
    let prefix: String = current
        .chars()
        .take_while(|c| !c.is_ascii_digit())
        .collect();
    format!("{prefix}{version}")
}

/// Classify a workspace policy value against an incoming one.
///
/// `ours` is the current workspace value; `theirs` is the incoming side of
/// a component conflict. Each side is a plain version or a range; anything
/// that is neither (a snap hash) is skipped.
#[must_use]
pub fn decide(ours: &str, theirs: &str) -> VariantDecision {
    let ours_version = Semver::parse(ours).ok();
    let theirs_version = Semver::parse(theirs).ok();
    let ours_range = match ours_version {
        Some(_) => None,
        None => VersionReq::parse(ours).ok(),
    };
    let theirs_range = match theirs_version {
        Some(_) => None,
        None => VersionReq::parse(theirs).ok(),
    };

    match (ours_version, ours_range, theirs_version, theirs_range) {
        (Some(ours), None, Some(theirs), None) => {
            if theirs > ours {
                VariantDecision::Conflict
            } else {
                VariantDecision::NoUpdate
            }
        }
        (None, Some(ours_req), None, Some(theirs_req)) => {
            match (range_min(&ours_req), range_min(&theirs_req)) {
                (Some(ours_min), Some(theirs_min)) if theirs_min > ours_min => {
                    VariantDecision::UpdateTo(theirs.to_owned())
                }
                _ => VariantDecision::NoUpdate,
            }
        }
        (None, Some(ours_req), Some(theirs_ver), None) => {
            if ours_req.matches(&theirs_ver) {
                // Compatible: move the policy floor up to the incoming
                // version, preserving the range operator.
                VariantDecision::UpdateTo(carry_prefix(ours, theirs))
            } else if range_min(&ours_req).is_some_and(|min| min > theirs_ver) {
                VariantDecision::Conflict
            } else {
                VariantDecision::NoUpdate
            }
        }
        (Some(ours_ver), None, None, Some(theirs_req)) => {
            if theirs_req.matches(&ours_ver) {
                VariantDecision::UpdateTo(theirs.to_owned())
            } else {
                // Covers min(theirs) > ours and every other mismatch.
                VariantDecision::NoUpdate
            }
        }
        _ => VariantDecision::Skip,
    }
}

// ---------------------------------------------------------------------------
// Workspace merge
// ---------------------------------------------------------------------------

/// Fold per-component policy outcomes into the workspace policy.
///
/// Applies updates to `policy` in place, clears promoted conflicts from
/// `outcomes`, and returns the scheduled updates plus any workspace-level
/// conflicts.
pub fn merge_workspace_policy(
    policy: &mut WorkspacePolicy,
    outcomes: &mut [ComponentPolicyOutcome],
) -> PolicyMergeResult {
    // Pass 1: clean, auto-detected resolutions.
    let mut clean: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for outcome in outcomes.iter() {
        for resolution in outcome.resolved.iter().filter(|r| !r.force) {
            clean
                .entry(resolution.pkg.as_str())
                .or_default()
                .insert(resolution.version.as_str());
        }
    }

    // Pass 2: conflicts.
    let mut conflicting: BTreeMap<&str, BTreeSet<(&str, &str)>> = BTreeMap::new();
    for outcome in outcomes.iter() {
        for conflict in &outcome.conflicts {
            conflicting
                .entry(conflict.pkg.as_str())
                .or_default()
                .insert((conflict.ours.as_str(), conflict.theirs.as_str()));
        }
    }

    let mut updates = Vec::new();
    let mut workspace_conflicts = Vec::new();
    let mut promoted: BTreeSet<String> = BTreeSet::new();

    for pkg in policy.packages() {
        let current = policy
            .get(&pkg)
            .expect("packages() only lists policy members")
            .to_owned();

        if let Some(versions) = clean.get(pkg.as_str()) {
            if versions.len() == 1 {
                let version = versions.iter().next().expect("len checked");
                if *version != current {
                    let to = if Semver::parse(version).is_ok() {
                        carry_prefix(&current, version)
                    } else {
                        (*version).to_owned()
                    };
                    if to != current {
                        updates.push(PolicyUpdate {
                            pkg: pkg.clone(),
                            from: current.clone(),
                            to: to.clone(),
                        });
                        policy.set(&pkg, to);
                    }
                }
            }
        }

        if let Some(tuples) = conflicting.get(pkg.as_str()) {
            if tuples.len() == 1 {
                let (_, theirs) = tuples.iter().next().expect("len checked");
                let current = policy
                    .get(&pkg)
                    .expect("packages() only lists policy members")
                    .to_owned();
                match decide(&current, theirs) {
                    VariantDecision::UpdateTo(to) => {
                        if to != current {
                            updates.push(PolicyUpdate {
                                pkg: pkg.clone(),
                                from: current,
                                to: to.clone(),
                            });
                            policy.set(&pkg, to);
                        }
                    }
                    VariantDecision::Conflict => {
                        workspace_conflicts.push(DepConflict {
                            pkg: pkg.clone(),
                            ours: current,
                            theirs: (*theirs).to_owned(),
                        });
                    }
                    VariantDecision::NoUpdate | VariantDecision::Skip => {}
                }
                // Promoted to workspace level either way.
                promoted.insert(pkg.clone());
            }
        }
    }

    for outcome in outcomes.iter_mut() {
        outcome
            .conflicts
            .retain(|conflict| !promoted.contains(&conflict.pkg));
    }

    PolicyMergeResult {
        updates,
        conflicts: workspace_conflicts,
    }
}

// ---------------------------------------------------------------------------
// Conflict write-back
// ---------------------------------------------------------------------------

fn render_policy(policy: &WorkspacePolicy) -> String {
    let mut text =
        serde_json::to_string_pretty(policy).expect("policy serialization is infallible");
    text.push('\n');
    text
}

/// Rewrite the workspace config at `path` with the merged policy.
///
/// When workspace-level conflicts remain, the file is written with
/// diff3-style conflict markers produced by the file merger (ours vs
/// theirs over a base without the conflicted entries). When the marker
/// merge cannot be produced, the conflicts are encoded
/// `CONFLICT::<ours>::<theirs>` instead — reported, never fatal.
///
/// # Errors
/// Only on the final file write.
pub fn write_policy_file(
    path: &Path,
    policy: &WorkspacePolicy,
    conflicts: &[DepConflict],
) -> std::io::Result<()> {
    if conflicts.is_empty() {
        return fs::write(path, render_policy(policy));
    }

    let mut base = policy.clone();
    let mut ours = policy.clone();
    let mut theirs = policy.clone();
    for conflict in conflicts {
        base.dependencies.remove(&conflict.pkg);
        base.peer_dependencies.remove(&conflict.pkg);
        ours.set(&conflict.pkg, conflict.ours.clone());
        theirs.set(&conflict.pkg, conflict.theirs.clone());
    }

    match merge_contents(
        &render_policy(&base),
        &render_policy(&ours),
        &render_policy(&theirs),
        "workspace",
        "incoming",
    ) {
        Ok(outcome @ MergeFileOutcome::Conflict { .. }) => {
            fs::write(path, outcome.into_contents())
        }
        Ok(MergeFileOutcome::Clean(_)) | Err(_) => {
            // Could not produce markers; fall back to the inline encoding.
            tracing::warn!(
                path = %path.display(),
                "could not render conflict markers into workspace config; using inline encoding"
            );
            let mut encoded = policy.clone();
            for conflict in conflicts {
                encoded.set(&conflict.pkg, encode_conflict(&conflict.ours, &conflict.theirs));
            }
            fs::write(path, render_policy(&encoded))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
