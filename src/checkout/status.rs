//! Per-component status classification for checkout.
//!
//! Classification runs in two phases around the bulk import:
//!
//! 1. [`resolve_component_plan`] — resolve the target version ref and apply
//!    the early gates (new component, during-merge, unknown version,
//!    already-at, merge-pending).
//! 2. [`finalize_status`] — after missing targets were imported, load the
//!    target [`Version`] record and decide between removal, plain apply,
//!    and three-way merge.
//!
//! Failures here are data, not errors: they accumulate in the checkout
//! summary, split into *legitimate* no-ops (already-at, not-modified, new
//! component) and *hard* failures (missing version, merge-pending,
//! during-merge).

use std::fmt;
use std::path::Path;

use crate::bitmap::Bitmap;
use crate::error::WeftError;
use crate::model::{ComponentId, Lane, ModelComponent, Ref, Version};
use crate::store::ObjectStore;
use crate::traversal;

use super::{read_component_files, tree_contents, CheckoutTarget};

// ---------------------------------------------------------------------------
// FailureReason
// ---------------------------------------------------------------------------

/// Why a component was not applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureReason {
    /// The component has no model history yet — nothing to check out.
    NewComponent,
    /// A previous checkout left unresolved conflict markers.
    DuringMerge,
    /// The requested version does not exist (and could not be imported).
    MissingVersion {
        /// The version that was requested.
        version: String,
    },
    /// The workspace is already at the requested version.
    AlreadyAtVersion {
        /// The version in question.
        version: String,
    },
    /// The workspace is already at the head/latest version.
    AlreadyAtLatest,
    /// Local and remote heads have diverged; a merge must happen first.
    MergePending,
    /// The target version carries the removed marker.
    Removed,
    /// Reset requested but the component has no local modifications.
    NotModified,
}

impl FailureReason {
    /// Legitimate failures are expected no-ops; hard failures flip the
    /// process exit code.
    #[must_use]
    pub fn is_legitimate(&self) -> bool {
        matches!(
            self,
            Self::NewComponent
                | Self::AlreadyAtVersion { .. }
                | Self::AlreadyAtLatest
                | Self::Removed
                | Self::NotModified
        )
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NewComponent => write!(f, "new component, no version to checkout"),
            Self::DuringMerge => write!(f, "in during-merge state, please resolve"),
            Self::MissingVersion { version } => write!(f, "doesn't have version {version}"),
            Self::AlreadyAtVersion { version } => write!(f, "already at version {version}"),
            Self::AlreadyAtLatest => write!(f, "already at latest"),
            Self::MergePending => write!(f, "merge-pending; run status"),
            Self::Removed => write!(f, "component has been removed"),
            Self::NotModified => write!(f, "not modified"),
        }
    }
}

/// One component that was not applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentFailure {
    /// The component.
    pub id: ComponentId,
    /// Why it was skipped or refused.
    pub reason: FailureReason,
}

// ---------------------------------------------------------------------------
// Plans and statuses
// ---------------------------------------------------------------------------

/// A component that passed the early gates: its resolved target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutPlan {
    /// The component (version slot unused).
    pub id: ComponentId,
    /// The ref the workspace currently holds, when resolvable.
    pub current_ref: Option<Ref>,
    /// Display label of the target: a tag when one names it, else hex.
    pub target_label: String,
    /// The resolved target ref.
    pub target_ref: Ref,
}

/// Early-phase outcome: a failure, or a plan to carry forward.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EarlyStatus {
    /// Skipped or refused at the early gates.
    Failure(ComponentFailure),
    /// Carry on to import + finalize.
    Plan(CheckoutPlan),
}

/// Final classification of one component.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ComponentStatus {
    /// Skipped or refused.
    Failure(ComponentFailure),
    /// The target version is marked removed: delete from the workspace.
    ShouldBeRemoved {
        /// The component.
        id: ComponentId,
    },
    /// Ready to apply.
    Ready(ReadyComponent),
}

/// A component ready for apply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadyComponent {
    /// The resolved plan.
    pub plan: CheckoutPlan,
    /// The target version record.
    pub version: Version,
    /// Set when the working copy is modified and a three-way merge is
    /// required (never set for reset).
    pub needs_merge: bool,
}

// ---------------------------------------------------------------------------
// Phase 1: resolve + early gates
// ---------------------------------------------------------------------------

/// Resolve `id`'s target and run the early gates.
///
/// # Errors
/// Only on store failure; classification outcomes are data.
pub fn resolve_component_plan(
    store: &ObjectStore,
    bitmap: &Bitmap,
    lane: Option<&Lane>,
    target: &CheckoutTarget,
    version_override: Option<&str>,
    id: &ComponentId,
) -> Result<EarlyStatus, WeftError> {
    let fail = |reason| {
        Ok(EarlyStatus::Failure(ComponentFailure {
            id: id.without_version(),
            reason,
        }))
    };

    let Some(component) = store.get_component(&id.scope, &id.name)? else {
        return fail(FailureReason::NewComponent);
    };

    if bitmap.is_during_merge(id) {
        return fail(FailureReason::DuringMerge);
    }

    let current_label = bitmap.version_of(id).map(ToOwned::to_owned);
    let current_ref = current_label
        .as_deref()
        .and_then(|label| component.resolve_version(label));

    // Resolve the target ref. A per-id override is authoritative.
    let resolved = match version_override {
        Some(version) => component
            .resolve_version(version)
            .map(|r| (version.to_owned(), r))
            .ok_or(version.to_owned()),
        None => match target {
            CheckoutTarget::Head => match lane_head(lane, id).or_else(|| {
                component
                    .head_include_remote()
                    .map(|head| (component.version_label(head), head.clone()))
            }) {
                Some(resolved) => Ok(resolved),
                None => return fail(FailureReason::NewComponent),
            },
            CheckoutTarget::Latest => match component.latest_version_if_exist() {
                Some(tag) => {
                    let tag = tag.to_owned();
                    let target_ref = component.tags[&tag].clone();
                    Ok((tag, target_ref))
                }
                None => Err("latest".to_owned()),
            },
            CheckoutTarget::Reset => match (&current_label, &current_ref) {
                (Some(label), Some(target_ref)) => Ok((label.clone(), target_ref.clone())),
                _ => return fail(FailureReason::NewComponent),
            },
            CheckoutTarget::Version(version) => component
                .resolve_version(version)
                .map(|r| (version.clone(), r))
                .ok_or_else(|| version.clone()),
        },
    };

    let (target_label, target_ref) = match resolved {
        Ok(resolved) => resolved,
        Err(version) => return fail(FailureReason::MissingVersion { version }),
    };

    // Same-version no-op. Reset re-applies the current version on purpose.
    if !matches!(target, CheckoutTarget::Reset) && current_ref.as_ref() == Some(&target_ref) {
        return match target {
            CheckoutTarget::Head | CheckoutTarget::Latest if version_override.is_none() => {
                fail(FailureReason::AlreadyAtLatest)
            }
            _ => fail(FailureReason::AlreadyAtVersion {
                version: target_label,
            }),
        };
    }

    if is_merge_pending(store, &component)? {
        return fail(FailureReason::MergePending);
    }

    Ok(EarlyStatus::Plan(CheckoutPlan {
        id: id.without_version(),
        current_ref,
        target_label,
        target_ref,
    }))
}

/// A lane binding overrides the component head while the lane is active.
fn lane_head(lane: Option<&Lane>, id: &ComponentId) -> Option<(String, Ref)> {
    let binding = lane?.component(id)?;
    Some((binding.head.to_string(), binding.head.clone()))
}

fn is_merge_pending(store: &ObjectStore, component: &ModelComponent) -> Result<bool, WeftError> {
    let history = store.get_history(&component.scope, &component.name)?;
    Ok(traversal::is_merge_pending(component, &history))
}

// ---------------------------------------------------------------------------
// Phase 2: finalize after import
// ---------------------------------------------------------------------------

/// Complete classification once missing targets were imported.
///
/// # Errors
/// Only on store or filesystem failure.
pub fn finalize_status(
    store: &ObjectStore,
    workspace_dir: &Path,
    plan: CheckoutPlan,
    reset: bool,
) -> Result<ComponentStatus, WeftError> {
    let Some(version) = store.get_version(&plan.target_ref)? else {
        // The importer could not fetch it either: hard failure.
        return Ok(ComponentStatus::Failure(ComponentFailure {
            id: plan.id,
            reason: FailureReason::MissingVersion {
                version: plan.target_label,
            },
        }));
    };

    if version.removed {
        return Ok(ComponentStatus::ShouldBeRemoved { id: plan.id });
    }

    let modified = is_modified(store, workspace_dir, &plan)?;

    if reset {
        if !modified {
            return Ok(ComponentStatus::Failure(ComponentFailure {
                id: plan.id,
                reason: FailureReason::NotModified,
            }));
        }
        // Reset restores model content verbatim; no merge.
        return Ok(ComponentStatus::Ready(ReadyComponent {
            plan,
            version,
            needs_merge: false,
        }));
    }

    Ok(ComponentStatus::Ready(ReadyComponent {
        plan,
        version,
        needs_merge: modified,
    }))
}

/// Compare the working copy against the currently checked-out version.
fn is_modified(
    store: &ObjectStore,
    workspace_dir: &Path,
    plan: &CheckoutPlan,
) -> Result<bool, WeftError> {
    let Some(current_ref) = &plan.current_ref else {
        // Nothing to compare against.
        return Ok(false);
    };
    let Some(current_version) = store.get_version(current_ref)? else {
        tracing::warn!(
            component = %plan.id,
            %current_ref,
            "current version record is missing locally; treating as unmodified"
        );
        return Ok(false);
    };
    let tracked = tree_contents(store, &current_version.files)?;
    let on_disk = read_component_files(workspace_dir, &plan.id)?;
    Ok(tracked != on_disk)
}
