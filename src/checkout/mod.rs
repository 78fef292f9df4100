//! The checkout engine: reconcile the working copy with a chosen version.
//!
//! One invocation runs the pipeline:
//!
//! 1.  validate the props (exactly one target; ids or `--all`, not both;
//!     `workspace_only` only with head);
//! 2.  resolve participating ids, intersecting with the active lane;
//! 3.  for head: attempt to import still-unknown ids (failures logged and
//!     swallowed — they may be genuinely new components);
//! 4.  classify each component (early gates), then
//! 5.  bulk-import missing target versions (no deps) and finish
//!     classification;
//! 6.  three-way merge the modified subset; conflicts without a
//!     pre-selected strategy abort the operation (or go through the prompt
//!     capability when enabled);
//! 7.  apply sequentially — one component's final file set is computed
//!     before the next starts, because components may depend on each other
//!     and share on-disk layout;
//! 8.  for head with an active lane, hydrate lane components missing from
//!     the workspace (new-from-lane);
//! 9.  write back through the host, then update the bitmap (only after a
//!     successful write);
//! 10. delete components whose target version is marked removed;
//! 11. report the summary.
//!
//! The workspace lock is held for the whole operation; the importer cache
//! is invalidated at operation start.

pub mod status;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::bitmap::{Bitmap, CheckoutLock};
use crate::error::WeftError;
use crate::host::{ComponentWrite, FileWrite, Host, ImportOptions, WriteRequest};
use crate::merge::{merge_files, FilesMergeResult, MergeStrategy};
use crate::model::{ComponentId, Lane, Ref};
use crate::store::ObjectStore;

use status::{
    ComponentFailure, ComponentStatus, EarlyStatus, FailureReason, ReadyComponent,
};

// ---------------------------------------------------------------------------
// Props
// ---------------------------------------------------------------------------

/// What to check out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckoutTarget {
    /// The component's main head (lane head while a lane is active).
    Head,
    /// The greatest semver tag.
    Latest,
    /// Re-apply the currently checked-out version (restore model content).
    Reset,
    /// A literal version: tag or snap hex.
    Version(String),
}

/// One checkout invocation.
#[derive(Clone, Debug)]
pub struct CheckoutProps {
    /// The target to reconcile to.
    pub target: CheckoutTarget,
    /// Explicit component ids. Mutually exclusive with `all`.
    pub ids: Vec<ComponentId>,
    /// Operate on every tracked component. Mutually exclusive with `ids`.
    pub all: bool,
    /// Pre-selected conflict resolution strategy.
    pub merge_strategy: Option<MergeStrategy>,
    /// Ask the host for a strategy when conflicts appear and none was
    /// pre-selected.
    pub prompt_merge_options: bool,
    /// Only adjust workspace state; never hydrate new components.
    pub workspace_only: bool,
    /// Update the bitmap without touching files.
    pub skip_files_write: bool,
    /// Skip dependency installation after write-back.
    pub skip_dependency_installation: bool,
    /// Authoritative per-id targets, keyed by `scope/name`; `target`
    /// governs every other id.
    pub version_per_id: BTreeMap<String, String>,
    /// Verbose reporting.
    pub verbose: bool,
}

impl CheckoutProps {
    /// Props for the given target with everything else defaulted.
    #[must_use]
    pub fn new(target: CheckoutTarget) -> Self {
        Self {
            target,
            ids: Vec::new(),
            all: false,
            merge_strategy: None,
            prompt_merge_options: false,
            workspace_only: false,
            skip_files_write: false,
            skip_dependency_installation: false,
            version_per_id: BTreeMap::new(),
            verbose: false,
        }
    }

    fn validate(&self) -> Result<(), WeftError> {
        let invalid = |reason: &str| {
            Err(WeftError::InvalidArguments {
                reason: reason.to_owned(),
            })
        };
        if self.all && !self.ids.is_empty() {
            return invalid("pass component ids or --all, not both");
        }
        if !self.all && self.ids.is_empty() && self.version_per_id.is_empty() {
            return invalid("pass component ids or --all");
        }
        if self.workspace_only && !matches!(self.target, CheckoutTarget::Head) {
            return invalid("--workspace-only is only valid with `checkout head`");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// One component that was not applied, with its legitimacy split.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailedComponent {
    /// The component.
    pub id: ComponentId,
    /// Why it was skipped or refused.
    pub reason: FailureReason,
    /// Expected no-ops (already-at, not-modified, new) do not flip the
    /// exit code.
    pub unchanged_legitimately: bool,
}

impl From<ComponentFailure> for FailedComponent {
    fn from(failure: ComponentFailure) -> Self {
        let unchanged_legitimately = failure.reason.is_legitimate();
        Self {
            id: failure.id,
            reason: failure.reason,
            unchanged_legitimately,
        }
    }
}

/// The checkout summary.
#[derive(Clone, Debug, Default)]
pub struct CheckoutResult {
    /// Components whose files and bitmap entries were updated.
    pub applied: Vec<ComponentId>,
    /// Components deleted because their target version is marked removed.
    pub removed: Vec<ComponentId>,
    /// Components that were not applied.
    pub failed: Vec<FailedComponent>,
    /// Set when conflict markers were left in the working copy.
    pub left_unresolved_conflicts: bool,
    /// Lane components that exist on the lane but not in the workspace.
    pub new_from_lane: Vec<ComponentId>,
    /// Set when new-from-lane components were actually hydrated (never
    /// with `workspace_only`).
    pub new_from_lane_added: bool,
    /// Dependency installation failure from write-back, when any.
    pub installation_error: Option<String>,
    /// Compilation failure from write-back, when any.
    pub compilation_error: Option<String>,
}

impl CheckoutResult {
    /// The process exit code: 1 when any failure is not a legitimate no-op.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        let hard = self
            .failed
            .iter()
            .any(|failure| !failure.unchanged_legitimately);
        i32::from(hard)
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The checkout engine over one workspace.
pub struct CheckoutEngine<'a, H: Host> {
    store: &'a ObjectStore,
    bitmap: &'a mut Bitmap,
    lane: Option<&'a Lane>,
    workspace_dir: &'a Path,
    weft_dir: &'a Path,
    host: &'a mut H,
}

impl<'a, H: Host> CheckoutEngine<'a, H> {
    /// Assemble an engine over the given workspace state.
    pub fn new(
        store: &'a ObjectStore,
        bitmap: &'a mut Bitmap,
        lane: Option<&'a Lane>,
        workspace_dir: &'a Path,
        weft_dir: &'a Path,
        host: &'a mut H,
    ) -> Self {
        Self {
            store,
            bitmap,
            lane,
            workspace_dir,
            weft_dir,
            host,
        }
    }

    /// Run one checkout.
    ///
    /// # Errors
    /// Validation and precondition errors unwind immediately; per-component
    /// failures accumulate in the returned summary instead.
    pub fn checkout(&mut self, props: &CheckoutProps) -> Result<CheckoutResult, WeftError> {
        props.validate()?;
        let _lock = CheckoutLock::acquire(self.weft_dir.join("checkout.lock"))?;
        self.host.invalidate_import_cache();

        // Step 2: resolve participating ids.
        let mut ids: Vec<ComponentId> = if props.all {
            self.bitmap
                .tracked_ids()
                .into_iter()
                .map(|id| id.without_version())
                .collect()
        } else {
            let mut ids: Vec<ComponentId> =
                props.ids.iter().map(ComponentId::without_version).collect();
            for key in props.version_per_id.keys() {
                if let Ok(id) = ComponentId::parse(key) {
                    ids.push(id.without_version());
                }
            }
            ids
        };
        if let Some(lane) = self.lane {
            ids.retain(|id| lane.has_component(id));
        }
        ids.sort();
        ids.dedup();
        tracing::debug!(count = ids.len(), "checkout participants resolved");

        // Step 3: sync possibly-new components (head only).
        if matches!(props.target, CheckoutTarget::Head) {
            let mut unknown: Vec<ComponentId> = Vec::new();
            for id in &ids {
                if self.store.get_component(&id.scope, &id.name)?.is_none() {
                    unknown.push(id.clone());
                }
            }
            if !unknown.is_empty() {
                if let Err(e) = self.host.import_many_if_missing(
                    &unknown,
                    &ImportOptions {
                        with_deps: false,
                        cache: true,
                    },
                ) {
                    tracing::warn!("sync of possibly-new components failed: {e}");
                }
            }
        }

        // Step 4a: early classification.
        let mut failed: Vec<FailedComponent> = Vec::new();
        let mut plans = Vec::new();
        for id in &ids {
            let version_override = props
                .version_per_id
                .get(&id.full_name())
                .map(String::as_str);
            match status::resolve_component_plan(
                self.store,
                self.bitmap,
                self.lane,
                &props.target,
                version_override,
                id,
            )? {
                EarlyStatus::Failure(failure) => failed.push(failure.into()),
                EarlyStatus::Plan(plan) => plans.push(plan),
            }
        }

        // Step 5: bulk-import missing target versions, without deps.
        let missing: Vec<ComponentId> = plans
            .iter()
            .filter(|plan| !self.store.has(&plan.target_ref))
            .map(|plan| plan.id.at_version(plan.target_ref.to_string()))
            .collect();
        if !missing.is_empty() {
            if let Err(e) = self.host.import_many_if_missing(
                &missing,
                &ImportOptions {
                    with_deps: false,
                    cache: false,
                },
            ) {
                tracing::warn!("bulk import of missing target versions failed: {e}");
            }
        }

        // Step 4b: finalize classification.
        let reset = matches!(props.target, CheckoutTarget::Reset);
        let mut removals: Vec<ComponentId> = Vec::new();
        let mut ready: Vec<ReadyComponent> = Vec::new();
        for plan in plans {
            match status::finalize_status(self.store, self.workspace_dir, plan, reset)? {
                ComponentStatus::Failure(failure) => failed.push(failure.into()),
                ComponentStatus::ShouldBeRemoved { id } => removals.push(id),
                ComponentStatus::Ready(component) => ready.push(component),
            }
        }

        // Step 6: three-way merges for the modified subset.
        let mut strategy = props.merge_strategy;
        let mut merge_results = self.run_merges(&ready, strategy)?;
        let offender = ready
            .iter()
            .zip(&merge_results)
            .find(|(_, merge)| merge.as_ref().is_some_and(|m| m.has_conflicts))
            .map(|(component, _)| component.plan.id.clone());
        if let Some(offender) = offender {
            if strategy.is_none() {
                if props.prompt_merge_options {
                    let chosen = self.host.prompt_merge_strategy();
                    tracing::debug!(%chosen, "merge strategy chosen via prompt");
                    strategy = Some(chosen);
                    if chosen != MergeStrategy::Manual {
                        merge_results = self.run_merges(&ready, strategy)?;
                    }
                } else {
                    return Err(WeftError::MergeAborted { id: offender });
                }
            }
        }
        let left_unresolved_conflicts = merge_results
            .iter()
            .flatten()
            .any(|merge| merge.has_conflicts);

        // Step 7: sequential apply — never parallel: one component may be
        // another's dependency and the on-disk layout is shared.
        let mut writes: Vec<ComponentWrite> = Vec::new();
        let mut bitmap_updates: Vec<BitmapUpdate> = Vec::new();
        let mut applied: Vec<ComponentId> = Vec::new();
        for (component, merge) in ready.iter().zip(&merge_results) {
            let (files, during_merge) = match merge {
                Some(result) => (
                    result
                        .files
                        .iter()
                        .map(|file| FileWrite {
                            path: file.path.clone(),
                            contents: file.contents.clone(),
                        })
                        .collect::<Vec<_>>(),
                    result.has_conflicts,
                ),
                None => {
                    let target = tree_contents(self.store, &component.version.files)?;
                    let tracked = self
                        .bitmap
                        .entry(&component.plan.id)
                        .map(|entry| entry.files.clone())
                        .unwrap_or_default();
                    let mut files: Vec<FileWrite> = target
                        .iter()
                        .map(|(path, contents)| FileWrite {
                            path: path.clone(),
                            contents: Some(contents.clone()),
                        })
                        .collect();
                    // Files from the previous version with no counterpart in
                    // the target are deleted.
                    files.extend(
                        tracked
                            .into_iter()
                            .filter(|path| !target.contains_key(path))
                            .map(|path| FileWrite {
                                path,
                                contents: None,
                            }),
                    );
                    (files, false)
                }
            };
            let kept: Vec<String> = files
                .iter()
                .filter(|file| file.contents.is_some())
                .map(|file| file.path.clone())
                .collect();
            writes.push(ComponentWrite {
                id: component.plan.id.clone(),
                files,
            });
            bitmap_updates.push(BitmapUpdate {
                id: component.plan.id.clone(),
                version: component.plan.target_label.clone(),
                files: kept,
                during_merge,
            });
            applied.push(component.plan.id.clone());
        }

        // Step 8: new-from-lane.
        let mut new_from_lane: Vec<ComponentId> = Vec::new();
        let mut new_from_lane_added = false;
        if matches!(props.target, CheckoutTarget::Head) {
            if let Some(lane) = self.lane {
                for binding in &lane.components {
                    if ids.iter().any(|id| id.same_component(&binding.id)) {
                        continue;
                    }
                    if self.bitmap.entry(&binding.id).is_some() {
                        continue;
                    }
                    new_from_lane.push(binding.id.without_version());
                    if props.workspace_only {
                        continue;
                    }
                    match self.hydrate_from_lane(binding.id.without_version(), &binding.head)? {
                        Ok(write) => {
                            bitmap_updates.push(BitmapUpdate {
                                id: write.id.clone(),
                                version: binding.head.to_string(),
                                files: write
                                    .files
                                    .iter()
                                    .map(|file| file.path.clone())
                                    .collect(),
                                during_merge: false,
                            });
                            writes.push(write);
                            new_from_lane_added = true;
                        }
                        Err(failure) => failed.push(failure.into()),
                    }
                }
            }
        }

        // Step 9: write back, then update the bitmap.
        let skip_install = props.skip_dependency_installation
            || (left_unresolved_conflicts
                && matches!(strategy, None | Some(MergeStrategy::Manual)));
        let mut installation_error = None;
        let mut compilation_error = None;
        if !props.skip_files_write && !writes.is_empty() {
            let outcome = self.host.write_many(&WriteRequest {
                components: writes,
                skip_dependency_installation: skip_install,
                reset_config: reset,
                verbose: props.verbose,
                skip_bitmap: true,
            })?;
            installation_error = outcome.installation_error;
            compilation_error = outcome.compilation_error;
        }
        for update in bitmap_updates {
            self.bitmap.set_version(&update.id, update.version);
            self.bitmap.set_files(&update.id, update.files);
            if update.during_merge {
                self.bitmap.mark_during_merge(&update.id);
            } else {
                self.bitmap.clear_during_merge(&update.id);
            }
        }

        // Step 10: removals.
        if !removals.is_empty() {
            self.host.remove_locally(&removals, true)?;
            for id in &removals {
                self.bitmap.remove(id);
            }
        }
        self.bitmap.save()?;

        // Step 11: summary.
        Ok(CheckoutResult {
            applied,
            removed: removals,
            failed,
            left_unresolved_conflicts,
            new_from_lane,
            new_from_lane_added,
            installation_error,
            compilation_error,
        })
    }

    /// Merge the modified subset. Entries are `None` for components that
    /// need no merge.
    fn run_merges(
        &self,
        ready: &[ReadyComponent],
        strategy: Option<MergeStrategy>,
    ) -> Result<Vec<Option<FilesMergeResult>>, WeftError> {
        ready
            .iter()
            .map(|component| {
                if !component.needs_merge {
                    return Ok(None);
                }
                // Stash → switch → pop: the checked-out version serves as the
                // merge base, so the local modifications land on top of it
                // instead of being re-subtracted.
                let target = tree_contents(self.store, &component.version.files)?;
                let current = read_component_files(self.workspace_dir, &component.plan.id)?;
                let current_label = format!(
                    "{}-modified",
                    self.bitmap
                        .version_of(&component.plan.id)
                        .unwrap_or("workspace")
                );
                let result = merge_files(
                    &target,
                    &current,
                    &target,
                    strategy,
                    &current_label,
                    &component.plan.target_label,
                )?;
                Ok(Some(result))
            })
            .collect()
    }

    /// Hydrate one lane component that is absent from the workspace.
    fn hydrate_from_lane(
        &mut self,
        id: ComponentId,
        head: &Ref,
    ) -> Result<Result<ComponentWrite, ComponentFailure>, WeftError> {
        if !self.store.has(head) {
            let id_at = id.at_version(head.to_string());
            if let Err(e) = self.host.import_many_if_missing(
                &[id_at],
                &ImportOptions {
                    with_deps: false,
                    cache: false,
                },
            ) {
                tracing::warn!(component = %id, "import of lane component failed: {e}");
            }
        }
        let Some(version) = self.store.get_version(head)? else {
            return Ok(Err(ComponentFailure {
                id,
                reason: FailureReason::MissingVersion {
                    version: head.to_string(),
                },
            }));
        };
        let contents = tree_contents(self.store, &version.files)?;
        let files = contents
            .into_iter()
            .map(|(path, contents)| FileWrite {
                path,
                contents: Some(contents),
            })
            .collect();
        Ok(Ok(ComponentWrite { id, files }))
    }
}

/// One queued bitmap mutation, applied only after a successful write.
struct BitmapUpdate {
    id: ComponentId,
    version: String,
    files: Vec<String>,
    during_merge: bool,
}

// ---------------------------------------------------------------------------
// File helpers
// ---------------------------------------------------------------------------

/// Load a file tree's contents as `relative path → text`.
///
/// A tree or source missing from the store is logged and skipped — the
/// record may not have been imported; corruption is still fatal.
pub(crate) fn tree_contents(
    store: &ObjectStore,
    files_ref: &Ref,
) -> Result<BTreeMap<String, String>, WeftError> {
    let Some(tree) = store.get_file_tree(files_ref)? else {
        tracing::warn!(%files_ref, "file tree record is missing locally");
        return Ok(BTreeMap::new());
    };
    let mut contents = BTreeMap::new();
    for (path, entry) in &tree.files {
        match store.get_source(&entry.source)? {
            Some(source) => {
                contents.insert(path.clone(), source.contents);
            }
            None => {
                tracing::warn!(%path, source = %entry.source, "source record is missing locally");
            }
        }
    }
    Ok(contents)
}

/// Read a component's on-disk files as `relative path → text`.
///
/// A missing component directory yields an empty map. Unreadable files are
/// skipped with a warning.
pub(crate) fn read_component_files(
    workspace_dir: &Path,
    id: &ComponentId,
) -> Result<BTreeMap<String, String>, WeftError> {
    let root = workspace_dir.join(&id.scope).join(&id.name);
    let mut contents = BTreeMap::new();
    if !root.is_dir() {
        return Ok(contents);
    }

    let mut pending: Vec<PathBuf> = vec![root.clone()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
                continue;
            }
            let relative = path
                .strip_prefix(&root)
                .expect("walk stays under the component root")
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            match fs::read_to_string(&path) {
                Ok(text) => {
                    contents.insert(relative, text);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), "skipping unreadable file: {e}");
                }
            }
        }
    }
    Ok(contents)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn props_reject_ids_and_all() {
        let mut props = CheckoutProps::new(CheckoutTarget::Head);
        props.all = true;
        props.ids = vec![ComponentId::new("acme", "button")];
        let err = props.validate().unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn props_require_some_selection() {
        let props = CheckoutProps::new(CheckoutTarget::Head);
        assert!(props.validate().is_err());
    }

    #[test]
    fn props_reject_workspace_only_without_head() {
        let mut props = CheckoutProps::new(CheckoutTarget::Latest);
        props.all = true;
        props.workspace_only = true;
        let err = props.validate().unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn props_accept_version_per_id_alone() {
        let mut props = CheckoutProps::new(CheckoutTarget::Head);
        props
            .version_per_id
            .insert("acme/button".into(), "1.0.0".into());
        assert!(props.validate().is_ok());
    }

    #[test]
    fn result_exit_code_ignores_legitimate_failures() {
        let mut result = CheckoutResult::default();
        result.failed.push(FailedComponent {
            id: ComponentId::new("acme", "button"),
            reason: FailureReason::AlreadyAtLatest,
            unchanged_legitimately: true,
        });
        assert_eq!(result.exit_code(), 0);

        result.failed.push(FailedComponent {
            id: ComponentId::new("acme", "input"),
            reason: FailureReason::MissingVersion {
                version: "9.9.9".into(),
            },
            unchanged_legitimately: false,
        });
        assert_eq!(result.exit_code(), 1);
    }
}
