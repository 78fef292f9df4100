//! End-to-end checkout scenarios over a real store, bitmap, and workspace.

mod common;

use common::{
    assert_component_gone, assert_file, cid, failure_reason, files_on_disk, head_all_props,
    reset_all_props, version_props, CheckoutTarget, FailureReason, TestRepo,
};
use weft::checkout::CheckoutProps;
use weft::merge::MergeStrategy;
use weft::model::{ComponentId, ObjectRecord, Version};
use weft::WeftError;

/// Seed a component with 1.0.0 and 1.0.1 and check out 1.0.0.
///
/// Files: `x` is identical in both versions; `y` changes.
fn repo_at_v100() -> TestRepo {
    let repo = TestRepo::new();
    let id = cid();
    let v1 = repo.seed_version(&id, &[("x", "x-original\n"), ("y", "y-at-100\n")], &[]);
    repo.tag(&id, "1.0.0", &v1);
    let v2 = repo.seed_version(&id, &[("x", "x-original\n"), ("y", "y-at-101\n")], &[v1]);
    repo.tag(&id, "1.0.1", &v2);

    let result = repo.checkout(None, &version_props("1.0.0", &[id])).unwrap();
    assert_eq!(result.exit_code(), 0, "setup checkout failed: {result:?}");
    repo
}

// ---------------------------------------------------------------------------
// Scenario: switch clean
// ---------------------------------------------------------------------------

#[test]
fn switch_clean_replaces_files_and_moves_bitmap() {
    let repo = repo_at_v100();
    let id = cid();
    assert_file(&repo, &id, "y", "y-at-100\n");

    let result = repo.checkout(None, &version_props("1.0.1", &[id.clone()])).unwrap();

    assert_eq!(result.applied, vec![id.clone()]);
    assert!(result.failed.is_empty());
    assert!(!result.left_unresolved_conflicts);
    assert_file(&repo, &id, "y", "y-at-101\n");
    assert_eq!(repo.bitmap().version_of(&id), Some("1.0.1"));
}

#[test]
fn switch_clean_deletes_files_dropped_by_target() {
    let repo = TestRepo::new();
    let id = cid();
    let v1 = repo.seed_version(&id, &[("keep.ts", "k\n"), ("old.ts", "o\n")], &[]);
    repo.tag(&id, "1.0.0", &v1);
    let v2 = repo.seed_version(&id, &[("keep.ts", "k\n")], &[v1]);
    repo.tag(&id, "1.0.1", &v2);

    repo.checkout(None, &version_props("1.0.0", &[id.clone()])).unwrap();
    assert!(repo.read_file(&id, "old.ts").is_some());

    repo.checkout(None, &version_props("1.0.1", &[id.clone()])).unwrap();
    assert!(repo.read_file(&id, "old.ts").is_none());
    assert_eq!(files_on_disk(&repo, &id), vec!["keep.ts".to_owned()]);
}

// ---------------------------------------------------------------------------
// Scenario: switch with stash semantics
// ---------------------------------------------------------------------------

#[test]
fn switch_with_modifications_keeps_local_edit() {
    let repo = repo_at_v100();
    let id = cid();

    // Move to 1.0.1, then edit `x` (whose base content dates back to 1.0.0).
    repo.checkout(None, &version_props("1.0.1", &[id.clone()])).unwrap();
    repo.write_file(&id, "x", "x-local-edit\n");

    let result = repo.checkout(None, &version_props("1.0.0", &[id.clone()])).unwrap();

    assert_eq!(result.applied, vec![id.clone()]);
    assert!(!result.left_unresolved_conflicts, "stash-pop must not conflict");
    assert_file(&repo, &id, "x", "x-local-edit\n");
    assert_eq!(repo.bitmap().version_of(&id), Some("1.0.0"));
}

// ---------------------------------------------------------------------------
// Scenario: reset
// ---------------------------------------------------------------------------

#[test]
fn reset_modified_restores_model_content() {
    let repo = repo_at_v100();
    let id = cid();
    repo.write_file(&id, "y", "scribbles\n");

    let result = repo.checkout(None, &reset_all_props()).unwrap();

    assert_eq!(result.applied, vec![id.clone()]);
    assert!(result.failed.is_empty());
    assert_file(&repo, &id, "y", "y-at-100\n");
    assert_eq!(repo.bitmap().version_of(&id), Some("1.0.0"));
}

#[test]
fn reset_unmodified_is_a_legitimate_no_op() {
    let repo = repo_at_v100();
    let id = cid();

    let result = repo.checkout(None, &reset_all_props()).unwrap();

    assert!(result.applied.is_empty());
    assert_eq!(
        failure_reason(&result, &id),
        Some(&FailureReason::NotModified)
    );
    assert_eq!(result.exit_code(), 0);
}

#[test]
fn reset_removes_locally_added_files() {
    let repo = repo_at_v100();
    let id = cid();
    repo.write_file(&id, "stray.ts", "not in the model\n");

    repo.checkout(None, &reset_all_props()).unwrap();

    // Reset applies model content verbatim; only model files stay tracked.
    // The stray file itself is untracked and left alone on disk.
    assert_eq!(
        repo.bitmap().entry(&id).unwrap().files,
        vec!["x".to_owned(), "y".to_owned()]
    );
    assert!(repo.read_file(&id, "stray.ts").is_some());
}

// ---------------------------------------------------------------------------
// Scenario: target missing version
// ---------------------------------------------------------------------------

#[test]
fn missing_version_fails_hard_and_leaves_bitmap() {
    let repo = repo_at_v100();
    let id = cid();

    let result = repo.checkout(None, &version_props("9.9.9", &[id.clone()])).unwrap();

    assert!(result.applied.is_empty());
    assert_eq!(
        failure_reason(&result, &id),
        Some(&FailureReason::MissingVersion {
            version: "9.9.9".into()
        })
    );
    let failure = &result.failed[0];
    assert!(!failure.unchanged_legitimately);
    assert_eq!(format!("{}", failure.reason), "doesn't have version 9.9.9");
    assert_eq!(result.exit_code(), 1);
    assert_eq!(repo.bitmap().version_of(&id), Some("1.0.0"));
}

// ---------------------------------------------------------------------------
// Scenario: same version no-op
// ---------------------------------------------------------------------------

#[test]
fn already_at_version_is_legitimate() {
    let repo = repo_at_v100();
    let id = cid();

    let result = repo.checkout(None, &version_props("1.0.0", &[id.clone()])).unwrap();

    assert_eq!(
        failure_reason(&result, &id),
        Some(&FailureReason::AlreadyAtVersion {
            version: "1.0.0".into()
        })
    );
    assert_eq!(result.exit_code(), 0);
}

#[test]
fn already_at_head_reports_latest() {
    let repo = TestRepo::new();
    let id = cid();
    let v1 = repo.seed_version(&id, &[("x", "1\n")], &[]);
    repo.tag(&id, "1.0.0", &v1);
    repo.checkout(None, &version_props("1.0.0", &[id.clone()])).unwrap();

    let result = repo.checkout(None, &head_all_props()).unwrap();

    assert_eq!(
        failure_reason(&result, &id),
        Some(&FailureReason::AlreadyAtLatest)
    );
    assert_eq!(result.exit_code(), 0);
}

// ---------------------------------------------------------------------------
// Checkout head / monotonicity
// ---------------------------------------------------------------------------

#[test]
fn checkout_head_lands_on_head_include_remote() {
    let repo = TestRepo::new();
    let id = cid();
    let v1 = repo.seed_version(&id, &[("x", "1\n")], &[]);
    repo.tag(&id, "1.0.0", &v1);
    repo.checkout(None, &version_props("1.0.0", &[id.clone()])).unwrap();

    let v2 = repo.seed_version(&id, &[("x", "2\n")], &[v1]);
    repo.tag(&id, "1.0.1", &v2);

    let result = repo.checkout(None, &head_all_props()).unwrap();
    assert_eq!(result.applied, vec![id.clone()]);

    // Bitmap version equals the component's head-include-remote.
    let component = repo.store.get_component(&id.scope, &id.name).unwrap().unwrap();
    let head = component.head_include_remote().unwrap();
    let bitmap_version = repo.bitmap().version_of(&id).unwrap().to_owned();
    assert_eq!(component.resolve_version(&bitmap_version).as_ref(), Some(head));
}

// ---------------------------------------------------------------------------
// Removed components
// ---------------------------------------------------------------------------

#[test]
fn removed_target_deletes_component() {
    let repo = repo_at_v100();
    let id = cid();

    // A removed 2.0.0 on top.
    let head = repo
        .store
        .get_component(&id.scope, &id.name)
        .unwrap()
        .unwrap()
        .head
        .unwrap();
    let tree_ref = repo
        .store
        .get_version(&head)
        .unwrap()
        .unwrap()
        .files;
    let mut removed_version = Version::child_of(head, tree_ref);
    removed_version.removed = true;
    let removed_ref = repo
        .store
        .put(&ObjectRecord::Version(removed_version.clone()))
        .unwrap();
    let mut history = repo.store.get_history(&id.scope, &id.name).unwrap();
    history.add_from_version(removed_ref.clone(), &removed_version);
    repo.store.save_history(&mut history).unwrap();
    repo.tag(&id, "2.0.0", &removed_ref);

    let result = repo.checkout(None, &version_props("2.0.0", &[id.clone()])).unwrap();

    assert_eq!(result.removed, vec![id.clone()]);
    assert!(result.applied.is_empty());
    assert_eq!(result.exit_code(), 0);
    assert_component_gone(&repo, &id);
    assert!(repo.bitmap().entry(&id).is_none());
}

// ---------------------------------------------------------------------------
// Preconditions
// ---------------------------------------------------------------------------

#[test]
fn during_merge_state_refuses_checkout() {
    let repo = repo_at_v100();
    let id = cid();
    let mut bitmap = repo.bitmap();
    bitmap.mark_during_merge(&id);
    bitmap.save().unwrap();

    let result = repo.checkout(None, &version_props("1.0.1", &[id.clone()])).unwrap();

    assert_eq!(
        failure_reason(&result, &id),
        Some(&FailureReason::DuringMerge)
    );
    assert_eq!(result.exit_code(), 1);
}

#[test]
fn merge_pending_refuses_checkout() {
    let repo = TestRepo::new();
    let id = cid();
    let base = repo.seed_version(&id, &[("x", "base\n")], &[]);
    let local = repo.seed_version(&id, &[("x", "local\n")], &[base.clone()]);
    let remote = repo.seed_version(&id, &[("x", "remote\n")], &[base]);

    let mut component = weft::model::ModelComponent::new(id.scope.clone(), id.name.clone());
    component.head = Some(local.clone());
    component.remote_head = Some(remote);
    repo.store.put(&ObjectRecord::Component(component)).unwrap();

    let result = repo
        .checkout(None, &version_props(local.as_str(), &[id.clone()]))
        .unwrap();

    assert_eq!(
        failure_reason(&result, &id),
        Some(&FailureReason::MergePending)
    );
    assert_eq!(format!("{}", &result.failed[0].reason), "merge-pending; run status");
    assert_eq!(result.exit_code(), 1);
}

#[test]
fn new_component_is_legitimate_failure() {
    let repo = TestRepo::new();
    let ghost = ComponentId::new("acme", "ghost");

    let result = repo.checkout(None, &version_props("1.0.0", &[ghost.clone()])).unwrap();

    assert_eq!(
        failure_reason(&result, &ghost),
        Some(&FailureReason::NewComponent)
    );
    assert_eq!(result.exit_code(), 0);
}

// ---------------------------------------------------------------------------
// Argument validation
// ---------------------------------------------------------------------------

#[test]
fn ids_and_all_is_invalid() {
    let repo = repo_at_v100();
    let mut props = version_props("1.0.1", &[cid()]);
    props.all = true;

    let err = repo.checkout(None, &props).unwrap_err();
    assert!(matches!(err, WeftError::InvalidArguments { .. }));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn workspace_only_requires_head() {
    let repo = repo_at_v100();
    let mut props = reset_all_props();
    props.workspace_only = true;

    let err = repo.checkout(None, &props).unwrap_err();
    assert_eq!(err.exit_code(), 2);
}

// ---------------------------------------------------------------------------
// Import from remote
// ---------------------------------------------------------------------------

#[test]
fn missing_target_is_imported_from_remote() {
    let repo = TestRepo::new();
    let id = cid();

    // 1.0.0 exists locally; 1.0.1 only on the remote.
    let v1 = repo.seed_version(&id, &[("x", "1\n")], &[]);
    repo.tag(&id, "1.0.0", &v1);
    repo.checkout(None, &version_props("1.0.0", &[id.clone()])).unwrap();

    let v2 = repo.seed_version_in(&repo.remote, &id, &[("x", "2\n")], &[v1.clone()]);
    repo.tag_in(&repo.remote, &id, "1.0.1", &v2);
    // The local component knows the tag but lacks the version record.
    repo.tag(&id, "1.0.1", &v2);
    assert!(!repo.store.has(&v2));

    let result = repo.checkout(None, &version_props("1.0.1", &[id.clone()])).unwrap();

    assert_eq!(result.applied, vec![id.clone()]);
    assert!(repo.store.has(&v2));
    assert_file(&repo, &id, "x", "2\n");
}

// ---------------------------------------------------------------------------
// version_per_id
// ---------------------------------------------------------------------------

#[test]
fn version_per_id_overrides_target() {
    let repo = TestRepo::new();
    let a = ComponentId::new("acme", "alpha");
    let b = ComponentId::new("acme", "beta");
    for id in [&a, &b] {
        let v1 = repo.seed_version(id, &[("x", "1\n")], &[]);
        repo.tag(id, "1.0.0", &v1);
        let v2 = repo.seed_version(id, &[("x", "2\n")], &[v1]);
        repo.tag(id, "1.0.1", &v2);
        repo.checkout(None, &version_props("1.0.0", &[id.clone()])).unwrap();
    }

    // Head for everything, but alpha pinned at 1.0.0 stays put.
    let mut props = head_all_props();
    props
        .version_per_id
        .insert(a.full_name(), "1.0.0".into());
    let result = repo.checkout(None, &props).unwrap();

    assert_eq!(
        failure_reason(&result, &a),
        Some(&FailureReason::AlreadyAtVersion {
            version: "1.0.0".into()
        }),
        "pinned id follows the override, not head"
    );
    assert!(result.applied.contains(&b));
    assert_eq!(repo.bitmap().version_of(&a), Some("1.0.0"));
    assert_eq!(repo.bitmap().version_of(&b), Some("1.0.1"));
}

// ---------------------------------------------------------------------------
// skip_files_write
// ---------------------------------------------------------------------------

#[test]
fn skip_files_write_updates_bitmap_only() {
    let repo = repo_at_v100();
    let id = cid();

    let mut props = version_props("1.0.1", &[id.clone()]);
    props.skip_files_write = true;
    let result = repo.checkout(None, &props).unwrap();

    assert_eq!(result.applied, vec![id.clone()]);
    assert_eq!(repo.bitmap().version_of(&id), Some("1.0.1"));
    // Files untouched.
    assert_file(&repo, &id, "y", "y-at-100\n");
}

// ---------------------------------------------------------------------------
// Snap targets
// ---------------------------------------------------------------------------

#[test]
fn literal_snap_ref_is_a_valid_target() {
    let repo = TestRepo::new();
    let id = cid();
    let v1 = repo.seed_version(&id, &[("x", "1\n")], &[]);
    repo.snap(&id, &v1);

    let result = repo
        .checkout(None, &version_props(v1.as_str(), &[id.clone()]))
        .unwrap();

    assert_eq!(result.applied, vec![id.clone()]);
    assert_eq!(repo.bitmap().version_of(&id), Some(v1.as_str()));
}

// ---------------------------------------------------------------------------
// Checkout respects the merge strategy plumbing
// ---------------------------------------------------------------------------

#[test]
fn ours_strategy_keeps_workspace_files_verbatim() {
    let repo = repo_at_v100();
    let id = cid();
    repo.checkout(None, &version_props("1.0.1", &[id.clone()])).unwrap();
    repo.write_file(&id, "y", "my-y\n");

    let mut props = version_props("1.0.0", &[id.clone()]);
    props.merge_strategy = Some(MergeStrategy::Ours);
    let result = repo.checkout(None, &props).unwrap();

    assert_eq!(result.applied, vec![id.clone()]);
    assert!(!result.left_unresolved_conflicts);
    assert_file(&repo, &id, "y", "my-y\n");
    assert_eq!(repo.bitmap().version_of(&id), Some("1.0.0"));
}

#[test]
fn reset_props_constructor_has_sane_defaults() {
    let props = CheckoutProps::new(CheckoutTarget::Reset);
    assert!(props.ids.is_empty());
    assert!(!props.all);
    assert!(props.merge_strategy.is_none());
    assert!(!props.workspace_only);
}
