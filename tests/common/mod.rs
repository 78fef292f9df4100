//! Shared test helpers for weft integration tests.
//!
//! All tests use temp directories — no side effects outside the temp repo.
//! [`TestRepo`] builds a real object store, bitmap, and workspace
//! directory, and seeds model components the way the production write path
//! would.

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use weft::bitmap::Bitmap;
use weft::checkout::{CheckoutEngine, CheckoutProps, CheckoutResult};
use weft::host::LocalHost;
use weft::merge::MergeStrategy;
use weft::model::{
    ComponentId, FileTree, Lane, ModelComponent, ObjectRecord, Ref, Source, Version,
};
use weft::store::ObjectStore;
use weft::WeftError;
use weft::{BITMAP_FILE, OBJECTS_DIR, WEFT_DIR};

/// A scratch workspace: object store + bitmap + working directory, plus a
/// directory-backed remote store for import scenarios.
pub struct TestRepo {
    _dir: TempDir,
    pub workspace_dir: PathBuf,
    pub weft_dir: PathBuf,
    pub store: ObjectStore,
    pub remote: ObjectStore,
}

impl TestRepo {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let workspace_dir = dir.path().join("workspace");
        let weft_dir = workspace_dir.join(WEFT_DIR);
        fs::create_dir_all(&weft_dir).unwrap();
        let store = ObjectStore::new(weft_dir.join(OBJECTS_DIR));
        let remote = ObjectStore::new(dir.path().join("remote-objects"));
        Self {
            _dir: dir,
            workspace_dir,
            weft_dir,
            store,
            remote,
        }
    }

    pub fn bitmap(&self) -> Bitmap {
        Bitmap::load(self.weft_dir.join(BITMAP_FILE)).expect("bitmap should load")
    }

    /// Persist a version over `files` into `store`, chaining to `parents`,
    /// and record it in the component's history cache.
    pub fn seed_version_in(
        &self,
        store: &ObjectStore,
        id: &ComponentId,
        files: &[(&str, &str)],
        parents: &[Ref],
    ) -> Ref {
        let mut tree = FileTree::new();
        for (path, contents) in files {
            let source_ref = store
                .put(&ObjectRecord::Source(Source::new(*contents)))
                .unwrap();
            tree.insert(*path, source_ref);
        }
        let tree_ref = store.put(&ObjectRecord::FileTree(tree)).unwrap();
        let mut version = Version::merge_of(parents.to_vec(), tree_ref);
        version.log.date = "1700000000000".into();
        let version_ref = store
            .put(&ObjectRecord::Version(version.clone()))
            .unwrap();

        let mut history = store.get_history(&id.scope, &id.name).unwrap();
        history.add_from_version(version_ref.clone(), &version);
        store.save_history(&mut history).unwrap();
        version_ref
    }

    pub fn seed_version(&self, id: &ComponentId, files: &[(&str, &str)], parents: &[Ref]) -> Ref {
        self.seed_version_in(&self.store, id, files, parents)
    }

    /// Tag `version_ref` and advance the component head to it.
    pub fn tag_in(&self, store: &ObjectStore, id: &ComponentId, tag: &str, version_ref: &Ref) {
        let mut component = store
            .get_component(&id.scope, &id.name)
            .unwrap()
            .unwrap_or_else(|| ModelComponent::new(id.scope.clone(), id.name.clone()));
        component.add_tag(tag, version_ref.clone()).unwrap();
        component.head = Some(version_ref.clone());
        store.put(&ObjectRecord::Component(component)).unwrap();
    }

    pub fn tag(&self, id: &ComponentId, tag: &str, version_ref: &Ref) {
        self.tag_in(&self.store, id, tag, version_ref);
    }

    /// Advance the head to a snap without tagging.
    pub fn snap(&self, id: &ComponentId, version_ref: &Ref) {
        let mut component = self
            .store
            .get_component(&id.scope, &id.name)
            .unwrap()
            .unwrap_or_else(|| ModelComponent::new(id.scope.clone(), id.name.clone()));
        component.head = Some(version_ref.clone());
        self.store.put(&ObjectRecord::Component(component)).unwrap();
    }

    /// Run one checkout over the current workspace state.
    pub fn checkout(
        &self,
        lane: Option<&Lane>,
        props: &CheckoutProps,
    ) -> Result<CheckoutResult, WeftError> {
        self.checkout_with(lane, props, MergeStrategy::Manual)
    }

    /// Run one checkout with a scripted prompt answer.
    pub fn checkout_with(
        &self,
        lane: Option<&Lane>,
        props: &CheckoutProps,
        prompt_choice: MergeStrategy,
    ) -> Result<CheckoutResult, WeftError> {
        let mut bitmap = self.bitmap();
        let mut host = LocalHost::new(self.store.clone(), &self.workspace_dir)
            .with_remote(self.remote.clone());
        host.prompt_choice = prompt_choice;
        let mut engine = CheckoutEngine::new(
            &self.store,
            &mut bitmap,
            lane,
            &self.workspace_dir,
            &self.weft_dir,
            &mut host,
        );
        engine.checkout(props)
    }

    pub fn component_dir(&self, id: &ComponentId) -> PathBuf {
        self.workspace_dir.join(&id.scope).join(&id.name)
    }

    pub fn write_file(&self, id: &ComponentId, path: &str, contents: &str) {
        let file = self.component_dir(id).join(path);
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(file, contents).unwrap();
    }

    pub fn read_file(&self, id: &ComponentId, path: &str) -> Option<String> {
        fs::read_to_string(self.component_dir(id).join(path)).ok()
    }
}

/// The standard test component id.
pub fn cid() -> ComponentId {
    ComponentId::new("acme", "button")
}

/// Shorthand for a version-targeted checkout of explicit ids.
pub fn version_props(version: &str, ids: &[ComponentId]) -> CheckoutProps {
    let mut props = CheckoutProps::new(weft::checkout::CheckoutTarget::Version(version.into()));
    props.ids = ids.to_vec();
    props
}

/// Files currently on disk for `id`, relative paths, sorted.
pub fn files_on_disk(repo: &TestRepo, id: &ComponentId) -> Vec<String> {
    let root = repo.component_dir(id);
    let mut found = Vec::new();
    if !root.is_dir() {
        return found;
    }
    let mut pending = vec![root.clone()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                found.push(
                    path.strip_prefix(&root)
                        .unwrap()
                        .to_string_lossy()
                        .replace('\\', "/"),
                );
            }
        }
    }
    found.sort();
    found
}

/// Assert helper: the path component directory does not exist or is empty.
pub fn assert_component_gone(repo: &TestRepo, id: &ComponentId) {
    let dir = repo.component_dir(id);
    assert!(
        !dir.exists(),
        "expected component dir to be deleted: {}",
        dir.display()
    );
}

#[allow(unused_imports)]
pub use weft::checkout::CheckoutTarget;

/// Build `CheckoutProps` for a head checkout of everything.
pub fn head_all_props() -> CheckoutProps {
    let mut props = CheckoutProps::new(CheckoutTarget::Head);
    props.all = true;
    props
}

/// Build `CheckoutProps` for a reset of everything.
pub fn reset_all_props() -> CheckoutProps {
    let mut props = CheckoutProps::new(CheckoutTarget::Reset);
    props.all = true;
    props
}

/// Convenience: the nth seeded file path exists with contents.
pub fn assert_file(repo: &TestRepo, id: &ComponentId, path: &str, expected: &str) {
    let actual = repo.read_file(id, path);
    assert_eq!(
        actual.as_deref(),
        Some(expected),
        "unexpected contents for {path}"
    );
}

#[allow(unused_imports)]
pub use weft::checkout::status::FailureReason;

/// Find a failure entry for `id` in the result.
pub fn failure_reason<'a>(
    result: &'a CheckoutResult,
    id: &ComponentId,
) -> Option<&'a FailureReason> {
    result
        .failed
        .iter()
        .find(|f| f.id.same_component(id))
        .map(|f| &f.reason)
}
