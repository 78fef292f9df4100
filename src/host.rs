//! External capabilities consumed by the checkout engine.
//!
//! The engine never talks to the network, the package installer, or the
//! prompt directly — it goes through the [`Host`] trait. [`LocalHost`] is
//! the reference implementation backing the CLI and the integration tests:
//! it writes component files under the workspace directory and can import
//! records from a directory-backed "remote" store.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::PathBuf;

use crate::merge::MergeStrategy;
use crate::model::{ComponentId, ObjectRecord, Ref};
use crate::store::{ObjectStore, StoreError};

// ---------------------------------------------------------------------------
// Requests and outcomes
// ---------------------------------------------------------------------------

/// Options for [`Host::import_many_if_missing`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportOptions {
    /// Also fetch the components' dependencies.
    pub with_deps: bool,
    /// Allow answering from the per-operation import cache.
    pub cache: bool,
}

/// One file to write (or delete, when `contents` is `None`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileWrite {
    /// Workspace-relative path within the component directory.
    pub path: String,
    /// New contents, or `None` to delete.
    pub contents: Option<String>,
}

/// One component's write-back payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentWrite {
    /// The component being written.
    pub id: ComponentId,
    /// Its files.
    pub files: Vec<FileWrite>,
}

/// A batched write-back request.
#[derive(Clone, Debug, Default)]
pub struct WriteRequest {
    /// Components to write, in apply order.
    pub components: Vec<ComponentWrite>,
    /// Skip dependency installation after the write.
    pub skip_dependency_installation: bool,
    /// Reset per-component config to the model state.
    pub reset_config: bool,
    /// Verbose reporting.
    pub verbose: bool,
    /// Do not touch the bitmap (the engine owns bitmap updates).
    pub skip_bitmap: bool,
}

/// Write-side errors are data, not exceptions: they ride back in the
/// checkout summary.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Dependency installation failure, when any.
    pub installation_error: Option<String>,
    /// Compilation failure, when any.
    pub compilation_error: Option<String>,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// A host capability failure.
#[derive(Debug)]
pub enum HostError {
    /// An I/O failure inside a capability.
    Io {
        /// What the host was doing.
        context: String,
        /// The underlying error.
        source: std::io::Error,
    },
    /// An object-store failure during import.
    Store(StoreError),
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { context, source } => write!(f, "{context}: {source}"),
            Self::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for HostError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Store(e) => Some(e),
        }
    }
}

impl From<StoreError> for HostError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

// ---------------------------------------------------------------------------
// Host trait
// ---------------------------------------------------------------------------

/// The external capabilities the checkout engine consumes.
pub trait Host {
    /// Drop any per-operation import cache. Called at operation start.
    fn invalidate_import_cache(&mut self) {}

    /// Fetch remotely-owned records for `ids` when missing locally.
    ///
    /// A scope that is unknown remotely is not an error — the id may be a
    /// genuinely new component. Implementations log and swallow such
    /// misses; the caller re-checks the local store afterwards.
    ///
    /// # Errors
    /// Only on real I/O or store failure.
    fn import_many_if_missing(
        &mut self,
        ids: &[ComponentId],
        options: &ImportOptions,
    ) -> Result<(), HostError>;

    /// Write the given components to the working copy.
    ///
    /// # Errors
    /// Only on I/O failure reaching the working copy; installation and
    /// compilation failures ride back inside [`WriteOutcome`].
    fn write_many(&mut self, request: &WriteRequest) -> Result<WriteOutcome, HostError>;

    /// Delete the given components from the working copy.
    ///
    /// # Errors
    /// I/O failure.
    fn remove_locally(&mut self, ids: &[ComponentId], force: bool) -> Result<(), HostError>;

    /// Ask the user which merge strategy to apply.
    fn prompt_merge_strategy(&mut self) -> MergeStrategy;
}

// ---------------------------------------------------------------------------
// LocalHost
// ---------------------------------------------------------------------------

/// The reference [`Host`]: a workspace-directory writer with an optional
/// directory-backed remote store.
#[derive(Debug)]
pub struct LocalHost {
    store: ObjectStore,
    remote: Option<ObjectStore>,
    workspace_dir: PathBuf,
    /// Per-operation import cache: component identities already fetched.
    import_cache: BTreeSet<String>,
    /// The answer [`Host::prompt_merge_strategy`] gives. Non-interactive
    /// hosts default to manual.
    pub prompt_choice: MergeStrategy,
}

impl LocalHost {
    /// Create a host over the local store and workspace directory.
    #[must_use]
    pub fn new(store: ObjectStore, workspace_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            remote: None,
            workspace_dir: workspace_dir.into(),
            import_cache: BTreeSet::new(),
            prompt_choice: MergeStrategy::Manual,
        }
    }

    /// Attach a directory-backed remote store to import from.
    #[must_use]
    pub fn with_remote(mut self, remote: ObjectStore) -> Self {
        self.remote = Some(remote);
        self
    }

    /// The directory a component's files live under.
    #[must_use]
    pub fn component_dir(&self, id: &ComponentId) -> PathBuf {
        self.workspace_dir.join(&id.scope).join(&id.name)
    }

    /// Copy one version closure (version → file tree → sources, then
    /// parents) from `remote` into the local store.
    fn import_version_closure(&self, remote: &ObjectStore, start: &Ref) -> Result<(), HostError> {
        let mut pending = vec![start.clone()];
        while let Some(version_ref) = pending.pop() {
            if self.store.has(&version_ref) {
                continue;
            }
            let Some(version) = remote.get_version(&version_ref)? else {
                tracing::warn!(%version_ref, "remote is missing a referenced version; skipping");
                continue;
            };
            if let Some(tree) = remote.get_file_tree(&version.files)? {
                for entry in tree.files.values() {
                    if let Some(source) = remote.get_source(&entry.source)? {
                        self.store.put(&ObjectRecord::Source(source))?;
                    }
                }
                self.store.put(&ObjectRecord::FileTree(tree))?;
            }
            pending.extend(version.parents.iter().cloned());
            self.store.put(&ObjectRecord::Version(version))?;
        }
        Ok(())
    }
}

impl Host for LocalHost {
    fn invalidate_import_cache(&mut self) {
        self.import_cache.clear();
    }

    fn import_many_if_missing(
        &mut self,
        ids: &[ComponentId],
        options: &ImportOptions,
    ) -> Result<(), HostError> {
        let Some(remote) = self.remote.clone() else {
            tracing::debug!("no remote configured; nothing to import");
            return Ok(());
        };

        for id in ids {
            let identity = id.full_name();
            if options.cache && self.import_cache.contains(&identity) {
                continue;
            }

            let Some(mut component) = remote.get_component(&id.scope, &id.name)? else {
                // Unknown scope/component: may be genuinely new. Swallowed.
                tracing::warn!(component = %identity, "remote does not know this component; skipping import");
                continue;
            };

            let mut heads: Vec<Ref> = component.tags.values().cloned().collect();
            heads.extend(component.head.clone());
            heads.extend(component.remote_head.clone());
            for head in heads {
                self.import_version_closure(&remote, &head)?;
            }

            // Fold the remote history cache into the local one; entries the
            // local cache already holds are kept.
            let mut history = self.store.get_history(&id.scope, &id.name)?;
            for entry in remote.get_history(&id.scope, &id.name)?.versions.values() {
                history.add_entry(entry.clone());
            }
            self.store.save_history(&mut history)?;

            // An imported head is a remote head from this workspace's view.
            if component.remote_head.is_none() {
                component.remote_head = component.head.take();
            }
            match self.store.get_component(&id.scope, &id.name)? {
                Some(existing) => {
                    // Keep local state; refresh the remote view.
                    let mut merged = existing;
                    merged.remote_head = component.remote_head.clone();
                    for (tag, target) in &component.tags {
                        let _ = merged.add_tag(tag.clone(), target.clone());
                    }
                    self.store.put(&ObjectRecord::Component(merged))?;
                }
                None => {
                    self.store.put(&ObjectRecord::Component(component))?;
                }
            }
            self.import_cache.insert(identity);
        }
        Ok(())
    }

    fn write_many(&mut self, request: &WriteRequest) -> Result<WriteOutcome, HostError> {
        for component in &request.components {
            let dir = self.component_dir(&component.id);
            for file in &component.files {
                let path = dir.join(&file.path);
                match &file.contents {
                    Some(contents) => {
                        let parent = path.parent().expect("component file path has a parent");
                        fs::create_dir_all(parent).map_err(|source| HostError::Io {
                            context: format!("creating '{}'", parent.display()),
                            source,
                        })?;
                        fs::write(&path, contents).map_err(|source| HostError::Io {
                            context: format!("writing '{}'", path.display()),
                            source,
                        })?;
                    }
                    None => match fs::remove_file(&path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(source) => {
                            return Err(HostError::Io {
                                context: format!("deleting '{}'", path.display()),
                                source,
                            });
                        }
                    },
                }
            }
            if request.verbose {
                tracing::info!(component = %component.id, files = component.files.len(), "wrote component");
            }
        }
        if request.skip_dependency_installation {
            tracing::debug!("dependency installation skipped");
        }
        Ok(WriteOutcome::default())
    }

    fn remove_locally(&mut self, ids: &[ComponentId], force: bool) -> Result<(), HostError> {
        for id in ids {
            let dir = self.component_dir(id);
            match fs::remove_dir_all(&dir) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) if force => {
                    tracing::warn!(component = %id, "forced removal failed: {source}");
                }
                Err(source) => {
                    return Err(HostError::Io {
                        context: format!("removing '{}'", dir.display()),
                        source,
                    });
                }
            }
        }
        Ok(())
    }

    fn prompt_merge_strategy(&mut self) -> MergeStrategy {
        self.prompt_choice
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
