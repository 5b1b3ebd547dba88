//! The sync controller: every user intent enters here.
//!
//! [`SyncController`] is the only writer of the [`WorkspaceStore`], the
//! [`FolderCache`] and the [`PendingChangeSet`], and the only caller of the
//! [`RemoteGateway`]. Operations follow the same shape:
//!
//! 1. claim the busy flag (a second intent fails with [`SyncError::Busy`]),
//! 2. snapshot what the operation needs and the current generation,
//! 3. call the gateway with the state lock released,
//! 4. commit every mutation in one locked section, but only if the
//!    generation is unchanged; otherwise the result is dropped and
//!    [`SyncError::Superseded`] is returned.
//!
//! A gateway failure therefore never leaves partial state behind.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::folder_cache::{CacheScope, FolderCache};
use crate::gateway::RemoteGateway;
use crate::model::{
    BranchRef, CommitRecord, FileNode, FileWrite, FolderListing, RepositoryRef, User,
    WorkspaceFile, file_name,
};
use crate::pending::PendingChangeSet;
use crate::settings::ControllerSettings;
use crate::templates;
use crate::validate;
use crate::workspace::WorkspaceStore;

/// Notifications emitted by the controller after state has been committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControllerEvent {
    /// An operation started (`true`) or finished (`false`).
    BusyChanged {
        /// New busy state.
        busy: bool,
    },
    /// Local files were staged and a repository must be created to push them.
    RepositoryRequired {
        /// Number of staged files.
        staged: usize,
    },
    /// A local file was authored.
    FileCreated {
        /// Path of the new file.
        path: String,
    },
    /// A local folder was created.
    FolderCreated {
        /// Path of the new folder.
        path: String,
    },
    /// The selected file was saved.
    Saved {
        /// Path of the saved file.
        path: String,
        /// Whether the save reached the remote.
        remote: bool,
    },
    /// A push completed.
    Pushed,
    /// A branch was created and selected.
    BranchCreated {
        /// Branch name.
        name: String,
    },
    /// Every pending file was written to a new repository.
    Flushed {
        /// `owner/name` of the repository.
        repository: String,
        /// Number of files written by this run.
        files: usize,
    },
}

/// Callback invoked for every [`ControllerEvent`].
pub type EventCallback = Arc<dyn Fn(&ControllerEvent) + Send + Sync>;

/// Result of [`SyncController::save`] and [`SyncController::push`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SaveOutcome {
    /// No repository is associated; local files were staged instead.
    RepositoryRequired {
        /// Number of staged files.
        staged: usize,
    },
    /// A local-only file was marked saved without contacting the remote.
    SavedLocally {
        /// Path of the file.
        path: String,
    },
    /// The file was written to the remote.
    Saved {
        /// Path of the file.
        path: String,
        /// New content hash.
        sha: Option<String>,
    },
    /// The file had no unsaved changes.
    Unchanged {
        /// Path of the file.
        path: String,
    },
}

/// Summary of a completed flush.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    /// The repository the files were written to.
    pub repository: RepositoryRef,
    /// Paths written by this run, in order.
    pub written: Vec<String>,
    /// Paths skipped because an earlier run already wrote them.
    pub skipped: Vec<String>,
    /// Whether the root listing and history were refreshed afterwards.
    pub refreshed: bool,
}

/// Progress of a flush that stopped part-way.
#[derive(Debug, Clone)]
struct InterruptedFlush {
    repository: RepositoryRef,
    written: HashMap<String, FileWrite>,
}

#[derive(Debug, Default)]
struct ControllerState {
    generation: u64,
    user: Option<User>,
    repositories: Vec<RepositoryRef>,
    repository: Option<RepositoryRef>,
    branches: Vec<BranchRef>,
    branch: Option<BranchRef>,
    commits: Vec<CommitRecord>,
    store: WorkspaceStore,
    folders: FolderCache,
    pending: PendingChangeSet,
    interrupted_flush: Option<InterruptedFlush>,
}

impl ControllerState {
    fn active(&self) -> Result<(RepositoryRef, BranchRef)> {
        let repo = self.repository.clone().ok_or(SyncError::NoRepository)?;
        let branch = self.branch.clone().ok_or(SyncError::NoBranch)?;
        Ok((repo, branch))
    }

    /// Point the active branch (and its entry in `branches`) at `sha`.
    fn advance_head(&mut self, sha: &str) {
        let Some(branch) = self.branch.as_mut() else {
            return;
        };
        branch.head = Some(sha.to_string());
        for b in self.branches.iter_mut().filter(|b| b.name == branch.name) {
            b.head = Some(sha.to_string());
        }
    }
}

enum EntrySelection {
    Local(String),
    Remote(WorkspaceFile),
}

/// Everything fetched for a branch before it becomes active.
struct BranchLoad {
    root: FolderListing,
    commits: Vec<CommitRecord>,
    entry: Option<EntrySelection>,
}

/// Clears the busy flag when an operation ends, however it ends.
struct BusyGuard<'a> {
    busy: &'a AtomicBool,
    callback: Option<EventCallback>,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
        if let Some(callback) = &self.callback {
            callback(&ControllerEvent::BusyChanged { busy: false });
        }
    }
}

/// Orchestrates the workspace against one [`RemoteGateway`].
pub struct SyncController<G> {
    gateway: G,
    settings: ControllerSettings,
    state: Mutex<ControllerState>,
    busy: AtomicBool,
    event_callback: RwLock<Option<EventCallback>>,
}

impl<G: RemoteGateway> SyncController<G> {
    /// A controller with default settings.
    pub fn new(gateway: G) -> Self {
        Self::with_settings(gateway, ControllerSettings::default())
    }

    /// A controller with explicit settings.
    pub fn with_settings(gateway: G, settings: ControllerSettings) -> Self {
        Self {
            gateway,
            settings,
            state: Mutex::new(ControllerState::default()),
            busy: AtomicBool::new(false),
            event_callback: RwLock::new(None),
        }
    }

    /// Set a callback to be invoked for controller events.
    pub fn set_event_callback(&self, callback: EventCallback) {
        let mut slot = self
            .event_callback
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some(callback);
    }

    /// Remove the event callback.
    pub fn clear_event_callback(&self) {
        let mut slot = self
            .event_callback
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = None;
    }

    // ==================== Internals ====================

    fn state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn callback(&self) -> Option<EventCallback> {
        self.event_callback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn emit(&self, event: &ControllerEvent) {
        if let Some(callback) = self.callback() {
            callback(event);
        }
    }

    fn begin(&self) -> Result<BusyGuard<'_>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Rejecting intent: controller is busy");
            return Err(SyncError::Busy);
        }
        let callback = self.callback();
        if let Some(callback) = &callback {
            callback(&ControllerEvent::BusyChanged { busy: true });
        }
        Ok(BusyGuard {
            busy: &self.busy,
            callback,
        })
    }

    /// Apply `mutate` if no newer operation replaced the state since
    /// `generation` was read.
    fn commit<T>(
        &self,
        generation: u64,
        mutate: impl FnOnce(&mut ControllerState) -> T,
    ) -> Result<T> {
        let mut state = self.state();
        if state.generation != generation {
            debug!(
                "Dropping result from generation {} (now {})",
                generation, state.generation
            );
            return Err(SyncError::Superseded);
        }
        Ok(mutate(&mut *state))
    }

    fn scope_for(repo: &RepositoryRef, branch: &str) -> CacheScope {
        CacheScope {
            repository: repo.full_name(),
            branch: branch.to_string(),
        }
    }

    async fn fetch_branch(&self, repo: &RepositoryRef, branch: &BranchRef) -> Result<BranchLoad> {
        let root = self
            .gateway
            .list_contents(&repo.owner, &repo.name, "", &branch.name)
            .await?;
        let commits = self
            .gateway
            .list_commits(&repo.owner, &repo.name, &branch.name)
            .await?;

        let entry_node = self.settings.entry_file.as_deref().and_then(|entry| {
            root.iter()
                .find(|n| n.is_file() && n.parent().is_empty() && n.name == entry)
                .cloned()
        });
        let entry = match entry_node {
            None => None,
            Some(node) => {
                let has_local = self.state().store.local_file(&node.path).is_some();
                if has_local {
                    Some(EntrySelection::Local(node.path))
                } else {
                    let content = self
                        .gateway
                        .get_file_content(&repo.owner, &repo.name, &node.path, &branch.name)
                        .await?;
                    let sha = node.sha().map(str::to_string);
                    Some(EntrySelection::Remote(WorkspaceFile::remote(
                        node.path, content, sha,
                    )))
                }
            }
        };

        Ok(BranchLoad {
            root,
            commits,
            entry,
        })
    }

    /// Make `branch` of `repo` active. Bumps the generation.
    fn apply_branch(
        state: &mut ControllerState,
        repo: RepositoryRef,
        branch: BranchRef,
        load: BranchLoad,
    ) {
        state.generation += 1;
        Self::forget_foreign_flush(state, &repo);
        state.folders.rescope(Some(Self::scope_for(&repo, &branch.name)));
        state.folders.put("", load.root.clone());
        state.store.drop_remote_files();
        state.store.replace_root(load.root);
        state.commits = load.commits;
        match load.entry {
            Some(EntrySelection::Local(path)) => {
                state.store.select(&path);
            }
            Some(EntrySelection::Remote(file)) => state.store.open(file),
            None => {}
        }
        state.repository = Some(repo);
        state.branch = Some(branch);
    }

    /// A flush can only resume against the repository it was started for.
    fn forget_foreign_flush(state: &mut ControllerState, repo: &RepositoryRef) {
        let Some(flush) = &state.interrupted_flush else {
            return;
        };
        if flush.repository.full_name() != repo.full_name() {
            info!(
                "Dropping interrupted flush to {}; {} is now active",
                flush.repository.full_name(),
                repo.full_name()
            );
            state.interrupted_flush = None;
        }
    }

    // ==================== Session ====================

    /// Authenticate and load the repository list.
    pub async fn connect(&self) -> Result<User> {
        let _guard = self.begin()?;
        let generation = self.generation();

        let user = self.gateway.get_user().await?;
        let repositories = self.gateway.list_repositories().await?;
        info!(
            "Connected as {} ({} repositories)",
            user.login,
            repositories.len()
        );

        self.commit(generation, |s| {
            s.user = Some(user.clone());
            s.repositories = repositories;
        })?;
        Ok(user)
    }

    /// Drop the session and everything loaded under it.
    ///
    /// Never blocked by an operation in flight; that operation's results are
    /// discarded when they arrive.
    pub fn logout(&self) {
        let mut state = self.state();
        let generation = state.generation + 1;
        *state = ControllerState {
            generation,
            ..Default::default()
        };
        info!("Logged out");
    }

    // ==================== Navigation ====================

    /// Select `repo` and load its default branch (or its first branch).
    ///
    /// Returns the selected branch, or `None` when the repository has no
    /// branches yet.
    pub async fn select_repository(&self, repo: &RepositoryRef) -> Result<Option<BranchRef>> {
        let _guard = self.begin()?;
        let generation = self.generation();

        let branches = self.gateway.list_branches(&repo.owner, &repo.name).await?;
        let Some(branch) = branches
            .iter()
            .find(|b| b.name == repo.default_branch)
            .or_else(|| branches.first())
            .cloned()
        else {
            info!("Repository {} has no branches", repo.full_name());
            self.commit(generation, |s| {
                s.generation += 1;
                Self::forget_foreign_flush(s, repo);
                s.folders.rescope(None);
                s.store.drop_remote_files();
                s.store.replace_root(Vec::new());
                s.commits.clear();
                s.branches.clear();
                s.branch = None;
                s.repository = Some(repo.clone());
            })?;
            return Ok(None);
        };

        let load = self.fetch_branch(repo, &branch).await?;
        info!(
            "Selected {}@{} ({} root entries)",
            repo.full_name(),
            branch.name,
            load.root.len()
        );
        self.commit(generation, |s| {
            s.branches = branches;
            Self::apply_branch(s, repo.clone(), branch.clone(), load);
        })?;
        Ok(Some(branch))
    }

    /// Switch the active repository to `branch`.
    pub async fn select_branch(&self, branch: &BranchRef) -> Result<()> {
        let _guard = self.begin()?;
        let (generation, repo) = {
            let state = self.state();
            let repo = state.repository.clone().ok_or(SyncError::NoRepository)?;
            (state.generation, repo)
        };

        let load = self.fetch_branch(&repo, branch).await?;
        info!("Switched {} to branch {}", repo.full_name(), branch.name);
        self.commit(generation, |s| {
            Self::apply_branch(s, repo, branch.clone(), load)
        })
    }

    /// Open `node` and make it the selection.
    ///
    /// A local-only file at the same path wins over the remote copy.
    pub async fn select_file(&self, node: &FileNode) -> Result<WorkspaceFile> {
        if !node.is_file() {
            return Err(SyncError::NotAFile(node.path.clone()));
        }
        let _guard = self.begin()?;
        let (generation, (repo, branch)) = {
            let mut state = self.state();
            if state.store.local_file(&node.path).is_some() {
                debug!("Selecting local file {}", node.path);
                return state
                    .store
                    .select(&node.path)
                    .cloned()
                    .ok_or(SyncError::NoSelection);
            }
            (state.generation, state.active()?)
        };

        let content = self
            .gateway
            .get_file_content(&repo.owner, &repo.name, &node.path, &branch.name)
            .await?;
        let sha = node.sha().map(str::to_string);
        let file = WorkspaceFile::remote(node.path.clone(), content, sha);
        self.commit(generation, |s| s.store.open(file.clone()))?;
        Ok(file)
    }

    /// Children of the directory at `path`, from the cache when possible.
    ///
    /// Locally created nodes under `path` are appended. Without a repository
    /// only local nodes exist.
    pub async fn load_folder(&self, path: &str) -> Result<FolderListing> {
        let path = path.trim_matches('/');
        let _guard = self.begin()?;
        let (generation, (repo, branch)) = {
            let state = self.state();
            let local = state.store.local_children(path);
            let Ok(active) = state.active() else {
                return Ok(local);
            };
            if let Some(listing) = state.folders.get(path) {
                debug!("Folder '{}' served from cache", path);
                return Ok(with_local_children(listing.clone(), local));
            }
            (state.generation, active)
        };

        let listing = self
            .gateway
            .list_contents(&repo.owner, &repo.name, path, &branch.name)
            .await?;
        debug!("Fetched folder '{}' ({} entries)", path, listing.len());
        let local = self.commit(generation, |s| {
            s.folders.put(path, listing.clone());
            s.store.local_children(path)
        })?;
        Ok(with_local_children(listing, local))
    }

    // ==================== Authoring ====================

    /// Author a new local file called `name` at `path` and select it.
    ///
    /// `path` is the full path of the new file and must end with `name`.
    /// Without a repository the file is also staged for a later flush.
    pub fn create_local_file(&self, name: &str, path: &str) -> Result<WorkspaceFile> {
        let path = checked_entry_path(name, path)?;
        let _guard = self.begin()?;
        let content = templates::starter_content(name);

        {
            let mut state = self.state();
            if !state.store.insert_local(path, content.clone()) {
                return Err(path_taken(path));
            }
            if state.repository.is_none() {
                state.pending.stage(path, content.clone());
            }
        }

        info!("Created local file {}", path);
        self.emit(&ControllerEvent::FileCreated {
            path: path.to_string(),
        });
        Ok(WorkspaceFile::local(path, content))
    }

    /// Create an empty local folder called `name` at `path`.
    pub fn create_local_folder(&self, name: &str, path: &str) -> Result<FileNode> {
        let path = checked_entry_path(name, path)?;
        let _guard = self.begin()?;

        if !self.state().store.insert_local_dir(path) {
            return Err(path_taken(path));
        }

        info!("Created local folder {}", path);
        self.emit(&ControllerEvent::FolderCreated {
            path: path.to_string(),
        });
        Ok(FileNode::directory(path))
    }

    /// Replace the selected buffer. Returns whether the file is now dirty.
    ///
    /// Edits are accepted while an operation is in flight.
    pub fn set_buffer_content(&self, text: impl Into<String>) -> Result<bool> {
        self.state()
            .store
            .set_buffer_content(text.into())
            .ok_or(SyncError::NoSelection)
    }

    /// Run an assistant over the selected buffer.
    ///
    /// A `Some` result replaces the buffer. Returns whether it did.
    pub fn apply_assistant<F>(&self, assistant: F) -> Result<bool>
    where
        F: FnOnce(&str) -> Option<String>,
    {
        let buffer = self
            .state()
            .store
            .selected()
            .map(|f| f.buffer.clone())
            .ok_or(SyncError::NoSelection)?;

        match assistant(&buffer) {
            Some(code) => {
                self.set_buffer_content(code)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ==================== Saving ====================

    /// Save the selected file.
    pub async fn save(&self) -> Result<SaveOutcome> {
        let _guard = self.begin()?;
        self.save_selected().await
    }

    /// Push the workspace.
    ///
    /// Without a repository every local file is staged and the caller is
    /// asked to create one; otherwise this is [`save`](Self::save).
    pub async fn push(&self) -> Result<SaveOutcome> {
        let _guard = self.begin()?;

        let staged = {
            let mut state = self.state();
            if state.repository.is_none() && state.store.has_local_files() {
                let files: Vec<(String, String)> = state
                    .store
                    .local_files()
                    .map(|f| (f.path.clone(), f.buffer.clone()))
                    .collect();
                for (path, content) in files {
                    state.pending.stage(path, content);
                }
                Some(state.pending.len())
            } else {
                None
            }
        };
        if let Some(staged) = staged {
            info!("Staged {} local files; a repository is required", staged);
            self.emit(&ControllerEvent::RepositoryRequired { staged });
            return Ok(SaveOutcome::RepositoryRequired { staged });
        }

        let outcome = self.save_selected().await?;
        self.emit(&ControllerEvent::Pushed);
        Ok(outcome)
    }

    async fn save_selected(&self) -> Result<SaveOutcome> {
        let (generation, file, active) = {
            let state = self.state();
            let file = state.store.selected().cloned().ok_or(SyncError::NoSelection)?;
            (state.generation, file, state.active().ok())
        };

        if file.is_local() {
            return Ok(self.save_local(file, active.is_some()));
        }

        let (repo, branch) = active.ok_or(SyncError::NoRepository)?;
        if !file.is_dirty() {
            debug!("{} has no changes; nothing to save", file.path);
            return Ok(SaveOutcome::Unchanged { path: file.path });
        }

        let message = self.settings.update_message(file_name(&file.path));
        let write = self
            .gateway
            .update_file(
                &repo.owner,
                &repo.name,
                &file.path,
                &file.buffer,
                &message,
                file.sha.as_deref(),
                &branch.name,
            )
            .await?;

        self.commit(generation, |s| {
            s.store.record_write(&file.path, &file.buffer, &write);
            if let Some(sha) = &write.sha {
                s.folders.set_file_sha(&file.path, sha);
            }
            if let Some(commit) = &write.commit {
                s.advance_head(commit);
            }
        })?;
        info!("Saved {} to {}@{}", file.path, repo.full_name(), branch.name);
        self.emit(&ControllerEvent::Saved {
            path: file.path.clone(),
            remote: true,
        });

        // The write is already committed; a failed refresh still reaches the caller.
        let commits = self
            .gateway
            .list_commits(&repo.owner, &repo.name, &branch.name)
            .await
            .inspect_err(|e| warn!("Saved {} but could not refresh history: {}", file.path, e))?;
        self.commit(generation, |s| s.commits = commits)?;

        Ok(SaveOutcome::Saved {
            path: file.path,
            sha: write.sha,
        })
    }

    fn save_local(&self, file: WorkspaceFile, has_repository: bool) -> SaveOutcome {
        if !has_repository {
            let staged = {
                let mut state = self.state();
                state.pending.stage(file.path.as_str(), file.buffer.as_str());
                state.pending.len()
            };
            info!("Staged {}; a repository is required", file.path);
            self.emit(&ControllerEvent::RepositoryRequired { staged });
            return SaveOutcome::RepositoryRequired { staged };
        }

        self.state().store.mark_synced();
        debug!("Saved local file {} in the workspace only", file.path);
        self.emit(&ControllerEvent::Saved {
            path: file.path.clone(),
            remote: false,
        });
        SaveOutcome::SavedLocally { path: file.path }
    }

    // ==================== Repository creation ====================

    /// Whether `name` is free for a new repository.
    pub async fn check_repository_name(&self, name: &str) -> Result<bool> {
        let name = validate::repository_name(name)?;
        let exists = self.gateway.repository_exists(name).await?;
        debug!("Repository name {} available: {}", name, !exists);
        Ok(!exists)
    }

    /// Create a repository, select it, and write every staged file to it.
    ///
    /// Files are written one at a time in staging order. The first failure
    /// stops the flush; staged files stay staged and
    /// [`retry_flush`](Self::retry_flush) resumes after the last file that
    /// was written.
    pub async fn create_repository_and_flush(
        &self,
        name: &str,
        description: &str,
        private: bool,
    ) -> Result<FlushReport> {
        let name = validate::repository_name(name)?;
        let _guard = self.begin()?;
        let generation = self.generation();

        let repo = self
            .gateway
            .create_repository(name, description.trim(), private)
            .await?;
        info!("Created repository {}", repo.full_name());

        let branch = BranchRef::unborn(self.settings.default_branch.as_str());
        let (generation, entries) = self.commit(generation, |s| {
            s.generation += 1;
            s.repositories.retain(|r| r.full_name() != repo.full_name());
            s.repositories.insert(0, repo.clone());
            s.folders.rescope(Some(Self::scope_for(&repo, &branch.name)));
            s.store.drop_remote_files();
            s.store.replace_root(Vec::new());
            s.commits.clear();
            s.branches = vec![branch.clone()];
            s.branch = Some(branch);
            s.repository = Some(repo.clone());
            s.interrupted_flush = Some(InterruptedFlush {
                repository: repo.clone(),
                written: HashMap::new(),
            });
            (s.generation, s.pending.to_vec())
        })?;

        self.flush_entries(generation, &repo, entries).await
    }

    /// Resume a flush that stopped part-way.
    pub async fn retry_flush(&self) -> Result<FlushReport> {
        let _guard = self.begin()?;
        let (generation, repo, entries) = {
            let state = self.state();
            let flush = state
                .interrupted_flush
                .as_ref()
                .ok_or(SyncError::NothingToRetry)?;
            (state.generation, flush.repository.clone(), state.pending.to_vec())
        };
        info!(
            "Retrying flush of {} files to {}",
            entries.len(),
            repo.full_name()
        );
        self.flush_entries(generation, &repo, entries).await
    }

    async fn flush_entries(
        &self,
        generation: u64,
        repo: &RepositoryRef,
        entries: Vec<(String, String)>,
    ) -> Result<FlushReport> {
        let mut done: HashMap<String, FileWrite> = match &self.state().interrupted_flush {
            Some(flush) => flush.written.clone(),
            None => HashMap::new(),
        };
        let mut written = Vec::new();
        let mut skipped = Vec::new();

        for (path, content) in &entries {
            if done.contains_key(path) {
                debug!("Skipping {}: written by an earlier run", path);
                skipped.push(path.clone());
                continue;
            }
            let message = self.settings.create_message(file_name(path));
            let write = match self
                .gateway
                .create_file(&repo.owner, &repo.name, path, content, &message)
                .await
            {
                Ok(write) => write,
                Err(e) => {
                    warn!(
                        "Flush to {} stopped at {} after {} files: {}",
                        repo.full_name(),
                        path,
                        written.len(),
                        e
                    );
                    return Err(e.into());
                }
            };
            debug!("Wrote {} to {}", path, repo.full_name());
            self.commit(generation, |s| {
                if let Some(flush) = s.interrupted_flush.as_mut() {
                    flush.written.insert(path.clone(), write.clone());
                }
            })?;
            done.insert(path.clone(), write);
            written.push(path.clone());
        }

        let still_current = self.commit(generation, |s| {
            let current = s
                .repository
                .as_ref()
                .is_some_and(|r| r.full_name() == repo.full_name());
            if current {
                for (path, content) in &entries {
                    let write = done.get(path).cloned().unwrap_or_default();
                    s.store.adopt_remote(path, content, &write);
                }
                s.pending.clear();
                s.interrupted_flush = None;
            }
            current
        })?;
        if !still_current {
            warn!(
                "{} is no longer active; local files stay local",
                repo.full_name()
            );
        }

        let refreshed = still_current && self.refresh_after_flush(generation, repo).await;
        info!(
            "Flushed {} files to {} (refreshed: {})",
            written.len(),
            repo.full_name(),
            refreshed
        );
        self.emit(&ControllerEvent::Flushed {
            repository: repo.full_name(),
            files: written.len(),
        });

        Ok(FlushReport {
            repository: repo.clone(),
            written,
            skipped,
            refreshed,
        })
    }

    /// Reload the root listing and history after a flush. The flush itself
    /// already succeeded, so failures here are only logged.
    async fn refresh_after_flush(&self, generation: u64, repo: &RepositoryRef) -> bool {
        let Some(branch) = self.state().branch.clone() else {
            return false;
        };

        let root = match self
            .gateway
            .list_contents(&repo.owner, &repo.name, "", &branch.name)
            .await
        {
            Ok(root) => root,
            Err(e) => {
                warn!("Could not refresh {} after flush: {}", repo.full_name(), e);
                return false;
            }
        };
        let commits = match self
            .gateway
            .list_commits(&repo.owner, &repo.name, &branch.name)
            .await
        {
            Ok(commits) => commits,
            Err(e) => {
                warn!(
                    "Could not refresh history of {} after flush: {}",
                    repo.full_name(),
                    e
                );
                return false;
            }
        };

        self.commit(generation, |s| {
            s.folders.put("", root.clone());
            s.store.replace_root(root);
            if let Some(head) = commits.first().map(|c| c.sha.clone()) {
                s.advance_head(&head);
            }
            s.commits = commits;
        })
        .is_ok()
    }

    // ==================== Branches & history ====================

    /// Create `name` from the active branch's head and select it.
    ///
    /// Returns the selected branch, or `None` if the refreshed branch list
    /// does not contain it.
    pub async fn create_branch(&self, name: &str) -> Result<Option<BranchRef>> {
        let name = validate::branch_name(name)?;
        let _guard = self.begin()?;
        let (generation, repo, base) = {
            let state = self.state();
            let (repo, branch) = state.active()?;
            let base = branch
                .head
                .clone()
                .ok_or_else(|| SyncError::MissingHead(branch.name.clone()))?;
            (state.generation, repo, base)
        };

        self.gateway
            .create_branch(&repo.owner, &repo.name, name, &base)
            .await?;
        info!("Created branch {} at {}", name, base);

        let branches = self.gateway.list_branches(&repo.owner, &repo.name).await?;
        let created = pick_created_branch(&branches, name, &base);
        self.commit(generation, |s| {
            s.branches = branches;
            if let Some(branch) = &created {
                // The new branch starts at the base head, so its root is unchanged.
                let root = s.folders.get("").cloned();
                s.folders.rescope(Some(Self::scope_for(&repo, &branch.name)));
                if let Some(root) = root {
                    s.folders.put("", root);
                }
                s.branch = Some(branch.clone());
            }
        })?;

        match &created {
            Some(branch) => self.emit(&ControllerEvent::BranchCreated {
                name: branch.name.clone(),
            }),
            None => warn!("Branch {} is missing from the refreshed branch list", name),
        }
        Ok(created)
    }

    /// Refetch the active branch's commit history.
    pub async fn refresh_history(&self) -> Result<Vec<CommitRecord>> {
        let _guard = self.begin()?;
        let (generation, (repo, branch)) = {
            let state = self.state();
            (state.generation, state.active()?)
        };

        let commits = self
            .gateway
            .list_commits(&repo.owner, &repo.name, &branch.name)
            .await?;
        self.commit(generation, |s| {
            if let Some(head) = commits.first().map(|c| c.sha.clone()) {
                s.advance_head(&head);
            }
            s.commits = commits.clone();
        })?;
        Ok(commits)
    }

    // ==================== Accessors ====================

    /// The gateway this controller talks to.
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Controller settings.
    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    /// Whether an operation is in flight.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Current generation. Bumped whenever the workspace is replaced.
    pub fn generation(&self) -> u64 {
        self.state().generation
    }

    /// The authenticated user.
    pub fn user(&self) -> Option<User> {
        self.state().user.clone()
    }

    /// Repositories visible to the user.
    pub fn repositories(&self) -> Vec<RepositoryRef> {
        self.state().repositories.clone()
    }

    /// The active repository.
    pub fn repository(&self) -> Option<RepositoryRef> {
        self.state().repository.clone()
    }

    /// Branches of the active repository.
    pub fn branches(&self) -> Vec<BranchRef> {
        self.state().branches.clone()
    }

    /// The active branch.
    pub fn branch(&self) -> Option<BranchRef> {
        self.state().branch.clone()
    }

    /// Commit history of the active branch, newest first.
    pub fn commits(&self) -> Vec<CommitRecord> {
        self.state().commits.clone()
    }

    /// Root snapshot, remote nodes first, then local ones.
    pub fn nodes(&self) -> Vec<FileNode> {
        self.state().store.nodes().to_vec()
    }

    /// The selected file.
    pub fn selected_file(&self) -> Option<WorkspaceFile> {
        self.state().store.selected().cloned()
    }

    /// An opened or authored file.
    pub fn file(&self, path: &str) -> Option<WorkspaceFile> {
        self.state().store.file(path).cloned()
    }

    /// Staged `(path, content)` pairs in staging order.
    pub fn pending_entries(&self) -> Vec<(String, String)> {
        self.state().pending.to_vec()
    }

    /// Whether a failed flush can be resumed with
    /// [`retry_flush`](Self::retry_flush).
    pub fn has_interrupted_flush(&self) -> bool {
        self.state().interrupted_flush.is_some()
    }

    /// The cached listing for `path`, without fetching.
    pub fn cached_folder(&self, path: &str) -> Option<FolderListing> {
        self.state().folders.get(path).cloned()
    }

    /// The scope current cache entries belong to.
    pub fn cache_scope(&self) -> Option<CacheScope> {
        self.state().folders.scope().cloned()
    }
}

fn checked_entry_path<'a>(name: &str, path: &'a str) -> Result<&'a str> {
    validate::entry_name(name)?;
    let path = path.trim_matches('/');
    if file_name(path) != name {
        return Err(SyncError::InvalidName {
            name: name.to_string(),
            reason: format!("path '{path}' does not end with the name"),
        });
    }
    Ok(path)
}

fn path_taken(path: &str) -> SyncError {
    SyncError::InvalidName {
        name: file_name(path).to_string(),
        reason: format!("'{path}' already exists"),
    }
}

fn with_local_children(mut listing: FolderListing, local: Vec<FileNode>) -> FolderListing {
    for node in local {
        if !listing.iter().any(|n| n.path == node.path) {
            listing.push(node);
        }
    }
    listing
}

/// The branch called `name` in a refreshed list. When the remote reports the
/// name more than once, prefer the entry pointing at `base`.
fn pick_created_branch(branches: &[BranchRef], name: &str, base: &str) -> Option<BranchRef> {
    let mut matching = branches.iter().filter(|b| b.name == name);
    let first = matching.next()?;
    if first.head.as_deref() == Some(base) {
        return Some(first.clone());
    }
    Some(
        matching
            .find(|b| b.head.as_deref() == Some(base))
            .unwrap_or(first)
            .clone(),
    )
}
