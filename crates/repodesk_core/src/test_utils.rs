//! Test utilities for repodesk_core
//!
//! [`MockGateway`] is an in-memory [`RemoteGateway`] that records every call,
//! can be told to fail, and can hold a call open until the test releases it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;

use crate::error::GatewayError;
use crate::gateway::{GatewayResult, RemoteGateway};
use crate::model::{
    BranchRef, CommitRecord, FileNode, FileWrite, RepositoryRef, User, join_path,
};

/// One recorded gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum GatewayCall {
    GetUser,
    ListRepositories,
    ListBranches {
        repo: String,
    },
    ListContents {
        repo: String,
        path: String,
        git_ref: String,
    },
    GetFileContent {
        repo: String,
        path: String,
        git_ref: String,
    },
    UpdateFile {
        repo: String,
        path: String,
        content: String,
        known_sha: Option<String>,
        branch: String,
    },
    CreateFile {
        repo: String,
        path: String,
        content: String,
    },
    CreateRepository {
        name: String,
        private: bool,
    },
    RepositoryExists {
        name: String,
    },
    CreateBranch {
        repo: String,
        name: String,
        base: String,
    },
    ListCommits {
        repo: String,
        branch: String,
    },
}

impl GatewayCall {
    /// The gateway method name, as used by [`MockGateway::fail_on`] and
    /// [`MockGateway::hold`].
    pub fn method(&self) -> &'static str {
        match self {
            GatewayCall::GetUser => "get_user",
            GatewayCall::ListRepositories => "list_repositories",
            GatewayCall::ListBranches { .. } => "list_branches",
            GatewayCall::ListContents { .. } => "list_contents",
            GatewayCall::GetFileContent { .. } => "get_file_content",
            GatewayCall::UpdateFile { .. } => "update_file",
            GatewayCall::CreateFile { .. } => "create_file",
            GatewayCall::CreateRepository { .. } => "create_repository",
            GatewayCall::RepositoryExists { .. } => "repository_exists",
            GatewayCall::CreateBranch { .. } => "create_branch",
            GatewayCall::ListCommits { .. } => "list_commits",
        }
    }

    /// Whether the call changes remote state.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            GatewayCall::UpdateFile { .. }
                | GatewayCall::CreateFile { .. }
                | GatewayCall::CreateRepository { .. }
                | GatewayCall::CreateBranch { .. }
        )
    }
}

#[derive(Debug, Clone)]
struct StoredFile {
    content: String,
    sha: String,
}

#[derive(Default)]
struct Remote {
    user: Option<User>,
    repositories: Vec<RepositoryRef>,
    /// repo full name -> branches
    branches: HashMap<String, Vec<BranchRef>>,
    /// "repo@branch" -> path -> file
    files: HashMap<String, BTreeMap<String, StoredFile>>,
    /// "repo@branch" -> commits, newest first
    commits: HashMap<String, Vec<CommitRecord>>,
    calls: Vec<GatewayCall>,
    method_failures: HashMap<String, GatewayError>,
    path_failures: HashMap<String, GatewayError>,
    gates: HashMap<String, Arc<Notify>>,
    counter: u64,
}

fn key(repo: &str, branch: &str) -> String {
    format!("{repo}@{branch}")
}

fn full(owner: &str, repo: &str) -> String {
    format!("{owner}/{repo}")
}

impl Remote {
    fn next_id(&mut self, prefix: &str) -> String {
        self.counter += 1;
        format!("{prefix}{}", self.counter)
    }

    fn branch_exists(&self, repo: &str, branch: &str) -> bool {
        self.branches
            .get(repo)
            .is_some_and(|list| list.iter().any(|b| b.name == branch))
    }

    /// Record a commit on `repo@branch` and move the branch head to it.
    fn add_commit(&mut self, repo: &str, branch: &str, message: &str) -> String {
        let sha = self.next_id("commit");
        let author = self
            .user
            .as_ref()
            .map(|u| u.login.clone())
            .unwrap_or_default();
        self.commits.entry(key(repo, branch)).or_default().insert(
            0,
            CommitRecord {
                sha: sha.clone(),
                message: message.to_string(),
                author,
                timestamp: Utc::now(),
            },
        );
        let list = self.branches.entry(repo.to_string()).or_default();
        match list.iter_mut().find(|b| b.name == branch) {
            Some(b) => b.head = Some(sha.clone()),
            None => list.push(BranchRef::new(branch, sha.clone())),
        }
        sha
    }
}

/// In-memory remote for controller tests.
///
/// Clones share the same remote, so a test can keep a handle for assertions
/// after moving one into a controller.
#[derive(Clone, Default)]
pub struct MockGateway {
    remote: Arc<Mutex<Remote>>,
}

impl MockGateway {
    /// A remote whose user is `octo` and that has no repositories.
    pub fn new() -> Self {
        Self::default().with_user("octo")
    }

    /// Set the authenticated user (builder pattern).
    pub fn with_user(self, login: &str) -> Self {
        self.remote.lock().unwrap().user = Some(User {
            login: login.to_string(),
            name: None,
            avatar_url: None,
        });
        self
    }

    /// Add a repository (builder pattern).
    pub fn with_repository(self, repo: RepositoryRef) -> Self {
        self.remote.lock().unwrap().repositories.push(repo);
        self
    }

    /// Add a branch to `repo` (`owner/name`) (builder pattern).
    pub fn with_branch(self, repo: &str, branch: BranchRef) -> Self {
        self.remote
            .lock()
            .unwrap()
            .branches
            .entry(repo.to_string())
            .or_default()
            .push(branch);
        self
    }

    /// Add a file to `repo@branch` (builder pattern).
    pub fn with_file(self, repo: &str, branch: &str, path: &str, content: &str) -> Self {
        {
            let mut remote = self.remote.lock().unwrap();
            let sha = remote.next_id("blob");
            remote.files.entry(key(repo, branch)).or_default().insert(
                path.to_string(),
                StoredFile {
                    content: content.to_string(),
                    sha,
                },
            );
        }
        self
    }

    /// Add a commit to the history of `repo@branch` (builder pattern).
    /// Commits are listed in the order they were added.
    pub fn with_commit(self, repo: &str, branch: &str, sha: &str, message: &str) -> Self {
        self.remote
            .lock()
            .unwrap()
            .commits
            .entry(key(repo, branch))
            .or_default()
            .push(CommitRecord {
                sha: sha.to_string(),
                message: message.to_string(),
                author: "octo".to_string(),
                timestamp: Utc::now(),
            });
        self
    }

    /// Make every call to `method` fail with `error` until cleared.
    pub fn fail_on(&self, method: &str, error: GatewayError) {
        self.remote
            .lock()
            .unwrap()
            .method_failures
            .insert(method.to_string(), error);
    }

    /// Make reads and writes of `path` fail with `error` until cleared.
    pub fn fail_path(&self, path: &str, error: GatewayError) {
        self.remote
            .lock()
            .unwrap()
            .path_failures
            .insert(path.to_string(), error);
    }

    /// Remove every injected failure.
    pub fn clear_failures(&self) {
        let mut remote = self.remote.lock().unwrap();
        remote.method_failures.clear();
        remote.path_failures.clear();
    }

    /// Hold every future call to `method` open until [`release`](Self::release).
    /// The call is recorded before it blocks.
    pub fn hold(&self, method: &str) {
        self.remote
            .lock()
            .unwrap()
            .gates
            .insert(method.to_string(), Arc::new(Notify::new()));
    }

    /// Let one held call to `method` continue and stop holding new ones.
    pub fn release(&self, method: &str) {
        if let Some(gate) = self.remote.lock().unwrap().gates.remove(method) {
            gate.notify_one();
        }
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.remote.lock().unwrap().calls.clone()
    }

    /// Calls that change remote state, in order.
    pub fn write_calls(&self) -> Vec<GatewayCall> {
        self.calls().into_iter().filter(GatewayCall::is_write).collect()
    }

    /// Number of calls to `method`.
    pub fn call_count(&self, method: &str) -> usize {
        self.calls().iter().filter(|c| c.method() == method).count()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.remote.lock().unwrap().calls.clear();
    }

    /// Content of a file on the remote.
    pub fn file_content(&self, repo: &str, branch: &str, path: &str) -> Option<String> {
        self.remote
            .lock()
            .unwrap()
            .files
            .get(&key(repo, branch))
            .and_then(|files| files.get(path))
            .map(|f| f.content.clone())
    }

    /// Current content hash of a file on the remote.
    pub fn file_sha(&self, repo: &str, branch: &str, path: &str) -> Option<String> {
        self.remote
            .lock()
            .unwrap()
            .files
            .get(&key(repo, branch))
            .and_then(|files| files.get(path))
            .map(|f| f.sha.clone())
    }

    /// Record `call`, wait on its gate if held, then apply injected failures.
    async fn enter(&self, call: GatewayCall, path: Option<&str>) -> GatewayResult<()> {
        let method = call.method();
        let gate = {
            let mut remote = self.remote.lock().unwrap();
            remote.calls.push(call);
            remote.gates.get(method).cloned()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let remote = self.remote.lock().unwrap();
        if let Some(error) = remote.method_failures.get(method) {
            return Err(error.clone());
        }
        if let Some(error) = path.and_then(|p| remote.path_failures.get(p)) {
            return Err(error.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteGateway for MockGateway {
    async fn get_user(&self) -> GatewayResult<User> {
        self.enter(GatewayCall::GetUser, None).await?;
        self.remote
            .lock()
            .unwrap()
            .user
            .clone()
            .ok_or_else(|| GatewayError::Auth("no user".to_string()))
    }

    async fn list_repositories(&self) -> GatewayResult<Vec<RepositoryRef>> {
        self.enter(GatewayCall::ListRepositories, None).await?;
        Ok(self.remote.lock().unwrap().repositories.clone())
    }

    async fn list_branches(&self, owner: &str, repo: &str) -> GatewayResult<Vec<BranchRef>> {
        let repo = full(owner, repo);
        self.enter(GatewayCall::ListBranches { repo: repo.clone() }, None)
            .await?;
        Ok(self
            .remote
            .lock()
            .unwrap()
            .branches
            .get(&repo)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_contents(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> GatewayResult<Vec<FileNode>> {
        let repo = full(owner, repo);
        let call = GatewayCall::ListContents {
            repo: repo.clone(),
            path: path.to_string(),
            git_ref: git_ref.to_string(),
        };
        self.enter(call, Some(path)).await?;

        let remote = self.remote.lock().unwrap();
        let files = remote
            .files
            .get(&key(&repo, git_ref))
            .ok_or_else(|| GatewayError::NotFound(format!("{repo}@{git_ref}")))?;

        let mut dirs = HashSet::new();
        let mut listing = Vec::new();
        for (file_path, file) in files {
            let Some(rest) = (if path.is_empty() {
                Some(file_path.as_str())
            } else {
                file_path
                    .strip_prefix(path)
                    .and_then(|r| r.strip_prefix('/'))
            }) else {
                continue;
            };
            match rest.split_once('/') {
                None => listing.push(FileNode::file(
                    file_path.clone(),
                    Some(file.sha.clone()),
                    Some(file.content.len() as u64),
                )),
                Some((dir, _)) => {
                    if dirs.insert(dir.to_string()) {
                        listing.push(FileNode::directory(join_path(path, dir)));
                    }
                }
            }
        }
        if listing.is_empty() && !path.is_empty() {
            return Err(GatewayError::NotFound(path.to_string()));
        }
        listing.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }

    async fn get_file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> GatewayResult<String> {
        let repo = full(owner, repo);
        let call = GatewayCall::GetFileContent {
            repo: repo.clone(),
            path: path.to_string(),
            git_ref: git_ref.to_string(),
        };
        self.enter(call, Some(path)).await?;

        self.remote
            .lock()
            .unwrap()
            .files
            .get(&key(&repo, git_ref))
            .and_then(|files| files.get(path))
            .map(|f| f.content.clone())
            .ok_or_else(|| GatewayError::NotFound(path.to_string()))
    }

    async fn update_file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        content: &str,
        message: &str,
        known_sha: Option<&str>,
        branch: &str,
    ) -> GatewayResult<FileWrite> {
        let repo = full(owner, repo);
        let call = GatewayCall::UpdateFile {
            repo: repo.clone(),
            path: path.to_string(),
            content: content.to_string(),
            known_sha: known_sha.map(str::to_string),
            branch: branch.to_string(),
        };
        self.enter(call, Some(path)).await?;

        let mut remote = self.remote.lock().unwrap();
        let current = remote
            .files
            .get(&key(&repo, branch))
            .and_then(|files| files.get(path))
            .map(|f| f.sha.clone());
        if current.as_deref() != known_sha {
            return Err(GatewayError::Conflict(format!(
                "{path} does not match {}",
                known_sha.unwrap_or("(none)")
            )));
        }

        let sha = remote.next_id("blob");
        remote.files.entry(key(&repo, branch)).or_default().insert(
            path.to_string(),
            StoredFile {
                content: content.to_string(),
                sha: sha.clone(),
            },
        );
        let commit = remote.add_commit(&repo, branch, message);
        Ok(FileWrite {
            sha: Some(sha),
            commit: Some(commit),
        })
    }

    async fn create_file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> GatewayResult<FileWrite> {
        let repo = full(owner, repo);
        let call = GatewayCall::CreateFile {
            repo: repo.clone(),
            path: path.to_string(),
            content: content.to_string(),
        };
        self.enter(call, Some(path)).await?;

        let mut remote = self.remote.lock().unwrap();
        let branch = remote
            .repositories
            .iter()
            .find(|r| r.full_name() == repo)
            .map(|r| r.default_branch.clone())
            .ok_or_else(|| GatewayError::NotFound(repo.clone()))?;
        let files = remote.files.entry(key(&repo, &branch)).or_default();
        if files.contains_key(path) {
            return Err(GatewayError::Validation(format!("{path} already exists")));
        }

        let sha = remote.next_id("blob");
        remote.files.entry(key(&repo, &branch)).or_default().insert(
            path.to_string(),
            StoredFile {
                content: content.to_string(),
                sha: sha.clone(),
            },
        );
        let commit = remote.add_commit(&repo, &branch, message);
        Ok(FileWrite {
            sha: Some(sha),
            commit: Some(commit),
        })
    }

    async fn create_repository(
        &self,
        name: &str,
        description: &str,
        private: bool,
    ) -> GatewayResult<RepositoryRef> {
        let call = GatewayCall::CreateRepository {
            name: name.to_string(),
            private,
        };
        self.enter(call, None).await?;

        let mut remote = self.remote.lock().unwrap();
        let owner = remote
            .user
            .as_ref()
            .map(|u| u.login.clone())
            .ok_or_else(|| GatewayError::Auth("no user".to_string()))?;
        if remote.repositories.iter().any(|r| r.name == name && r.owner == owner) {
            return Err(GatewayError::Validation(format!(
                "name already exists on this account: {name}"
            )));
        }
        let mut repo = RepositoryRef::new(owner, name, "main");
        repo.description = (!description.is_empty()).then(|| description.to_string());
        repo.private = private;
        remote.repositories.push(repo.clone());
        Ok(repo)
    }

    async fn repository_exists(&self, name: &str) -> GatewayResult<bool> {
        let call = GatewayCall::RepositoryExists {
            name: name.to_string(),
        };
        self.enter(call, None).await?;

        let remote = self.remote.lock().unwrap();
        let owner = remote.user.as_ref().map(|u| u.login.as_str());
        Ok(remote
            .repositories
            .iter()
            .any(|r| r.name == name && Some(r.owner.as_str()) == owner))
    }

    async fn create_branch(
        &self,
        owner: &str,
        repo: &str,
        name: &str,
        base_commit: &str,
    ) -> GatewayResult<BranchRef> {
        let repo = full(owner, repo);
        let call = GatewayCall::CreateBranch {
            repo: repo.clone(),
            name: name.to_string(),
            base: base_commit.to_string(),
        };
        self.enter(call, None).await?;

        let mut remote = self.remote.lock().unwrap();
        if remote.branch_exists(&repo, name) {
            return Err(GatewayError::Validation("Reference already exists".to_string()));
        }
        let source = remote
            .branches
            .get(&repo)
            .and_then(|list| list.iter().find(|b| b.head.as_deref() == Some(base_commit)))
            .map(|b| b.name.clone());
        if let Some(source) = source {
            let files = remote.files.get(&key(&repo, &source)).cloned().unwrap_or_default();
            let commits = remote
                .commits
                .get(&key(&repo, &source))
                .cloned()
                .unwrap_or_default();
            remote.files.insert(key(&repo, name), files);
            remote.commits.insert(key(&repo, name), commits);
        }

        let branch = BranchRef::new(name, base_commit);
        remote
            .branches
            .entry(repo)
            .or_default()
            .push(branch.clone());
        Ok(branch)
    }

    async fn list_commits(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> GatewayResult<Vec<CommitRecord>> {
        let repo = full(owner, repo);
        let call = GatewayCall::ListCommits {
            repo: repo.clone(),
            branch: branch.to_string(),
        };
        self.enter(call, None).await?;

        Ok(self
            .remote
            .lock()
            .unwrap()
            .commits
            .get(&key(&repo, branch))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{file_name, parent_path};

    const REPO: &str = "octo/site";

    fn gateway() -> MockGateway {
        MockGateway::new()
            .with_repository(RepositoryRef::new("octo", "site", "main"))
            .with_branch(REPO, BranchRef::new("main", "c1"))
            .with_file(REPO, "main", "index.html", "<html>")
            .with_file(REPO, "main", "src/app.js", "app")
            .with_file(REPO, "main", "src/lib/util.js", "util")
    }

    #[tokio::test]
    async fn test_listing_synthesizes_directories() {
        let gateway = gateway();
        let root = gateway.list_contents("octo", "site", "", "main").await.unwrap();
        let names: Vec<_> = root.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["index.html", "src"]);
        assert!(root[1].is_dir());

        let src = gateway.list_contents("octo", "site", "src", "main").await.unwrap();
        let paths: Vec<_> = src.iter().map(|n| n.path.as_str()).collect();
        assert_eq!(paths, vec!["src/app.js", "src/lib"]);
        assert_eq!(file_name(&src[0].path), "app.js");
        assert_eq!(parent_path(&src[1].path), "src");
    }

    #[tokio::test]
    async fn test_update_rejects_stale_sha() {
        let gateway = gateway();
        let sha = gateway.file_sha(REPO, "main", "index.html");

        let write = gateway
            .update_file("octo", "site", "index.html", "v2", "m", sha.as_deref(), "main")
            .await
            .unwrap();
        assert_ne!(write.sha, sha);

        let err = gateway
            .update_file("octo", "site", "index.html", "v3", "m", sha.as_deref(), "main")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Conflict(_)));
        assert_eq!(gateway.file_content(REPO, "main", "index.html").as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_failures_are_injected_after_recording() {
        let gateway = gateway();
        gateway.fail_on("get_user", GatewayError::Auth("bad token".into()));

        assert!(gateway.get_user().await.is_err());
        assert_eq!(gateway.calls(), vec![GatewayCall::GetUser]);

        gateway.clear_failures();
        assert_eq!(gateway.get_user().await.unwrap().login, "octo");
    }
}
