//! The remote repository contract.
//!
//! [`RemoteGateway`] is the only way the controller reaches the remote. Every
//! method is one request/response exchange; implementations must not retry,
//! cache or batch. File content always travels as complete text.

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::model::{BranchRef, CommitRecord, FileNode, FileWrite, RepositoryRef, User};

/// Result of a single gateway call.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Stateless facade over a remote repository host.
///
/// Implementations must be `Send + Sync` so a controller can be shared
/// across tasks.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// The account behind the credential.
    async fn get_user(&self) -> GatewayResult<User>;

    /// Repositories visible to the account.
    async fn list_repositories(&self) -> GatewayResult<Vec<RepositoryRef>>;

    /// All branches of `owner/repo`.
    async fn list_branches(&self, owner: &str, repo: &str) -> GatewayResult<Vec<BranchRef>>;

    /// Direct children of `path` (`""` is the root) at `git_ref`.
    async fn list_contents(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> GatewayResult<Vec<FileNode>>;

    /// Full text of the file at `path` on `git_ref`.
    async fn get_file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> GatewayResult<String>;

    /// Replace an existing file on `branch`.
    ///
    /// `known_sha` is the concurrency token; if the remote file no longer has
    /// that hash the call fails with [`GatewayError::Conflict`].
    #[allow(clippy::too_many_arguments)]
    async fn update_file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        content: &str,
        message: &str,
        known_sha: Option<&str>,
        branch: &str,
    ) -> GatewayResult<FileWrite>;

    /// Create a new file on the repository's default branch.
    async fn create_file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> GatewayResult<FileWrite>;

    /// Create a repository owned by the authenticated account.
    async fn create_repository(
        &self,
        name: &str,
        description: &str,
        private: bool,
    ) -> GatewayResult<RepositoryRef>;

    /// Whether the authenticated account already owns a repository called `name`.
    ///
    /// Implementations may need a prior [`get_user`](Self::get_user) to know
    /// the account and fail with [`GatewayError::Auth`] without it.
    async fn repository_exists(&self, name: &str) -> GatewayResult<bool>;

    /// Create branch `name` pointing at `base_commit`.
    async fn create_branch(
        &self,
        owner: &str,
        repo: &str,
        name: &str,
        base_commit: &str,
    ) -> GatewayResult<BranchRef>;

    /// Recent commits on `branch`, newest first.
    async fn list_commits(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> GatewayResult<Vec<CommitRecord>>;
}
