//! Data model shared by the store, the cache and the gateway.
//!
//! Paths are remote-style: `/`-separated, relative to the repository root,
//! no leading slash. The root directory is the empty string.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The authenticated account behind the remote credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Login name; also the owner of repositories created through the gateway.
    pub login: String,
    /// Display name, when the account has one.
    pub name: Option<String>,
    /// Avatar image URL.
    pub avatar_url: Option<String>,
}

/// Identity of a remote repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    /// Owning account or organization.
    pub owner: String,
    /// Repository name, unique per owner.
    pub name: String,
    /// Branch the remote considers the default.
    pub default_branch: String,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Whether the repository is private.
    #[serde(default)]
    pub private: bool,
}

impl RepositoryRef {
    /// A public repository with no description.
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        default_branch: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            default_branch: default_branch.into(),
            description: None,
            private: false,
        }
    }

    /// `owner/name`.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// A branch and the commit it points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRef {
    /// Branch name.
    pub name: String,
    /// Head commit id. `None` for a branch with no commits yet.
    pub head: Option<String>,
}

impl BranchRef {
    /// A branch pointing at `head`.
    pub fn new(name: impl Into<String>, head: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            head: Some(head.into()),
        }
    }

    /// A branch that does not point at any commit yet.
    pub fn unborn(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            head: None,
        }
    }
}

/// What a [`FileNode`] is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    /// A regular file.
    File {
        /// Content hash, used as the concurrency token on update.
        /// `None` for files that only exist locally.
        sha: Option<String>,
        /// Size in bytes, when the remote reported one.
        size: Option<u64>,
    },
    /// A directory; its children are loaded lazily.
    Directory,
}

/// One entry of a tree snapshot or folder listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    /// Full path from the repository root.
    pub path: String,
    /// Last path component.
    pub name: String,
    /// File or directory.
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl FileNode {
    /// A remote file node.
    pub fn file(path: impl Into<String>, sha: Option<String>, size: Option<u64>) -> Self {
        let path = path.into();
        Self {
            name: file_name(&path).to_string(),
            path,
            kind: NodeKind::File { sha, size },
        }
    }

    /// A directory node.
    pub fn directory(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            name: file_name(&path).to_string(),
            path,
            kind: NodeKind::Directory,
        }
    }

    /// Whether this is a file.
    pub fn is_file(&self) -> bool {
        matches!(self.kind, NodeKind::File { .. })
    }

    /// Whether this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory)
    }

    /// The content hash, for files that have one.
    pub fn sha(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::File { sha, .. } => sha.as_deref(),
            NodeKind::Directory => None,
        }
    }

    /// Path of the directory containing this node (`""` for root entries).
    pub fn parent(&self) -> &str {
        parent_path(&self.path)
    }
}

/// Children of one directory, in remote order.
pub type FolderListing = Vec<FileNode>;

/// Where a workspace file's content lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Authored here; no remote object exists yet.
    LocalOnly,
    /// Pulled from, and saved back to, the remote repository.
    RemoteBacked,
}

/// A file the user has opened or authored, with its editable buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceFile {
    /// Full path from the repository root.
    pub path: String,
    /// Current editor content.
    pub buffer: String,
    /// Content as of the last load or successful save.
    pub last_synced: String,
    /// Local or remote.
    pub origin: Origin,
    /// Last-known remote content hash. Always `None` for local files.
    pub sha: Option<String>,
}

impl WorkspaceFile {
    /// A freshly loaded remote file; buffer and last-synced content are equal.
    pub fn remote(path: impl Into<String>, content: String, sha: Option<String>) -> Self {
        Self {
            path: path.into(),
            last_synced: content.clone(),
            buffer: content,
            origin: Origin::RemoteBacked,
            sha,
        }
    }

    /// A newly authored local file. It starts dirty: nothing has been saved yet.
    pub fn local(path: impl Into<String>, content: String) -> Self {
        Self {
            path: path.into(),
            buffer: content,
            last_synced: String::new(),
            origin: Origin::LocalOnly,
            sha: None,
        }
    }

    /// `buffer != last_synced`. Computed on every call.
    pub fn is_dirty(&self) -> bool {
        self.buffer != self.last_synced
    }

    /// Whether the file has no remote counterpart yet.
    pub fn is_local(&self) -> bool {
        self.origin == Origin::LocalOnly
    }
}

/// One entry of a branch's commit history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Commit id.
    pub sha: String,
    /// Full commit message.
    pub message: String,
    /// Author display name.
    pub author: String,
    /// Author timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Receipt of a successful file write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileWrite {
    /// New content hash of the written file.
    pub sha: Option<String>,
    /// Commit created by the write.
    pub commit: Option<String>,
}

/// Last component of `path`.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Directory part of `path`, `""` at the root.
pub fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Joins a directory path and a child name.
pub fn join_path(dir: &str, name: &str) -> String {
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}
