//! # `repodesk_core`
//!
//! Workspace synchronization engine for Repodesk.
//!
//! Repodesk lets someone author files in the browser-style workspace before a
//! repository exists, then create a repository and push everything they typed
//! in one go. This crate holds everything that decides *what* the workspace
//! looks like:
//!
//! 1. [`WorkspaceStore`]: the tree snapshot, open files and the selection
//! 2. [`FolderCache`]: lazily fetched directory listings for one branch
//! 3. [`PendingChangeSet`]: local files staged until a repository exists
//! 4. [`SyncController`]: the only thing that mutates the above or talks to
//!    the remote, through a [`RemoteGateway`]
//!
//! The GitHub implementation of [`RemoteGateway`] lives in `repodesk_github`.

#![warn(missing_docs)]

/// Sync controller
pub mod controller;

/// Error types
pub mod error;

pub mod folder_cache;
pub mod gateway;

/// Data model
pub mod model;

pub mod pending;
pub mod settings;
pub mod templates;
pub mod validate;
pub mod workspace;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use controller::{ControllerEvent, EventCallback, FlushReport, SaveOutcome, SyncController};
pub use error::{ErrorKind, GatewayError, Result, SyncError};
pub use folder_cache::{CacheScope, FolderCache};
pub use gateway::{GatewayResult, RemoteGateway};
pub use model::{
    BranchRef, CommitRecord, FileNode, FileWrite, FolderListing, NodeKind, Origin, RepositoryRef,
    User, WorkspaceFile,
};
pub use pending::PendingChangeSet;
pub use settings::ControllerSettings;
pub use workspace::WorkspaceStore;
