//! Error types for the sync engine.
//!
//! [`GatewayError`] is what a [`RemoteGateway`](crate::gateway::RemoteGateway)
//! returns. [`SyncError`] is what the controller returns: either a gateway
//! error passed through unmodified, or a precondition the controller checked
//! itself before touching the remote.

use serde::Serialize;
use thiserror::Error;

/// Failure of a single remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The credential was rejected or has expired.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The path, branch or repository does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The concurrency token was stale; the remote file changed since it was read.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Transport-level failure (DNS, TLS, connection reset, timeout).
    #[error("network error: {0}")]
    Network(String),

    /// The remote rejected the input, e.g. a repository name that already exists.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The remote answered with a payload we could not interpret.
    #[error("unexpected response: {0}")]
    Decode(String),
}

/// Fieldless discriminant of [`GatewayError`], for matching and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum ErrorKind {
    Auth,
    NotFound,
    Conflict,
    Network,
    Validation,
    Decode,
}

impl GatewayError {
    /// The kind of failure, without its message.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Auth(_) => ErrorKind::Auth,
            GatewayError::NotFound(_) => ErrorKind::NotFound,
            GatewayError::Conflict(_) => ErrorKind::Conflict,
            GatewayError::Network(_) => ErrorKind::Network,
            GatewayError::Validation(_) => ErrorKind::Validation,
            GatewayError::Decode(_) => ErrorKind::Decode,
        }
    }
}

/// Errors surfaced by [`SyncController`](crate::controller::SyncController).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// A remote call failed. The message is the gateway's own.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Another controller operation is still in flight.
    #[error("another operation is in progress")]
    Busy,

    /// The workspace was reset (logout, repository switch) while this
    /// operation was waiting on the remote; its result was discarded.
    #[error("operation superseded by a newer one")]
    Superseded,

    /// The operation needs an active repository.
    #[error("no repository selected")]
    NoRepository,

    /// The operation needs an active branch.
    #[error("no branch selected")]
    NoBranch,

    /// The operation needs a selected file.
    #[error("no file selected")]
    NoSelection,

    /// A directory was passed where a file was expected.
    #[error("not a file: {0}")]
    NotAFile(String),

    /// The active branch has no head commit to branch from.
    #[error("branch '{0}' has no commits yet")]
    MissingHead(String),

    /// A repository, branch or file name failed local validation.
    #[error("invalid name '{name}': {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// `retry_flush` was called without a previously interrupted flush.
    #[error("no interrupted flush to retry")]
    NothingToRetry,
}

impl SyncError {
    /// The gateway failure kind, if this error came from the remote.
    pub fn gateway_kind(&self) -> Option<ErrorKind> {
        match self {
            SyncError::Gateway(e) => Some(e.kind()),
            _ => None,
        }
    }
}

/// Result alias used throughout the controller.
pub type Result<T, E = SyncError> = std::result::Result<T, E>;
