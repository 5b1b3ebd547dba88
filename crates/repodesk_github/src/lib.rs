//! # `repodesk_github`
//!
//! GitHub implementation of [`repodesk_core::RemoteGateway`].
//!
//! ```no_run
//! use repodesk_core::SyncController;
//! use repodesk_github::GitHubGateway;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let controller = SyncController::new(GitHubGateway::from_env()?);
//! let user = controller.connect().await?;
//! println!("signed in as {}", user.login);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

/// HTTP client
pub mod client;

/// Environment configuration
pub mod config;

mod dto;

pub use client::GitHubGateway;
pub use config::{ConfigError, GitHubConfig};
