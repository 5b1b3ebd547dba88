//! Per-directory listing cache.
//!
//! Listings are only valid for the (repository, branch) they were fetched
//! under. The cache remembers that scope and is emptied wholesale when it
//! changes; there is no other eviction.

use std::collections::HashMap;

use crate::model::{FolderListing, NodeKind, parent_path};

/// The (repository, branch) a cache's listings belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheScope {
    /// `owner/name` of the repository.
    pub repository: String,
    /// Branch name.
    pub branch: String,
}

/// Lazily filled map of directory path to listing.
#[derive(Debug, Default)]
pub struct FolderCache {
    scope: Option<CacheScope>,
    listings: HashMap<String, FolderListing>,
}

impl FolderCache {
    /// An empty, unscoped cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached listing for `path`, if any.
    pub fn get(&self, path: &str) -> Option<&FolderListing> {
        self.listings.get(path)
    }

    /// Store a listing for `path`, replacing any previous one.
    pub fn put(&mut self, path: impl Into<String>, listing: FolderListing) {
        self.listings.insert(path.into(), listing);
    }

    /// Whether a listing for `path` is cached.
    pub fn contains(&self, path: &str) -> bool {
        self.listings.contains_key(path)
    }

    /// Update the content hash of a cached file node after a write.
    pub fn set_file_sha(&mut self, path: &str, new_sha: &str) {
        let Some(listing) = self.listings.get_mut(parent_path(path)) else {
            return;
        };
        for node in listing.iter_mut().filter(|n| n.path == path) {
            if let NodeKind::File { sha, .. } = &mut node.kind {
                *sha = Some(new_sha.to_string());
            }
        }
    }

    /// Drop every cached listing. The scope is kept.
    pub fn invalidate_all(&mut self) {
        if !self.listings.is_empty() {
            tracing::debug!(
                "Invalidating {} cached folder listings",
                self.listings.len()
            );
        }
        self.listings.clear();
    }

    /// Invalidate and re-tag the cache for a new (repository, branch).
    pub fn rescope(&mut self, scope: Option<CacheScope>) {
        self.invalidate_all();
        self.scope = scope;
    }

    /// The scope current listings were fetched under.
    pub fn scope(&self) -> Option<&CacheScope> {
        self.scope.as_ref()
    }

    /// Number of cached directories.
    pub fn len(&self) -> usize {
        self.listings.len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }
}
