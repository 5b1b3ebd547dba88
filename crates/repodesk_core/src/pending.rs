//! Staging area for files written before any repository exists.

use indexmap::IndexMap;

/// Insertion-ordered path -> content map awaiting a flush.
///
/// Re-staging a path overwrites its content but keeps its original position,
/// so a flush writes files in the order they were first staged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingChangeSet {
    entries: IndexMap<String, String>,
}

impl PendingChangeSet {
    /// An empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `content` for `path`.
    pub fn stage(&mut self, path: impl Into<String>, content: impl Into<String>) {
        self.entries.insert(path.into(), content.into());
    }

    /// Staged entries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(p, c)| (p.as_str(), c.as_str()))
    }

    /// Owned copy of the entries, for iterating across `.await` points.
    pub fn to_vec(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|(p, c)| (p.clone(), c.clone()))
            .collect()
    }

    /// Staged content for `path`.
    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of staged files.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
