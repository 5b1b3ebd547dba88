//! The in-memory workspace: tree snapshot, open files and the selection.
//!
//! The store is a plain data structure. It never talks to the remote and
//! never decides *when* to change; [`SyncController`](crate::controller::SyncController)
//! owns the only instance and is the only writer.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::model::{FileNode, FileWrite, NodeKind, Origin, WorkspaceFile};

/// Tree snapshot plus the files the user has opened or authored.
#[derive(Debug, Default)]
pub struct WorkspaceStore {
    /// Root listing of the active branch followed by locally created nodes.
    /// Paths are unique.
    nodes: Vec<FileNode>,
    /// Paths of nodes created locally (files and directories).
    local_paths: HashSet<String>,
    /// Opened or authored files, in insertion order.
    files: IndexMap<String, WorkspaceFile>,
    /// Path of the selected file, always a key of `files`.
    selected: Option<String>,
}

impl WorkspaceStore {
    /// An empty workspace.
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== Tree ====================

    /// All nodes of the current snapshot.
    pub fn nodes(&self) -> &[FileNode] {
        &self.nodes
    }

    /// The node at `path`, if present in the snapshot.
    pub fn node(&self, path: &str) -> Option<&FileNode> {
        self.nodes.iter().find(|n| n.path == path)
    }

    /// Snapshot nodes whose parent directory is `dir`.
    pub fn children(&self, dir: &str) -> Vec<FileNode> {
        self.nodes
            .iter()
            .filter(|n| n.parent() == dir)
            .cloned()
            .collect()
    }

    /// Locally created nodes directly under `dir`.
    pub fn local_children(&self, dir: &str) -> Vec<FileNode> {
        self.nodes
            .iter()
            .filter(|n| n.parent() == dir && self.local_paths.contains(&n.path))
            .cloned()
            .collect()
    }

    /// Replace the remote part of the snapshot with a fresh root listing.
    ///
    /// Locally created nodes survive unless the listing already has a node at
    /// the same path.
    pub fn replace_root(&mut self, listing: Vec<FileNode>) {
        let mut seen: HashSet<String> = HashSet::with_capacity(listing.len());
        let mut nodes = Vec::with_capacity(listing.len() + self.local_paths.len());
        for node in listing {
            if seen.insert(node.path.clone()) {
                nodes.push(node);
            }
        }
        for node in self.nodes.drain(..) {
            if self.local_paths.contains(&node.path) && seen.insert(node.path.clone()) {
                nodes.push(node);
            }
        }
        self.nodes = nodes;
    }

    /// Add or replace a node discovered through a listing.
    pub fn insert_remote_node(&mut self, node: FileNode) {
        match self.nodes.iter_mut().find(|n| n.path == node.path) {
            Some(existing) => *existing = node,
            None => self.nodes.push(node),
        }
    }

    /// Add a local directory node. Returns `false` if the path is taken.
    pub fn insert_local_dir(&mut self, path: &str) -> bool {
        if self.node(path).is_some() {
            return false;
        }
        self.nodes.push(FileNode::directory(path));
        self.local_paths.insert(path.to_string());
        true
    }

    // ==================== Files ====================

    /// Author a new local file and select it.
    ///
    /// Returns `false` without changing anything if `path` is already used by
    /// another node or file.
    pub fn insert_local(&mut self, path: &str, content: String) -> bool {
        if self.node(path).is_some() || self.files.contains_key(path) {
            return false;
        }
        self.nodes.push(FileNode::file(path, None, None));
        self.local_paths.insert(path.to_string());
        self.files
            .insert(path.to_string(), WorkspaceFile::local(path, content));
        self.selected = Some(path.to_string());
        true
    }

    /// The file at `path`, if it has been opened or authored.
    pub fn file(&self, path: &str) -> Option<&WorkspaceFile> {
        self.files.get(path)
    }

    /// The LocalOnly file at `path`, if any.
    pub fn local_file(&self, path: &str) -> Option<&WorkspaceFile> {
        self.files.get(path).filter(|f| f.is_local())
    }

    /// LocalOnly files in the order they were authored.
    pub fn local_files(&self) -> impl Iterator<Item = &WorkspaceFile> {
        self.files.values().filter(|f| f.is_local())
    }

    /// Whether any LocalOnly file exists.
    pub fn has_local_files(&self) -> bool {
        self.files.values().any(WorkspaceFile::is_local)
    }

    /// Insert (or replace) `file` and select it.
    pub fn open(&mut self, file: WorkspaceFile) {
        let path = file.path.clone();
        self.files.insert(path.clone(), file);
        self.selected = Some(path);
    }

    /// Select an already opened file. Other files are not touched.
    pub fn select(&mut self, path: &str) -> Option<&WorkspaceFile> {
        if self.files.contains_key(path) {
            self.selected = Some(path.to_string());
        }
        self.selected()
    }

    /// Clear the selection.
    pub fn deselect(&mut self) {
        self.selected = None;
    }

    /// The selected file.
    pub fn selected(&self) -> Option<&WorkspaceFile> {
        self.selected.as_deref().and_then(|p| self.files.get(p))
    }

    /// Path of the selected file.
    pub fn selected_path(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Replace the selected buffer. Returns the new dirty state, or `None`
    /// when nothing is selected.
    pub fn set_buffer_content(&mut self, text: String) -> Option<bool> {
        let path = self.selected.as_deref()?;
        let file = self.files.get_mut(path)?;
        file.buffer = text;
        Some(file.is_dirty())
    }

    /// Mark the selected file clean: `last_synced = buffer`.
    pub fn mark_synced(&mut self) {
        if let Some(file) = self
            .selected
            .as_deref()
            .and_then(|p| self.files.get_mut(p))
        {
            file.last_synced = file.buffer.clone();
        }
    }

    /// Record a successful remote write of `content` to `path`.
    ///
    /// `content` is what was actually sent, which may differ from the buffer
    /// if the user kept typing while the write was in flight.
    pub fn record_write(&mut self, path: &str, content: &str, write: &FileWrite) {
        if let Some(file) = self.files.get_mut(path) {
            file.last_synced = content.to_string();
            if write.sha.is_some() {
                file.sha = write.sha.clone();
            }
        }
        if let Some(sha) = &write.sha {
            self.set_node_sha(path, sha);
        }
    }

    /// Turn a flushed LocalOnly file into a RemoteBacked one.
    pub fn adopt_remote(&mut self, path: &str, content: &str, write: &FileWrite) {
        if let Some(file) = self.files.get_mut(path) {
            file.origin = Origin::RemoteBacked;
            file.last_synced = content.to_string();
            file.sha = write.sha.clone();
        }
        self.local_paths.remove(path);
        if let Some(sha) = &write.sha {
            self.set_node_sha(path, sha);
        }
    }

    /// Forget every RemoteBacked file; they belong to the previous branch.
    pub fn drop_remote_files(&mut self) {
        self.files.retain(|_, f| f.origin == Origin::LocalOnly);
        if let Some(path) = &self.selected {
            if !self.files.contains_key(path) {
                self.selected = None;
            }
        }
    }

    /// Reset to an empty workspace.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.local_paths.clear();
        self.files.clear();
        self.selected = None;
    }

    fn set_node_sha(&mut self, path: &str, new_sha: &str) {
        if let Some(node) = self.nodes.iter_mut().find(|n| n.path == path) {
            if let NodeKind::File { sha, .. } = &mut node.kind {
                *sha = Some(new_sha.to_string());
            }
        }
    }
}
