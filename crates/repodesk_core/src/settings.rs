//! Controller behavior settings.

use serde::{Deserialize, Serialize};

/// Tunables for [`SyncController`](crate::controller::SyncController).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    /// Branch synthesized for a freshly created repository (default: `main`).
    pub default_branch: String,
    /// Root file auto-selected after a branch loads (default: `index.html`).
    pub entry_file: Option<String>,
    /// Commit message prefix for saves of existing files (default: `Update`).
    pub update_message_prefix: String,
    /// Commit message prefix for flushed local files (default: `Add`).
    pub create_message_prefix: String,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            default_branch: "main".to_string(),
            entry_file: Some("index.html".to_string()),
            update_message_prefix: "Update".to_string(),
            create_message_prefix: "Add".to_string(),
        }
    }
}

impl ControllerSettings {
    /// Set the auto-selected entry file; `None` disables auto-selection.
    pub fn with_entry_file(mut self, entry_file: Option<String>) -> Self {
        self.entry_file = entry_file;
        self
    }

    /// Commit message for saving `file_name`.
    pub fn update_message(&self, file_name: &str) -> String {
        format!("{} {}", self.update_message_prefix, file_name)
    }

    /// Commit message for flushing `file_name`.
    pub fn create_message(&self, file_name: &str) -> String {
        format!("{} {}", self.create_message_prefix, file_name)
    }
}
