//! Local validation of user-supplied names.
//!
//! These checks run before any remote call so obviously bad input never costs
//! a round-trip. The remote may still reject a name that passes here (for
//! example a repository name that is already taken).

use crate::error::{Result, SyncError};

const MAX_REPOSITORY_NAME: usize = 100;

fn invalid(name: &str, reason: &str) -> SyncError {
    SyncError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

/// Validate a repository name and return it trimmed.
///
/// Allowed: ASCII letters, digits, `-`, `_` and `.`, at most 100 characters,
/// and not `.` or `..`.
pub fn repository_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(invalid(name, "name is empty"));
    }
    if name.len() > MAX_REPOSITORY_NAME {
        return Err(invalid(name, "name is longer than 100 characters"));
    }
    if name == "." || name == ".." {
        return Err(invalid(name, "name is reserved"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(invalid(name, &format!("character '{c}' is not allowed")));
    }
    Ok(name)
}

/// Validate a branch name and return it trimmed.
///
/// A subset of `git check-ref-format`: no whitespace or control characters,
/// none of `~^:?*[\`, no `..` or `@{`, no leading `-` or `/`, no trailing `/`,
/// `.` or `.lock`.
pub fn branch_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(invalid(name, "name is empty"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || "~^:?*[\\".contains(*c))
    {
        return Err(invalid(name, &format!("character '{c}' is not allowed")));
    }
    if name.contains("..") || name.contains("@{") || name.contains("//") {
        return Err(invalid(name, "name contains a forbidden sequence"));
    }
    if name.starts_with('-') || name.starts_with('/') {
        return Err(invalid(name, "name has a forbidden prefix"));
    }
    if name.ends_with('/') || name.ends_with('.') || name.ends_with(".lock") {
        return Err(invalid(name, "name has a forbidden suffix"));
    }
    Ok(name)
}

/// Validate a single path component for a new file or folder.
pub fn entry_name(name: &str) -> Result<&str> {
    if name.trim().is_empty() {
        return Err(invalid(name, "name is empty"));
    }
    if name == "." || name == ".." {
        return Err(invalid(name, "name is reserved"));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(invalid(name, "name must not contain a path separator"));
    }
    Ok(name)
}
