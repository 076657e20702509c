//! Workspace path helpers.
//!
//! Workspace paths are relative and `/`-separated. The empty string names the
//! workspace root.

use crate::error::WorkspaceError;
use serde::Serialize;

/// One entry of a workspace directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

impl DirEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
        }
    }

    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
        }
    }
}

/// Check that `path` is a relative workspace path without parent or empty components.
pub fn validate_path(path: &str) -> Result<(), WorkspaceError> {
    if path.is_empty() {
        return Ok(());
    }
    let invalid = |reason| WorkspaceError::InvalidPath {
        path: path.to_string(),
        reason,
    };
    if path.starts_with('/') {
        return Err(invalid("absolute paths are not allowed"));
    }
    for component in path.split('/') {
        match component {
            "" => return Err(invalid("empty path component")),
            "." | ".." => return Err(invalid("relative components are not allowed")),
            c if c.contains('\\') || c.contains('\0') => {
                return Err(invalid("illegal character in path component"))
            }
            _ => {}
        }
    }
    Ok(())
}

/// Check that `name` can be used as a single path component.
pub fn validate_component(name: &str) -> Result<(), WorkspaceError> {
    if name.is_empty() || name.contains('/') {
        return Err(WorkspaceError::InvalidPath {
            path: name.to_string(),
            reason: "expected a single path component",
        });
    }
    validate_path(name)
}

pub fn join(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{}/{}", parent.trim_end_matches('/'), child)
    }
}

/// Parent directory of `path`, the root being `""`.
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(pos) => &path[..pos],
        None => "",
    }
}

pub fn file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(pos) => &path[pos + 1..],
        None => path,
    }
}

/// Express `path` relative to the directory `base`, when it lives below it.
pub fn relative_to<'a>(path: &'a str, base: &str) -> Option<&'a str> {
    if base.is_empty() {
        return Some(path);
    }
    path.strip_prefix(base)?.strip_prefix('/')
}
