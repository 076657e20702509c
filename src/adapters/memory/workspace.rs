use crate::domain::paths::{parent, validate_path, DirEntry};
use crate::error::WorkspaceError;
use crate::ports::workspace::WorkspacePort;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
enum Node {
    File(Vec<u8>),
    Dir,
}

/// A path → {file bytes | directory} map. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryWorkspace {
    nodes: Arc<Mutex<BTreeMap<String, Node>>>,
}

fn root_error(path: &str) -> WorkspaceError {
    WorkspaceError::InvalidPath {
        path: path.to_string(),
        reason: "operation not allowed on the workspace root",
    }
}

/// Validate `path` and reject the root.
fn entry_path(path: &str) -> Result<(), WorkspaceError> {
    validate_path(path)?;
    if path.is_empty() {
        return Err(root_error(path));
    }
    Ok(())
}

fn is_child(candidate: &str, dir: &str) -> bool {
    if candidate.is_empty() {
        return false;
    }
    parent(candidate) == dir
}

impl MemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    fn nodes(&self) -> MutexGuard<'_, BTreeMap<String, Node>> {
        self.nodes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every file and directory path, excluding the root, in lexicographic order.
    pub fn paths(&self) -> Vec<String> {
        self.nodes().keys().cloned().collect()
    }

    /// Whether nothing but the root directory exists.
    pub fn is_empty(&self) -> bool {
        self.nodes().is_empty()
    }

    pub fn file_count(&self) -> usize {
        self.nodes()
            .values()
            .filter(|node| matches!(node, Node::File(_)))
            .count()
    }

    fn check_parent(
        nodes: &BTreeMap<String, Node>,
        path: &str,
    ) -> Result<(), WorkspaceError> {
        let dir = parent(path);
        if dir.is_empty() {
            return Ok(());
        }
        match nodes.get(dir) {
            Some(Node::Dir) => Ok(()),
            Some(Node::File(_)) => Err(WorkspaceError::NotADirectory {
                path: dir.to_string(),
            }),
            None => Err(WorkspaceError::not_found(dir)),
        }
    }
}

#[async_trait]
impl WorkspacePort for MemoryWorkspace {
    async fn write_file(&self, path: &str, bytes: Vec<u8>) -> Result<(), WorkspaceError> {
        entry_path(path)?;
        let mut nodes = self.nodes();
        Self::check_parent(&nodes, path)?;
        if let Some(Node::Dir) = nodes.get(path) {
            return Err(WorkspaceError::IsADirectory {
                path: path.to_string(),
            });
        }
        nodes.insert(path.to_string(), Node::File(bytes));
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, WorkspaceError> {
        entry_path(path)?;
        match self.nodes().get(path) {
            Some(Node::File(bytes)) => Ok(bytes.clone()),
            Some(Node::Dir) => Err(WorkspaceError::IsADirectory {
                path: path.to_string(),
            }),
            None => Err(WorkspaceError::not_found(path)),
        }
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>, WorkspaceError> {
        validate_path(path)?;
        let nodes = self.nodes();
        if !path.is_empty() {
            match nodes.get(path) {
                Some(Node::Dir) => {}
                Some(Node::File(_)) => {
                    return Err(WorkspaceError::NotADirectory {
                        path: path.to_string(),
                    })
                }
                None => return Err(WorkspaceError::not_found(path)),
            }
        }
        let prefix_len = if path.is_empty() { 0 } else { path.len() + 1 };
        Ok(nodes
            .iter()
            .filter(|(candidate, _)| is_child(candidate, path))
            .map(|(candidate, node)| DirEntry {
                name: candidate[prefix_len..].to_string(),
                is_dir: matches!(node, Node::Dir),
            })
            .collect())
    }

    async fn create_dir(&self, path: &str) -> Result<(), WorkspaceError> {
        entry_path(path)?;
        let mut nodes = self.nodes();
        if nodes.contains_key(path) {
            return Err(WorkspaceError::AlreadyExists {
                path: path.to_string(),
            });
        }
        Self::check_parent(&nodes, path)?;
        nodes.insert(path.to_string(), Node::Dir);
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> Result<(), WorkspaceError> {
        entry_path(path)?;
        let mut nodes = self.nodes();
        match nodes.get(path) {
            Some(Node::File(_)) => {
                nodes.remove(path);
                Ok(())
            }
            Some(Node::Dir) => Err(WorkspaceError::IsADirectory {
                path: path.to_string(),
            }),
            None => Err(WorkspaceError::not_found(path)),
        }
    }

    async fn delete_dir(&self, path: &str) -> Result<(), WorkspaceError> {
        entry_path(path)?;
        let mut nodes = self.nodes();
        match nodes.get(path) {
            Some(Node::Dir) => {}
            Some(Node::File(_)) => {
                return Err(WorkspaceError::NotADirectory {
                    path: path.to_string(),
                })
            }
            None => return Err(WorkspaceError::not_found(path)),
        }
        if nodes.keys().any(|candidate| is_child(candidate, path)) {
            return Err(WorkspaceError::NotEmpty {
                path: path.to_string(),
            });
        }
        nodes.remove(path);
        Ok(())
    }
}
