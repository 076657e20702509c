use crate::domain::paths::{validate_path, DirEntry};
use crate::error::WorkspaceError;
use crate::ports::workspace::WorkspacePort;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Workspace backed by a directory tree on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalWorkspace {
    root: PathBuf,
}

fn map_io(path: &str, err: std::io::Error) -> WorkspaceError {
    match err.kind() {
        ErrorKind::NotFound => WorkspaceError::not_found(path),
        ErrorKind::AlreadyExists => WorkspaceError::AlreadyExists {
            path: path.to_string(),
        },
        _ => WorkspaceError::io(path, err),
    }
}

impl LocalWorkspace {
    /// Use `root` as the workspace root, creating it when missing.
    pub async fn create(root: impl Into<PathBuf>) -> Result<Self, WorkspaceError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| WorkspaceError::io(root.display().to_string(), e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, WorkspaceError> {
        validate_path(path)?;
        Ok(path
            .split('/')
            .filter(|c| !c.is_empty())
            .fold(self.root.clone(), |acc, c| acc.join(c)))
    }

    fn resolve_entry(&self, path: &str) -> Result<PathBuf, WorkspaceError> {
        if path.is_empty() {
            return Err(WorkspaceError::InvalidPath {
                path: String::new(),
                reason: "operation not allowed on the workspace root",
            });
        }
        self.resolve(path)
    }

    /// `Some(true)` for a directory, `Some(false)` for anything else, `None` when absent.
    async fn kind(full: &Path, path: &str) -> Result<Option<bool>, WorkspaceError> {
        match fs::metadata(full).await {
            Ok(meta) => Ok(Some(meta.is_dir())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(WorkspaceError::io(path, e)),
        }
    }
}

#[async_trait]
impl WorkspacePort for LocalWorkspace {
    async fn write_file(&self, path: &str, bytes: Vec<u8>) -> Result<(), WorkspaceError> {
        let full = self.resolve_entry(path)?;
        if Self::kind(&full, path).await? == Some(true) {
            return Err(WorkspaceError::IsADirectory {
                path: path.to_string(),
            });
        }
        fs::write(&full, bytes).await.map_err(|e| map_io(path, e))
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, WorkspaceError> {
        let full = self.resolve_entry(path)?;
        match Self::kind(&full, path).await? {
            Some(true) => Err(WorkspaceError::IsADirectory {
                path: path.to_string(),
            }),
            None => Err(WorkspaceError::not_found(path)),
            Some(false) => fs::read(&full).await.map_err(|e| map_io(path, e)),
        }
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>, WorkspaceError> {
        let full = self.resolve(path)?;
        match Self::kind(&full, path).await? {
            Some(true) => {}
            Some(false) => {
                return Err(WorkspaceError::NotADirectory {
                    path: path.to_string(),
                })
            }
            None => return Err(WorkspaceError::not_found(path)),
        }

        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&full).await.map_err(|e| map_io(path, e))?;
        while let Some(entry) = dir.next_entry().await.map_err(|e| map_io(path, e))? {
            let is_dir = entry
                .file_type()
                .await
                .map_err(|e| map_io(path, e))?
                .is_dir();
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn create_dir(&self, path: &str) -> Result<(), WorkspaceError> {
        let full = self.resolve_entry(path)?;
        fs::create_dir(&full).await.map_err(|e| map_io(path, e))
    }

    async fn delete_file(&self, path: &str) -> Result<(), WorkspaceError> {
        let full = self.resolve_entry(path)?;
        match Self::kind(&full, path).await? {
            Some(true) => Err(WorkspaceError::IsADirectory {
                path: path.to_string(),
            }),
            None => Err(WorkspaceError::not_found(path)),
            Some(false) => fs::remove_file(&full).await.map_err(|e| map_io(path, e)),
        }
    }

    async fn delete_dir(&self, path: &str) -> Result<(), WorkspaceError> {
        let full = self.resolve_entry(path)?;
        match Self::kind(&full, path).await? {
            Some(true) => {}
            Some(false) => {
                return Err(WorkspaceError::NotADirectory {
                    path: path.to_string(),
                })
            }
            None => return Err(WorkspaceError::not_found(path)),
        }
        let mut dir = fs::read_dir(&full).await.map_err(|e| map_io(path, e))?;
        if dir
            .next_entry()
            .await
            .map_err(|e| map_io(path, e))?
            .is_some()
        {
            return Err(WorkspaceError::NotEmpty {
                path: path.to_string(),
            });
        }
        fs::remove_dir(&full).await.map_err(|e| map_io(path, e))
    }
}
