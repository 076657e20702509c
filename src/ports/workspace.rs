use crate::domain::paths::DirEntry;
use crate::error::WorkspaceError;
use async_trait::async_trait;

/// Named-file storage shared by the pipeline and the codec engine.
///
/// Paths are relative and `/`-separated, `""` being the root directory.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorkspacePort: Send + Sync {
    /// Create or replace a file. The parent directory must exist.
    async fn write_file(&self, path: &str, bytes: Vec<u8>) -> Result<(), WorkspaceError>;

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, WorkspaceError>;

    /// Entries of a directory, files and sub-directories alike.
    async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>, WorkspaceError>;

    /// Create a directory. Fails if the path already exists.
    async fn create_dir(&self, path: &str) -> Result<(), WorkspaceError>;

    async fn delete_file(&self, path: &str) -> Result<(), WorkspaceError>;

    /// Delete an empty directory.
    async fn delete_dir(&self, path: &str) -> Result<(), WorkspaceError>;
}
