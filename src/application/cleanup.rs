//! Best-effort removal of every artifact a job may have created.

use crate::domain::jobs::MediaJob;
use crate::domain::paths::join;
use crate::error::WorkspaceError;
use crate::ports::workspace::WorkspacePort;
use tracing::{debug, warn};

/// Outcome of a cleanup pass. Failures are logged and skipped, never fatal.
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub removed: usize,
    pub errors: Vec<WorkspaceError>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    fn record(&mut self, result: Result<(), WorkspaceError>) {
        match result {
            Ok(()) => self.removed += 1,
            Err(err) if err.is_not_found() => {}
            Err(err) => {
                warn!(path = err.path(), error = %err, "cleanup failed");
                self.errors.push(err);
            }
        }
    }
}

/// Delete segment files, then the single job files, then the directories.
///
/// Absent paths are skipped, so the pass can run after a failure at any stage
/// and can be repeated.
pub async fn cleanup_job<W>(workspace: &W, job: &MediaJob) -> CleanupReport
where
    W: WorkspacePort + ?Sized,
{
    let mut report = CleanupReport::default();
    let directories = job.namer.directories();

    for dir in &directories {
        match workspace.list_dir(dir).await {
            Ok(entries) => {
                for entry in entries.iter().filter(|entry| !entry.is_dir) {
                    let path = join(dir, &entry.name);
                    report.record(workspace.delete_file(&path).await);
                }
            }
            Err(err) => report.record(Err(err)),
        }
    }

    for file in job.paths.files() {
        report.record(workspace.delete_file(file).await);
    }

    for dir in &directories {
        report.record(workspace.delete_dir(dir).await);
    }
    report.record(workspace.delete_dir(&job.paths.root).await);

    debug!(
        "Cleanup of job {} removed {} paths, {} failures",
        job.id,
        report.removed,
        report.errors.len()
    );
    report
}
