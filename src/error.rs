//! Error types for the transcoding pipeline.

use crate::domain::av::segments::{NamerError, StreamKind};
use crate::domain::av::stages::Stage;

/// Errors raised by workspace primitives.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("no such file or directory: {path}")]
    NotFound { path: String },

    #[error("path already exists: {path}")]
    AlreadyExists { path: String },

    #[error("directory not empty: {path}")]
    NotEmpty { path: String },

    #[error("not a directory: {path}")]
    NotADirectory { path: String },

    #[error("is a directory: {path}")]
    IsADirectory { path: String },

    #[error("invalid workspace path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl WorkspaceError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The workspace path the error refers to.
    pub fn path(&self) -> &str {
        match self {
            Self::NotFound { path }
            | Self::AlreadyExists { path }
            | Self::NotEmpty { path }
            | Self::NotADirectory { path }
            | Self::IsADirectory { path }
            | Self::InvalidPath { path, .. }
            | Self::Io { path, .. } => path,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Errors that abort a conversion job.
#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    /// The codec engine runtime could not be initialised.
    #[error("codec engine failed to load: {0}")]
    Load(String),

    /// Metadata probing failed or returned malformed data.
    #[error("metadata probe failed: {0}")]
    Probe(String),

    /// A codec engine invocation failed, either with a non-zero status or a fault.
    #[error("stage {stage} failed (status {status:?}): {message}")]
    Stage {
        stage: Stage,
        status: Option<i32>,
        message: String,
    },

    /// Concatenation was asked to join zero segments.
    #[error("stage {stage} received no {kind} segments to concatenate")]
    EmptyStream { stage: Stage, kind: StreamKind },

    /// A segment directory listing could not be mapped back to a contiguous index range.
    #[error("stage {stage} found inconsistent segments in {dir}: {source}")]
    Segments {
        stage: Stage,
        dir: String,
        #[source]
        source: NamerError,
    },

    #[error("workspace operation failed during {stage}: {source}")]
    Workspace {
        stage: Stage,
        #[source]
        source: WorkspaceError,
    },

    /// A stage argument vector did not pass validation.
    #[error("invalid command for stage {stage}: {reason}")]
    InvalidCommand { stage: Stage, reason: String },

    #[error("job cancelled before {stage}")]
    Cancelled { stage: Stage },
}

impl TranscodeError {
    /// The pipeline step the failure belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Load(_) => Stage::Load,
            Self::Probe(_) => Stage::Probe,
            Self::Stage { stage, .. }
            | Self::EmptyStream { stage, .. }
            | Self::Segments { stage, .. }
            | Self::Workspace { stage, .. }
            | Self::InvalidCommand { stage, .. }
            | Self::Cancelled { stage } => *stage,
        }
    }

    pub(crate) fn workspace(stage: Stage) -> impl FnOnce(WorkspaceError) -> Self {
        move |source| Self::Workspace { stage, source }
    }
}
