//! Minivid - Segment-parallel media compression
//!
//! Hexagonal Architecture:
//! - domain/: Pure business logic (segment naming, manifests, stage commands, jobs)
//! - ports/: Trait definitions (workspace, codec engine, metadata probe)
//! - adapters/: Concrete implementations (local disk + ffmpeg, in-memory, HTTP)
//! - application/: Pipeline orchestration, task graph, cleanup
//! - config: Environment configuration
//!
//! # Features
//! - `native-probe`: metadata probing through libavformat instead of `ffprobe`

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;

// Re-exports for convenience
pub use application::{CleanupReport, JobFailure, JobOutput, PipelineOrchestrator};
pub use config::{LocalConfig, PipelineConfig};
pub use domain::av;
pub use domain::jobs::InputFile;
pub use error::{TranscodeError, WorkspaceError};
