//! Application layer - Generic services that use ports.

pub mod cleanup;
pub mod graph;
pub mod orchestrator;
pub mod stages;

mod functional_tests;

pub use cleanup::CleanupReport;
pub use orchestrator::{JobFailure, JobOutput, PipelineOrchestrator};
