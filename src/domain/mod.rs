//! Domain layer - Pure business logic.

pub mod av;

// Job definitions and workspace paths
pub mod jobs;
pub mod paths;
