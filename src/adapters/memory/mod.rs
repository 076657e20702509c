//! In-memory adapters, used by tests and embedders without a filesystem.

pub mod workspace;

pub use workspace::MemoryWorkspace;
