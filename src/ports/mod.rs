//! Ports - Capability traits the application layer drives.

pub mod engine;
pub mod probe;
pub mod workspace;

pub use engine::{CodecEngine, EngineStatus};
pub use probe::MetadataProbe;
pub use workspace::WorkspacePort;
