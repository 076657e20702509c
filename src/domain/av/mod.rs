//! Audio/Video domain modules.

pub mod manifest;
pub mod metadata;
pub mod segments;
pub mod stages;
pub mod stream;
