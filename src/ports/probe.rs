use crate::domain::av::metadata::Metadata;
use crate::domain::jobs::InputFile;
use async_trait::async_trait;
use std::error::Error;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataProbe: Send + Sync {
    /// Describe the container and streams of `input`.
    async fn describe(&self, input: &InputFile) -> Result<Metadata, Box<dyn Error + Send + Sync>>;
}
