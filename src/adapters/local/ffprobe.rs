use crate::domain::av::metadata::Metadata;
use crate::domain::jobs::InputFile;
use crate::domain::paths::validate_component;
use crate::ports::probe::MetadataProbe;
use async_trait::async_trait;
use serde_json::Value;
use std::error::Error;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command as TokioCommand;

/// Metadata probe running the `ffprobe` binary on a temporary copy of the input.
#[derive(Debug, Clone)]
pub struct FfprobeCli {
    binary: PathBuf,
}

impl FfprobeCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

/// Parse ffprobe JSON and report the caller's file name instead of the temporary path.
pub fn parse_probe_output(stdout: &[u8], file_name: &str) -> Result<Metadata, Box<dyn Error + Send + Sync>> {
    let mut metadata = Metadata::from_value(serde_json::from_slice::<Value>(stdout)?)?;
    metadata
        .format
        .insert("filename".to_string(), Value::String(file_name.to_string()));
    Ok(metadata)
}

#[async_trait]
impl MetadataProbe for FfprobeCli {
    async fn describe(&self, input: &InputFile) -> Result<Metadata, Box<dyn Error + Send + Sync>> {
        validate_component(&input.name)?;
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(&input.name);
        tokio::fs::write(&path, &input.bytes).await?;

        let output = TokioCommand::new(&self.binary)
            .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(&path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(format!(
                "ffprobe exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )
            .into());
        }
        parse_probe_output(&output.stdout, &input.name)
    }
}
