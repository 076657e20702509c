use crate::error::TranscodeError;
use crate::ports::engine::{CodecEngine, EngineStatus};
use async_trait::async_trait;
use std::error::Error;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use tokio::process::Command as TokioCommand;
use tracing::debug;

const QUIET_FLAGS: [&str; 4] = ["-hide_banner", "-nostdin", "-loglevel", "error"];
const STDERR_TAIL: usize = 2048;

/// Codec engine that runs the `ffmpeg` binary inside the workspace root.
#[derive(Debug, Clone)]
pub struct FfmpegCli {
    binary: PathBuf,
    workdir: PathBuf,
    concurrency: usize,
}

/// Last `STDERR_TAIL` bytes of the process error output, trimmed.
fn stderr_tail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    let mut start = stderr.len().saturating_sub(STDERR_TAIL);
    while !stderr.is_char_boundary(start) {
        start += 1;
    }
    stderr[start..].to_string()
}

impl FfmpegCli {
    pub fn new(binary: impl Into<PathBuf>, workdir: impl Into<PathBuf>, concurrency: usize) -> Self {
        Self {
            binary: binary.into(),
            workdir: workdir.into(),
            concurrency: concurrency.max(1),
        }
    }

    /// Build the engine after checking that the binary runs.
    pub async fn load(
        binary: impl Into<PathBuf>,
        workdir: impl Into<PathBuf>,
        concurrency: usize,
    ) -> Result<Self, TranscodeError> {
        let engine = Self::new(binary, workdir, concurrency);
        let output = TokioCommand::new(&engine.binary)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| TranscodeError::Load(format!("{}: {}", engine.binary.display(), e)))?;
        if !output.status.success() {
            return Err(TranscodeError::Load(format!(
                "{} -version exited with {}: {}",
                engine.binary.display(),
                output.status,
                stderr_tail(&output)
            )));
        }
        let version = String::from_utf8_lossy(&output.stdout);
        debug!("Loaded {}", version.lines().next().unwrap_or_default());
        Ok(engine)
    }

    fn command(&self, argv: &[String]) -> TokioCommand {
        let mut command = TokioCommand::new(&self.binary);
        command
            .args(QUIET_FLAGS)
            .args(argv)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl CodecEngine for FfmpegCli {
    async fn execute(&self, argv: &[String]) -> Result<EngineStatus, Box<dyn Error + Send + Sync>> {
        let output = self.command(argv).output().await?;
        if output.status.success() {
            Ok(EngineStatus::ok())
        } else {
            Ok(EngineStatus::failed(output.status.code(), stderr_tail(&output)))
        }
    }

    fn concurrency_limit(&self) -> usize {
        self.concurrency
    }
}
