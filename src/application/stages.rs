use crate::domain::av::stages::StageCommand;
use crate::error::TranscodeError;
use crate::ports::engine::CodecEngine;
use tracing::debug;

/// Runs validated stage commands against the codec engine.
pub struct StageExecutor<E> {
    engine: E,
}

impl<E: CodecEngine> StageExecutor<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Validate and run one invocation.
    ///
    /// A non-zero status and an engine fault both surface as
    /// [`TranscodeError::Stage`] carrying the stage identity.
    pub async fn run(&self, command: &StageCommand) -> Result<(), TranscodeError> {
        command.validate()?;
        debug!(stage = %command.stage, argv = ?command.args, "running stage");

        match self.engine.execute(&command.args).await {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(TranscodeError::Stage {
                stage: command.stage,
                status: status.code,
                message: status.message,
            }),
            Err(fault) => Err(TranscodeError::Stage {
                stage: command.stage,
                status: None,
                message: fault.to_string(),
            }),
        }
    }
}
