use async_trait::async_trait;
use std::error::Error;

/// Exit status of one codec engine invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    /// `None` when the engine was terminated without an exit code.
    pub code: Option<i32>,
    pub message: String,
}

impl EngineStatus {
    pub fn ok() -> Self {
        Self {
            code: Some(0),
            message: String::new(),
        }
    }

    pub fn failed(code: Option<i32>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CodecEngine: Send + Sync {
    /// Run one operation. The argument vector alone determines its behaviour;
    /// every path in it refers to the workspace.
    ///
    /// `Err` means the engine itself faulted, a non-zero status is reported as `Ok`.
    async fn execute(&self, argv: &[String]) -> Result<EngineStatus, Box<dyn Error + Send + Sync>>;

    /// How many invocations may run at the same time.
    fn concurrency_limit(&self) -> usize;
}
