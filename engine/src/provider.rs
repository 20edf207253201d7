use crate::types::Evaluation;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("AXIOM executable not found (searched {} locations)", searched.len())]
    NotFound {
        searched: Vec<PathBuf>,
        strays: Vec<PathBuf>,
    },

    #[error("Failed to spawn {path}: {reason}")]
    Spawn { path: PathBuf, reason: String },

    #[error("Engine timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("Engine crashed (signal {signal:?})")]
    Crashed { signal: Option<i32> },

    #[error("Engine rejected input (exit code {code}): {stderr}")]
    Rejected { code: i32, stderr: String },

    #[error("Daemon exited: {stderr}")]
    DaemonExited { stderr: String },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Anything that can turn an expression into an answer.
#[async_trait]
pub trait Engine: Send + Sync {
    async fn evaluate(&self, expression: &str) -> EngineResult<Evaluation>;

    async fn health_check(&self) -> EngineResult<()>;

    fn name(&self) -> &'static str;
}
