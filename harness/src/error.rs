use builder::BuildError;
use engine::EngineError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Config file error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Shell worker stopped: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type HarnessResult<T> = Result<T, HarnessError>;
