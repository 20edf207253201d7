//! Logging setup for the harness binary.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Telemetry initialization failed: {reason}")]
    InitializationFailed { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Filter used when `RUST_LOG` is unset
    pub log_level: String,
    pub with_target: bool,
    pub with_file: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            with_target: false,
            with_file: false,
        }
    }
}

impl TelemetryConfig {
    /// `-v` raises the default filter to `debug`.
    pub fn from_verbosity(verbose: bool) -> Self {
        let mut config = Self::default();
        if verbose {
            config.log_level = "debug".to_string();
            config.with_file = true;
        }
        config
    }

    pub fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.log_level))
    }
}

/// Install the global subscriber. Logs go to stderr so stdout stays clean for answers.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(config.filter())
        .with_target(config.with_target)
        .with_file(config.with_file)
        .with_line_number(config.with_file)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).map_err(|e| {
        TelemetryError::InitializationFailed {
            reason: format!("Failed to set tracing subscriber: {}", e),
        }
    })
}
