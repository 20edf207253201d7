//! Engine build utilities
//!
//! Compiles the AXIOM engine from its CMake source tree so the harness and
//! the calculator shell have an executable to talk to.

pub mod cmake;

pub use cmake::{find_executable, CmakeBuilder, StepReport, BUILD_TREE_CANDIDATES};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors related to building the engine
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("cmake is not installed or not on PATH")]
    CmakeMissing,
    #[error("{step} failed: {stderr}")]
    StepFailed { step: String, stderr: String },
    #[error("{step} timed out after {after:?}")]
    StepTimeout { step: String, after: Duration },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type BuildResult<T> = Result<T, BuildError>;

/// CMake generator to configure with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Generator {
    /// Whatever CMake picks for the platform
    Default,
    /// Ninja, producing `ninja-build`-style trees
    Ninja,
}

/// What to build and how long each step may take
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSpec {
    /// Directory holding the top-level `CMakeLists.txt`
    pub source_dir: PathBuf,
    /// Build tree, relative to `source_dir` unless absolute
    pub build_dir: PathBuf,
    pub generator: Generator,
    pub configure_timeout: Duration,
    pub build_timeout: Duration,
    /// Pass `--parallel` to the build step
    pub parallel: bool,
    pub extra_configure_args: Vec<String>,
}

impl Default for BuildSpec {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("."),
            build_dir: PathBuf::from("build"),
            generator: Generator::Default,
            configure_timeout: Duration::from_secs(60),
            build_timeout: Duration::from_secs(300),
            parallel: true,
            extra_configure_args: vec![],
        }
    }
}

impl BuildSpec {
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_build_dir(mut self, build_dir: impl Into<PathBuf>) -> Self {
        self.build_dir = build_dir.into();
        self
    }

    pub fn with_generator(mut self, generator: Generator) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_timeouts(mut self, configure: Duration, build: Duration) -> Self {
        self.configure_timeout = configure;
        self.build_timeout = build;
        self
    }

    /// Absolute-or-source-relative build tree.
    pub fn resolved_build_dir(&self) -> PathBuf {
        if self.build_dir.is_absolute() {
            self.build_dir.clone()
        } else {
            self.source_dir.join(&self.build_dir)
        }
    }

    /// `cmake -B <build> -S <source> [-G Ninja] [extra...]`
    pub fn configure_args(&self) -> Vec<String> {
        let mut args = vec![
            "-B".to_string(),
            self.resolved_build_dir().display().to_string(),
            "-S".to_string(),
            self.source_dir.display().to_string(),
        ];
        if self.generator == Generator::Ninja {
            args.push("-G".to_string());
            args.push("Ninja".to_string());
        }
        args.extend(self.extra_configure_args.iter().cloned());
        args
    }

    /// `cmake --build <build> [--parallel]`
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "--build".to_string(),
            self.resolved_build_dir().display().to_string(),
        ];
        if self.parallel {
            args.push("--parallel".to_string());
        }
        args
    }

    pub fn validate(&self) -> BuildResult<()> {
        if !self.source_dir.join("CMakeLists.txt").is_file() {
            return Err(BuildError::InvalidConfig(format!(
                "no CMakeLists.txt in {}",
                self.source_dir.display()
            )));
        }
        if self.configure_timeout.is_zero() || self.build_timeout.is_zero() {
            return Err(BuildError::InvalidConfig(
                "step timeouts must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result of a finished build
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub steps: Vec<StepReport>,
    /// Engine executable located in the source tree after building, if any
    pub executable: Option<PathBuf>,
}
