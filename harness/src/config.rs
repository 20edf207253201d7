use crate::error::{HarnessError, HarnessResult};
use engine::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Overrides `engine.executable` when set.
pub const ENGINE_ENV_VAR: &str = "AXIOM_ENGINE";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub engine: EngineConfig,
    /// Where `qa` writes its JSON report
    pub report_path: PathBuf,
    /// Files checked by the namespace purity check, relative to `engine.search_root`
    pub critical_files: Vec<PathBuf>,
    /// Names that must no longer appear in `critical_files`
    pub legacy_names: Vec<String>,
    pub latency_iterations: usize,
    pub memory_iterations: usize,
    /// Simultaneous invocations in the concurrency check
    pub concurrency: usize,
    /// Shell history is saved here on exit when set
    pub history_path: Option<PathBuf>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            report_path: PathBuf::from("axiom_qa_report.json"),
            critical_files: vec![
                PathBuf::from("src/main.cpp"),
                PathBuf::from("include/dynamic_calc.h"),
                PathBuf::from("CMakeLists.txt"),
            ],
            legacy_names: vec!["OGULATOR".to_string(), "Ogulator".to_string()],
            latency_iterations: 100,
            memory_iterations: 100,
            concurrency: 8,
            history_path: None,
        }
    }
}

impl HarnessConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a TOML file; missing keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> HarnessResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Ok(toml::from_str(&text)?)
    }

    /// Defaults, then the optional file, then the environment.
    pub fn load(path: Option<&Path>) -> HarnessResult<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = config.with_env_override(std::env::var_os(ENGINE_ENV_VAR).map(PathBuf::from));
        config.validate()?;
        Ok(config)
    }

    pub fn with_env_override(mut self, executable: Option<PathBuf>) -> Self {
        if let Some(path) = executable.filter(|p| !p.as_os_str().is_empty()) {
            self.engine.executable = Some(path);
        }
        self
    }

    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = path.into();
        self
    }

    pub fn with_iterations(mut self, latency: usize, memory: usize) -> Self {
        self.latency_iterations = latency;
        self.memory_iterations = memory;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn validate(&self) -> HarnessResult<()> {
        self.engine.validate().map_err(HarnessError::Config)?;

        if self.latency_iterations == 0 || self.memory_iterations == 0 {
            return Err(HarnessError::Config(
                "Iteration counts must be greater than 0".to_string(),
            ));
        }

        if self.concurrency == 0 {
            return Err(HarnessError::Config(
                "Concurrency must be greater than 0".to_string(),
            ));
        }

        if self.report_path.as_os_str().is_empty() {
            return Err(HarnessError::Config(
                "Report path cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}
