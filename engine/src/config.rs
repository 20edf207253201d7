use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Build-output locations searched, in order, when no executable is configured.
pub const DEFAULT_CANDIDATES: &[&str] = &[
    "ninja-build/axiom.exe",
    "build/axiom.exe",
    "build/Debug/axiom.exe",
    "build/Release/axiom.exe",
    "cmake-build-debug/axiom.exe",
    "build-ninja/axiom.exe",
    "axiom.exe",
    "build/axiom",
    "build/Debug/axiom",
    "cmake-build-debug/axiom",
    "build-ninja/axiom",
    "ninja-build/axiom",
    "axiom",
];

pub const DEFAULT_SENTINEL: &str = "__END_OF_RESPONSE__";
pub const DEFAULT_IDENTITY: &str = "AXIOM Engine v3.0";

/// Output lines containing any of these are banner or library-loading chatter,
/// never part of an answer.
pub const DEFAULT_NOISE_MARKERS: &[&str] = &[
    "loaded successfully",
    "NumPy",
    "SciPy",
    "Matplotlib",
    "Pandas",
    "SymPy",
    "Welcome",
    "Mode:",
    "═",
    "│",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub executable: Option<PathBuf>,
    pub search_root: PathBuf,
    pub candidates: Vec<PathBuf>,
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
    #[serde(with = "duration_millis")]
    pub daemon_timeout: Duration,
    #[serde(with = "duration_millis")]
    pub daemon_startup_grace: Duration,
    pub daemon_flag: String,
    pub sentinel: String,
    pub identity: String,
    pub noise_markers: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            executable: None,
            search_root: PathBuf::from("."),
            candidates: DEFAULT_CANDIDATES.iter().map(PathBuf::from).collect(),
            timeout: Duration::from_secs(5),
            daemon_timeout: Duration::from_secs(5),
            daemon_startup_grace: Duration::from_secs(2),
            daemon_flag: "--daemon".to_string(),
            sentinel: DEFAULT_SENTINEL.to_string(),
            identity: DEFAULT_IDENTITY.to_string(),
            noise_markers: DEFAULT_NOISE_MARKERS.iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = Some(executable.into());
        self
    }

    pub fn with_search_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.search_root = root.into();
        self
    }

    pub fn with_candidates<I, P>(mut self, candidates: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.candidates = candidates.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_daemon_timeout(mut self, timeout: Duration) -> Self {
        self.daemon_timeout = timeout;
        self
    }

    pub fn with_daemon_startup_grace(mut self, grace: Duration) -> Self {
        self.daemon_startup_grace = grace;
        self
    }

    pub fn with_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.sentinel = sentinel.into();
        self
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    /// True when `line` is banner or loader output rather than a result.
    pub fn is_noise(&self, line: &str) -> bool {
        self.noise_markers.iter().any(|m| line.contains(m.as_str()))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.executable.is_none() && self.candidates.is_empty() {
            return Err("Either an executable or at least one candidate path is required".to_string());
        }

        if self.timeout.is_zero() {
            return Err("Timeout must be greater than 0".to_string());
        }

        if self.daemon_timeout.is_zero() {
            return Err("Daemon timeout must be greater than 0".to_string());
        }

        if self.sentinel.is_empty() {
            return Err("Sentinel cannot be empty".to_string());
        }

        if self.daemon_flag.is_empty() {
            return Err("Daemon flag cannot be empty".to_string());
        }

        Ok(())
    }
}

/// Durations travel as integer milliseconds in config files.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
