//! QA and stress suite
//!
//! Four sections of checks against the engine executable: architecture,
//! performance, functional and security. Every check yields a
//! [`CheckStatus`]; the [`QaReport`] aggregates them into a pass rate and a
//! verdict and can be written out as JSON.

pub mod architecture;
pub mod functional;
pub mod performance;
pub mod security;

use crate::config::HarnessConfig;
use crate::error::HarnessResult;
use chrono::{DateTime, Utc};
use engine::{EngineError, ProcessEngine};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Result of one check, serialised as `PASS`, `FAIL - reason`, `WARN - note`, ...
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Pass(Option<String>),
    Fail(Option<String>),
    Warn(Option<String>),
    Partial,
    NotImplemented,
}

impl CheckStatus {
    pub fn pass() -> Self {
        CheckStatus::Pass(None)
    }

    pub fn pass_with(note: impl Into<String>) -> Self {
        CheckStatus::Pass(Some(note.into()))
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        CheckStatus::Fail(Some(reason.into()))
    }

    pub fn warn(note: impl Into<String>) -> Self {
        CheckStatus::Warn(Some(note.into()))
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, CheckStatus::Pass(_))
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, CheckStatus::Fail(_))
    }

    fn symbol(&self) -> &'static str {
        match self {
            CheckStatus::Pass(_) => "✓",
            CheckStatus::Fail(_) => "✗",
            CheckStatus::Warn(_) | CheckStatus::Partial => "!",
            CheckStatus::NotImplemented => "?",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (word, note) = match self {
            CheckStatus::Pass(note) => ("PASS", note),
            CheckStatus::Fail(note) => ("FAIL", note),
            CheckStatus::Warn(note) => ("WARN", note),
            CheckStatus::Partial => return f.write_str("PARTIAL"),
            CheckStatus::NotImplemented => return f.write_str("NOT_IMPLEMENTED"),
        };
        match note {
            Some(note) => write!(f, "{} - {}", word, note),
            None => f.write_str(word),
        }
    }
}

impl Serialize for CheckStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Reason recorded for engine checks when no executable was found.
pub const MISSING_EXECUTABLE: &str = "Executable not found";

pub(crate) fn engine_failure(error: &EngineError) -> CheckStatus {
    CheckStatus::fail(error.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Section {
    Architecture,
    Performance,
    Functional,
    Security,
}

impl Section {
    pub const ALL: [Section; 4] = [
        Section::Architecture,
        Section::Performance,
        Section::Functional,
        Section::Security,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Section::Architecture => "architecture_tests",
            Section::Performance => "performance_tests",
            Section::Functional => "functional_tests",
            Section::Security => "security_tests",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Section::Architecture => "ARCHITECTURE VERIFICATION",
            Section::Performance => "PERFORMANCE & STRESS",
            Section::Functional => "FUNCTIONAL AUDIT",
            Section::Security => "SECURITY & STABILITY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Success,
    PartialSuccess,
    Failure,
}

impl Verdict {
    /// ≥ 80 % success, ≥ 60 % partial success.
    pub fn from_pass_rate(pass_rate: f64) -> Self {
        if pass_rate >= 80.0 {
            Verdict::Success
        } else if pass_rate >= 60.0 {
            Verdict::PartialSuccess
        } else {
            Verdict::Failure
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verdict::Success => "SUCCESS",
            Verdict::PartialSuccess => "PARTIAL SUCCESS",
            Verdict::Failure => "FAILURE",
        })
    }
}

impl Serialize for Verdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f64,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QaReport {
    pub generated_at: DateTime<Utc>,
    pub executable: Option<PathBuf>,
    pub architecture_tests: BTreeMap<String, CheckStatus>,
    pub performance_tests: BTreeMap<String, CheckStatus>,
    pub functional_tests: BTreeMap<String, CheckStatus>,
    pub security_tests: BTreeMap<String, CheckStatus>,
    pub summary: Summary,
    pub overall_status: Verdict,
}

impl QaReport {
    pub fn new(
        executable: Option<PathBuf>,
        results: Vec<(Section, String, CheckStatus)>,
        elapsed: Duration,
    ) -> Self {
        let mut sections: BTreeMap<Section, BTreeMap<String, CheckStatus>> = BTreeMap::new();
        for (section, name, status) in results {
            sections.entry(section).or_default().insert(name, status);
        }

        let all = || sections.values().flat_map(|checks| checks.values());
        let total = all().count();
        let passed = all().filter(|s| s.is_pass()).count();
        let failed = all().filter(|s| s.is_fail()).count();
        let pass_rate = if total > 0 {
            passed as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        let mut take = |section: Section| sections.remove(&section).unwrap_or_default();
        Self {
            generated_at: Utc::now(),
            executable,
            architecture_tests: take(Section::Architecture),
            performance_tests: take(Section::Performance),
            functional_tests: take(Section::Functional),
            security_tests: take(Section::Security),
            summary: Summary {
                total,
                passed,
                failed,
                pass_rate,
                elapsed_secs: elapsed.as_secs_f64(),
            },
            overall_status: Verdict::from_pass_rate(pass_rate),
        }
    }

    pub fn section(&self, section: Section) -> &BTreeMap<String, CheckStatus> {
        match section {
            Section::Architecture => &self.architecture_tests,
            Section::Performance => &self.performance_tests,
            Section::Functional => &self.functional_tests,
            Section::Security => &self.security_tests,
        }
    }

    /// Look up a check by name across all sections.
    pub fn status(&self, name: &str) -> Option<&CheckStatus> {
        Section::ALL
            .iter()
            .find_map(|section| self.section(*section).get(name))
    }

    pub fn to_json(&self) -> HarnessResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> HarnessResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        info!("QA report written to {}", path.display());
        Ok(())
    }

    /// Human-readable report, one line per check.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for section in Section::ALL {
            out.push_str(&format!("\n{}:\n", section.title()));
            for (name, status) in self.section(section) {
                out.push_str(&format!("  {} {}: {}\n", status.symbol(), name, status));
            }
        }
        out.push_str(&format!(
            "\nTotal: {}  Passed: {}  Failed: {}  Pass rate: {:.1}%\nAXIOM TRANSFORMATION: {}\n",
            self.summary.total,
            self.summary.passed,
            self.summary.failed,
            self.summary.pass_rate,
            self.overall_status
        ));
        out
    }
}

/// Runs every section against one engine executable.
pub struct QaSuite {
    config: HarnessConfig,
    engine: Option<ProcessEngine>,
}

impl QaSuite {
    /// Locate the executable; a missing one is reported per check, not as an error.
    pub fn new(config: HarnessConfig) -> Self {
        let engine = match ProcessEngine::discover(config.engine.clone()) {
            Ok(engine) => {
                info!("Found AXIOM executable: {}", engine.path().display());
                Some(engine)
            }
            Err(EngineError::NotFound { strays, .. }) => {
                error!("AXIOM executable not found");
                for stray in strays {
                    warn!("  candidate outside candidate list: {}", stray.display());
                }
                None
            }
            Err(e) => {
                error!("Cannot use AXIOM executable: {}", e);
                None
            }
        };
        Self { config, engine }
    }

    pub fn with_engine(config: HarnessConfig, engine: Option<ProcessEngine>) -> Self {
        Self { config, engine }
    }

    pub fn engine(&self) -> Option<&ProcessEngine> {
        self.engine.as_ref()
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub async fn run(&self) -> QaReport {
        let start = Instant::now();
        let engine = self.engine.as_ref();
        let mut results = Vec::new();

        for section in Section::ALL {
            info!("Running {}", section.title());
            let checks = match section {
                Section::Architecture => architecture::run(&self.config, engine).await,
                Section::Performance => performance::run(&self.config, engine).await,
                Section::Functional => functional::run(engine).await,
                Section::Security => security::run(engine).await,
            };
            for (name, status) in checks {
                if status.is_fail() {
                    warn!("{}: {}", name, status);
                } else {
                    info!("{}: {}", name, status);
                }
                results.push((section, name.to_string(), status));
            }
        }

        QaReport::new(
            self.engine.as_ref().map(|e| e.path().to_path_buf()),
            results,
            start.elapsed(),
        )
    }

    /// Run, then write the JSON report to the configured path.
    pub async fn run_and_save(&self) -> HarnessResult<QaReport> {
        let report = self.run().await;
        report.write_json(&self.config.report_path)?;
        Ok(report)
    }
}
