//! CMake configure and build steps.

use crate::{BuildError, BuildOutput, BuildResult, BuildSpec};
use engine::{locate, EngineConfig};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Searched inside the build tree before the default candidate list.
pub const BUILD_TREE_CANDIDATES: &[&str] = &[
    "axiom",
    "axiom.exe",
    "Debug/axiom",
    "Debug/axiom.exe",
    "Release/axiom",
    "Release/axiom.exe",
];

/// Outcome of one successful build step
#[derive(Debug, Clone)]
pub struct StepReport {
    pub step: String,
    pub elapsed: Duration,
    pub stdout_tail: String,
}

/// Runs CMake for an engine source tree
pub struct CmakeBuilder {
    program: String,
}

impl Default for CmakeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CmakeBuilder {
    pub fn new() -> Self {
        Self {
            program: "cmake".to_string(),
        }
    }

    /// Use a different cmake binary (wrapper scripts, pinned versions).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub async fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .is_ok_and(|status| status.success())
    }

    /// Configure, build, then look for the engine executable in the tree.
    pub async fn build(&self, spec: &BuildSpec) -> BuildResult<BuildOutput> {
        spec.validate()?;

        if !self.is_available().await {
            return Err(BuildError::CmakeMissing);
        }

        let mut steps = Vec::with_capacity(2);
        steps.push(
            self.run_step("configure", &spec.configure_args(), spec.configure_timeout)
                .await?,
        );
        steps.push(
            self.run_step("build", &spec.build_args(), spec.build_timeout)
                .await?,
        );

        Ok(BuildOutput {
            steps,
            executable: find_executable(spec),
        })
    }

    async fn run_step(
        &self,
        step: &str,
        args: &[String],
        limit: Duration,
    ) -> BuildResult<StepReport> {
        info!("Running {} step: {} {}", step, self.program, args.join(" "));
        let start = Instant::now();

        let child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BuildError::StepFailed {
                step: step.to_string(),
                stderr: e.to_string(),
            })?;

        let output = match timeout(limit, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(BuildError::StepTimeout {
                    step: step.to_string(),
                    after: limit,
                })
            }
        };

        if !output.status.success() {
            return Err(BuildError::StepFailed {
                step: step.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(StepReport {
            step: step.to_string(),
            elapsed: start.elapsed(),
            stdout_tail: tail(&stdout, 5),
        })
    }
}

/// The configured build tree first, then the usual locations under the source tree.
pub fn find_executable(spec: &BuildSpec) -> Option<PathBuf> {
    let build_tree = EngineConfig::default()
        .with_search_root(spec.resolved_build_dir())
        .with_candidates(BUILD_TREE_CANDIDATES.iter().copied());
    match locate(&build_tree) {
        Ok(path) => return Some(path),
        Err(e) => debug!("Not in the build tree: {}", e),
    }

    let source_tree = EngineConfig::default().with_search_root(&spec.source_dir);
    match locate(&source_tree) {
        Ok(path) => Some(path),
        Err(e) => {
            warn!("Engine built but executable not found: {}", e);
            None
        }
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
