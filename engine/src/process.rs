//! One-shot engine invocations: one process per expression.

use crate::config::EngineConfig;
use crate::locate::locate;
use crate::provider::{Engine, EngineError, EngineResult};
use crate::types::{EvalSource, Evaluation, Invocation, InvocationMode, Outcome};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ProcessEngine {
    path: PathBuf,
    config: EngineConfig,
}

impl ProcessEngine {
    pub fn new(path: impl Into<PathBuf>, config: EngineConfig) -> Self {
        Self {
            path: path.into(),
            config,
        }
    }

    /// Locate the executable with the configured candidate list.
    pub fn discover(config: EngineConfig) -> EngineResult<Self> {
        config
            .validate()
            .map_err(|message| EngineError::InvalidConfig { message })?;
        let path = locate(&config)?;
        Ok(Self::new(path, config))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the engine with `args`, capturing output.
    ///
    /// Non-zero exits, signals and timeouts are reported through
    /// [`Invocation::outcome`]; only a failure to spawn is an error.
    pub async fn run(&self, args: &[&str], limit: Duration) -> EngineResult<Invocation> {
        self.run_with_input(args, None, limit).await
    }

    pub async fn invoke(&self, expression: &str) -> EngineResult<Invocation> {
        self.run(&[expression], self.config.timeout).await
    }

    pub async fn invoke_with_timeout(
        &self,
        expression: &str,
        limit: Duration,
    ) -> EngineResult<Invocation> {
        self.run(&[expression], limit).await
    }

    /// Feed the expression on stdin to an argument-less engine, then `exit`.
    pub async fn invoke_piped(&self, expression: &str, limit: Duration) -> EngineResult<Invocation> {
        let input = format!("{}\nexit\n", expression);
        self.run_with_input(&[], Some(input), limit).await
    }

    pub async fn invoke_mode(
        &self,
        expression: &str,
        mode: InvocationMode,
    ) -> EngineResult<Invocation> {
        match mode {
            InvocationMode::Argument => self.invoke(expression).await,
            InvocationMode::Piped => self.invoke_piped(expression, self.config.timeout).await,
        }
    }

    pub async fn help(&self) -> EngineResult<Invocation> {
        self.run(&["--help"], self.config.timeout).await
    }

    async fn run_with_input(
        &self,
        args: &[&str],
        input: Option<String>,
        limit: Duration,
    ) -> EngineResult<Invocation> {
        let mut cmd = Command::new(&self.path);
        cmd.args(args)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|e| EngineError::Spawn {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        // Feeding stdin shares the time limit: an engine that never reads must still time out.
        let stdin = child.stdin.take();
        let feed = async move {
            if let (Some(text), Some(mut stdin)) = (input, stdin) {
                // A process that exits without reading closes the pipe; that is its outcome, not ours.
                if let Err(e) = stdin.write_all(text.as_bytes()).await {
                    debug!("Engine closed stdin early: {}", e);
                }
            }
        };
        let finished = async move {
            let ((), output) = tokio::join!(feed, child.wait_with_output());
            output
        };

        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        // On expiry the child is dropped with the future and killed (`kill_on_drop`).
        match timeout(limit, finished).await {
            Ok(Ok(output)) => {
                let outcome = Outcome::from_status(output.status);
                if outcome.is_crash() {
                    warn!("Engine crashed on {:?}: {:?}", preview(&args), outcome);
                }
                Ok(Invocation {
                    args,
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    outcome,
                    elapsed: start.elapsed(),
                })
            }
            Ok(Err(e)) => Err(EngineError::Io(e)),
            Err(_) => {
                debug!("Engine timed out after {:?} on {:?}", limit, preview(&args));
                Ok(Invocation {
                    args,
                    stdout: String::new(),
                    stderr: String::new(),
                    outcome: Outcome::TimedOut { after: limit },
                    elapsed: start.elapsed(),
                })
            }
        }
    }
}

/// First 20 characters of the first argument, for log lines.
fn preview(args: &[String]) -> String {
    args.first()
        .map(|a| a.chars().take(20).collect())
        .unwrap_or_default()
}

#[async_trait]
impl Engine for ProcessEngine {
    async fn evaluate(&self, expression: &str) -> EngineResult<Evaluation> {
        let invocation = self.invoke(expression).await?;
        match invocation.outcome {
            Outcome::Succeeded { .. } => {
                let answer = invocation
                    .answer(|line| self.config.is_noise(line))
                    .unwrap_or_else(|| "Processed".to_string());
                Ok(Evaluation {
                    expression: expression.to_string(),
                    answer,
                    elapsed: invocation.elapsed,
                    source: EvalSource::Engine,
                })
            }
            Outcome::Failed { code } => Err(EngineError::Rejected {
                code,
                stderr: invocation.stderr_summary(),
            }),
            Outcome::Crashed { signal } => Err(EngineError::Crashed { signal }),
            Outcome::TimedOut { after } => Err(EngineError::Timeout { after }),
        }
    }

    async fn health_check(&self) -> EngineResult<()> {
        let invocation = self.help().await?;
        if invocation.contains(&self.config.identity) {
            Ok(())
        } else {
            Err(EngineError::Protocol {
                message: format!(
                    "expected '{}' in --help output, got: {}",
                    self.config.identity,
                    invocation.stdout.chars().take(200).collect::<String>()
                ),
            })
        }
    }

    fn name(&self) -> &'static str {
        "process"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates() {
        let args = vec![")".repeat(1000)];
        assert_eq!(preview(&args).chars().count(), 20);
        assert_eq!(preview(&[]), "");
    }

    #[tokio::test]
    async fn test_spawn_failure_is_error() {
        let engine = ProcessEngine::new("/nonexistent/axiom", EngineConfig::default());
        let result = engine.invoke("1+1").await;
        assert!(matches!(result, Err(EngineError::Spawn { .. })));
    }

    #[test]
    fn test_discover_rejects_invalid_config() {
        let config = EngineConfig::default().with_timeout(Duration::ZERO);
        assert!(matches!(
            ProcessEngine::discover(config),
            Err(EngineError::InvalidConfig { .. })
        ));
    }
}
