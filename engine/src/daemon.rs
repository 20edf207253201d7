//! Long-lived `--daemon` sessions.
//!
//! Protocol: write one expression followed by `\n`, then read stdout until the
//! sentinel shows up in the accumulated buffer. Everything before the sentinel
//! is the response; anything after it belongs to the next one.

use crate::config::EngineConfig;
use crate::provider::{Engine, EngineError, EngineResult};
use crate::types::{last_meaningful_line, EvalSource, Evaluation};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

const READ_CHUNK: usize = 4096;
/// Bytes of daemon stderr kept for error reports.
pub const STDERR_TAIL: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonResponse {
    /// Text before the sentinel, untrimmed.
    pub raw: String,
    /// Last meaningful line of `raw`.
    pub answer: Option<String>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DaemonStats {
    pub total_requests: u64,
    pub total_response_time: Duration,
}

impl DaemonStats {
    pub fn avg_response_ms(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.total_response_time.as_secs_f64() * 1000.0 / self.total_requests as f64
        }
    }
}

pub struct DaemonSession {
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
    stderr: Option<JoinHandle<String>>,
    pending: Vec<u8>,
    config: EngineConfig,
    stats: DaemonStats,
    /// Set once a request timed out; the daemon has been killed.
    abandoned: bool,
}

impl DaemonSession {
    /// Spawn `<path> --daemon` and wait out the startup grace period.
    pub async fn start(path: impl AsRef<Path>, config: EngineConfig) -> EngineResult<Self> {
        let path = path.as_ref();
        let mut child = Command::new(path)
            .arg(&config.daemon_flag)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Spawn {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let mut stderr = child.stderr.take().map(|pipe| tokio::spawn(collect_tail(pipe)));

        if !config.daemon_startup_grace.is_zero() {
            sleep(config.daemon_startup_grace).await;
        }

        if let Some(status) = child.try_wait()? {
            let stderr = drain_stderr(&mut stderr).await;
            warn!("Daemon exited during startup with {}", status);
            return Err(EngineError::DaemonExited { stderr });
        }

        let stdin = child.stdin.take().ok_or_else(|| EngineError::Protocol {
            message: "daemon stdin unavailable".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| EngineError::Protocol {
            message: "daemon stdout unavailable".to_string(),
        })?;

        info!("Daemon started: {}", path.display());
        Ok(Self {
            child,
            stdin,
            stdout,
            stderr,
            pending: Vec::new(),
            config,
            stats: DaemonStats::default(),
            abandoned: false,
        })
    }

    pub fn stats(&self) -> &DaemonStats {
        &self.stats
    }

    /// Whether an earlier request timed out and the daemon was killed.
    pub fn is_abandoned(&self) -> bool {
        self.abandoned
    }

    /// Send one expression and wait for its sentinel-terminated response.
    ///
    /// A timeout kills the daemon: its late answer would otherwise be read as
    /// the reply to the next request. Every later request fails with
    /// [`EngineError::Protocol`].
    pub async fn request(&mut self, expression: &str) -> EngineResult<DaemonResponse> {
        if self.abandoned {
            return Err(EngineError::Protocol {
                message: "daemon session was abandoned after a timeout".to_string(),
            });
        }

        let start = Instant::now();
        let line = format!("{}\n", expression.trim_end_matches(['\r', '\n']));
        let limit = self.config.daemon_timeout;
        let exchanged = timeout(limit, self.exchange(&line)).await;
        let raw = match exchanged {
            Ok(result) => result?,
            Err(_) => {
                warn!("Daemon gave no sentinel within {:?}; killing it", limit);
                self.abandoned = true;
                self.pending.clear();
                if let Err(e) = self.child.start_kill() {
                    debug!("Daemon kill failed: {}", e);
                }
                return Err(EngineError::Timeout { after: limit });
            }
        };

        let elapsed = start.elapsed();
        self.stats.total_requests += 1;
        self.stats.total_response_time += elapsed;

        let answer = last_meaningful_line(&raw, |l| self.config.is_noise(l));
        debug!("Daemon answered {:?} in {:?}", answer, elapsed);
        Ok(DaemonResponse {
            raw,
            answer,
            elapsed,
        })
    }

    async fn exchange(&mut self, line: &str) -> EngineResult<String> {
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;
        self.read_until_sentinel().await
    }

    async fn read_until_sentinel(&mut self) -> EngineResult<String> {
        let sentinel = self.config.sentinel.as_bytes().to_vec();
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            if let Some(pos) = find(&self.pending, &sentinel) {
                let rest = self.pending.split_off(pos + sentinel.len());
                self.pending.truncate(pos);
                let raw = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending = rest;
                return Ok(raw);
            }

            let n = self.stdout.read(&mut chunk).await?;
            if n == 0 {
                let stderr = drain_stderr(&mut self.stderr).await;
                return Err(EngineError::DaemonExited {
                    stderr: if stderr.is_empty() {
                        format!(
                            "stdout closed before sentinel; partial response: {}",
                            String::from_utf8_lossy(&self.pending)
                        )
                    } else {
                        stderr
                    },
                });
            }
            self.pending.extend_from_slice(&chunk[..n]);
        }
    }

    /// Ask the daemon to exit, then make sure it is gone.
    pub async fn shutdown(mut self) -> EngineResult<()> {
        let _ = self.stdin.write_all(b"exit\n").await;
        let _ = self.stdin.flush().await;

        match timeout(Duration::from_millis(500), self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!("Daemon exited with {}", status);
                Ok(())
            }
            _ => {
                self.child.kill().await?;
                Ok(())
            }
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Read a pipe to its end, keeping the last [`STDERR_TAIL`] bytes.
async fn collect_tail<R: AsyncRead + Unpin>(mut pipe: R) -> String {
    let mut tail = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];
    while let Ok(n) = pipe.read(&mut chunk).await {
        if n == 0 {
            break;
        }
        tail.extend_from_slice(&chunk[..n]);
        if tail.len() > STDERR_TAIL {
            tail.drain(..tail.len() - STDERR_TAIL);
        }
    }
    String::from_utf8_lossy(&tail).trim().to_string()
}

/// Stderr collected so far, once the daemon has closed it.
async fn drain_stderr(task: &mut Option<JoinHandle<String>>) -> String {
    let Some(handle) = task.as_mut() else {
        return String::new();
    };
    match timeout(Duration::from_millis(200), handle).await {
        Ok(joined) => {
            *task = None;
            joined.unwrap_or_default()
        }
        Err(_) => String::new(),
    }
}

/// A daemon session shared behind a lock so it can serve as an [`Engine`].
pub struct SharedDaemon {
    path: PathBuf,
    session: Mutex<DaemonSession>,
}

impl SharedDaemon {
    pub async fn start(path: impl Into<PathBuf>, config: EngineConfig) -> EngineResult<Self> {
        let path = path.into();
        let session = DaemonSession::start(&path, config).await?;
        Ok(Self {
            path,
            session: Mutex::new(session),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn stats(&self) -> DaemonStats {
        self.session.lock().await.stats().clone()
    }

    pub async fn shutdown(self) -> EngineResult<()> {
        self.session.into_inner().shutdown().await
    }
}

#[async_trait]
impl Engine for SharedDaemon {
    async fn evaluate(&self, expression: &str) -> EngineResult<Evaluation> {
        let response = self.session.lock().await.request(expression).await?;
        Ok(Evaluation {
            expression: expression.to_string(),
            answer: response.answer.unwrap_or_else(|| "Processed".to_string()),
            elapsed: response.elapsed,
            source: EvalSource::Daemon,
        })
    }

    async fn health_check(&self) -> EngineResult<()> {
        self.session.lock().await.request("2+2").await.map(|_| ())
    }

    fn name(&self) -> &'static str {
        "daemon"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_sentinel() {
        let buf = b"4\n__END_OF_RESPONSE__\n6\n";
        assert_eq!(find(buf, b"__END_OF_RESPONSE__"), Some(2));
        assert_eq!(find(b"__END_OF", b"__END_OF_RESPONSE__"), None);
        assert_eq!(find(b"abc", b""), None);
    }

    #[test]
    fn test_avg_response() {
        let mut stats = DaemonStats::default();
        assert_eq!(stats.avg_response_ms(), 0.0);
        stats.total_requests = 4;
        stats.total_response_time = Duration::from_millis(100);
        assert!((stats.avg_response_ms() - 25.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_stderr_tail_is_capped() {
        let mut noise = vec![b'a'; STDERR_TAIL];
        noise.extend_from_slice(b"fatal: last words\n");
        let tail = collect_tail(noise.as_slice()).await;

        assert!(tail.len() <= STDERR_TAIL);
        assert!(tail.ends_with("fatal: last words"));
    }

    #[tokio::test]
    async fn test_drain_without_pipe() {
        assert_eq!(drain_stderr(&mut None).await, "");
    }

    #[tokio::test]
    async fn test_start_missing_executable() {
        let config = EngineConfig::default().with_daemon_startup_grace(Duration::ZERO);
        let result = DaemonSession::start("/nonexistent/axiom", config).await;
        assert!(matches!(result, Err(EngineError::Spawn { .. })));
    }
}
