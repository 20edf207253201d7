//! Binary identity, daemon protocol and namespace purity.

use super::{engine_failure, CheckStatus, MISSING_EXECUTABLE};
use crate::config::HarnessConfig;
use engine::{DaemonSession, EngineError, ProcessEngine};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub async fn run(
    config: &HarnessConfig,
    engine: Option<&ProcessEngine>,
) -> Vec<(&'static str, CheckStatus)> {
    let mut results = match engine {
        Some(engine) => vec![
            ("binary_identity", binary_identity(engine).await),
            ("daemon_handshake", daemon_handshake(engine).await),
        ],
        None => vec![
            ("binary_identity", CheckStatus::fail(MISSING_EXECUTABLE)),
            ("daemon_handshake", CheckStatus::fail(MISSING_EXECUTABLE)),
        ],
    };
    results.push((
        "namespace_purity",
        namespace_purity(
            &config.engine.search_root,
            &config.critical_files,
            &config.legacy_names,
        )
        .await,
    ));
    results
}

/// `--help` must carry the identification string.
pub async fn binary_identity(engine: &ProcessEngine) -> CheckStatus {
    let identity = &engine.config().identity;
    match engine.help().await {
        Ok(invocation) if invocation.contains(identity) => CheckStatus::pass(),
        Ok(invocation) => {
            debug!(
                "--help stdout: {:?} stderr: {:?}",
                invocation.stdout.chars().take(200).collect::<String>(),
                invocation.stderr.chars().take(200).collect::<String>()
            );
            CheckStatus::fail(format!("Expected '{}' in --help output", identity))
        }
        Err(e) => engine_failure(&e),
    }
}

/// Start a daemon, send `2+2`, and require the sentinel within the daemon timeout.
pub async fn daemon_handshake(engine: &ProcessEngine) -> CheckStatus {
    let mut session = match DaemonSession::start(engine.path(), engine.config().clone()).await {
        Ok(session) => session,
        Err(EngineError::DaemonExited { stderr }) => {
            warn!("Daemon exited during startup: {}", stderr);
            return CheckStatus::fail("Daemon crash");
        }
        Err(e) => return engine_failure(&e),
    };

    let status = match session.request("2+2").await {
        Ok(response) => {
            debug!("Daemon handshake response: {:?}", response.raw);
            CheckStatus::pass()
        }
        Err(EngineError::Timeout { .. }) => CheckStatus::fail("Protocol violation"),
        Err(EngineError::DaemonExited { stderr }) => {
            warn!("Daemon exited before answering: {}", stderr);
            CheckStatus::fail("Daemon crash")
        }
        Err(e) => engine_failure(&e),
    };

    if let Err(e) = session.shutdown().await {
        warn!("Daemon shutdown failed: {}", e);
    }
    status
}

/// None of `critical_files` under `root` may still mention a legacy name.
pub async fn namespace_purity(
    root: &Path,
    critical_files: &[PathBuf],
    legacy_names: &[String],
) -> CheckStatus {
    let mut offenders = Vec::new();
    for file in critical_files {
        let path = root.join(file);
        // Absent files are not impure.
        let Ok(bytes) = tokio::fs::read(&path).await else {
            continue;
        };
        let content = String::from_utf8_lossy(&bytes);
        if legacy_names.iter().any(|name| content.contains(name.as_str())) {
            offenders.push(file.display().to_string());
        }
    }

    if offenders.is_empty() {
        CheckStatus::pass()
    } else {
        let shown: Vec<&str> = offenders.iter().take(3).map(String::as_str).collect();
        CheckStatus::fail(format!(
            "Legacy names in {} critical files: {}",
            offenders.len(),
            shown.join(", ")
        ))
    }
}
