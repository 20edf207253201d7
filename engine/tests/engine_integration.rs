#![cfg(unix)]

mod common;

use common::fixtures;
use engine::prelude::*;
use serial_test::serial;
use std::time::Duration;

fn config() -> EngineConfig {
    EngineConfig::default()
        .with_timeout(Duration::from_secs(5))
        .with_daemon_timeout(Duration::from_secs(5))
        .with_daemon_startup_grace(Duration::from_millis(100))
}

fn process_engine() -> ProcessEngine {
    ProcessEngine::new(&fixtures().engine, config())
}

#[tokio::test]
#[serial]
async fn test_help_contains_identity() {
    let engine = process_engine();
    let invocation = engine.help().await.unwrap();

    assert!(invocation.outcome.is_success());
    assert!(invocation.contains("AXIOM Engine v3.0"));
    tokio_test::assert_ok!(engine.health_check().await);
}

#[tokio::test]
#[serial]
async fn test_multiplication_answer() {
    let engine = process_engine();
    let invocation = engine.invoke("2 * 3").await.unwrap();

    assert_eq!(invocation.outcome, Outcome::Succeeded { code: 0 });
    assert!(invocation.contains("6"));

    let evaluation = engine.evaluate("2 * 3").await.unwrap();
    assert_eq!(evaluation.answer, "6");
    assert_eq!(evaluation.source, EvalSource::Engine);
}

#[tokio::test]
#[serial]
async fn test_answer_strips_loader_noise() {
    let evaluation = process_engine().evaluate("2+2").await.unwrap();
    assert_eq!(evaluation.answer, "4");
}

#[tokio::test]
#[serial]
async fn test_rejected_input_is_recoverable() {
    let engine = process_engine();
    let invocation = engine.invoke("hgfdjhgf").await.unwrap();
    assert_eq!(invocation.outcome, Outcome::Failed { code: 1 });
    assert_eq!(invocation.outcome.return_code(), Some(1));

    match engine.evaluate("hgfdjhgf").await {
        Err(EngineError::Rejected { code, stderr }) => {
            assert_eq!(code, 1);
            assert!(stderr.contains("cannot evaluate"));
        }
        other => panic!("expected Rejected, got {:?}", other),
    }
}

#[tokio::test]
#[serial]
async fn test_signal_termination_is_crash() {
    let invocation = process_engine().invoke("crash").await.unwrap();

    assert!(invocation.outcome.is_crash());
    assert_eq!(invocation.outcome.return_code(), Some(-11));
}

#[tokio::test]
#[serial]
async fn test_timeout_kills_process() {
    let engine = process_engine();
    let invocation = engine
        .invoke_with_timeout("hang", Duration::from_millis(300))
        .await
        .unwrap();

    assert!(invocation.outcome.is_timeout());
    assert!(invocation.elapsed < Duration::from_secs(5));
}

#[tokio::test]
#[serial]
async fn test_piped_mode() {
    let invocation = process_engine()
        .invoke_mode("2+2", InvocationMode::Piped)
        .await
        .unwrap();

    assert!(invocation.outcome.is_success());
    assert_eq!(invocation.answer(|_| false), Some("4".to_string()));
}

#[tokio::test]
#[serial]
async fn test_daemon_handshake() {
    let mut session = DaemonSession::start(&fixtures().engine, config())
        .await
        .unwrap();

    let response = session.request("2+2").await.unwrap();
    assert_eq!(response.answer, Some("4".to_string()));
    assert!(response.raw.contains("Daemon Mode"));

    let response = session.request("2 * 3").await.unwrap();
    assert_eq!(response.answer, Some("6".to_string()));
    assert!(!response.raw.contains("__END_OF_RESPONSE__"));

    assert_eq!(session.stats().total_requests, 2);
    session.shutdown().await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_shared_daemon_as_engine() {
    let daemon = SharedDaemon::start(&fixtures().engine, config())
        .await
        .unwrap();

    daemon.health_check().await.unwrap();
    let evaluation = daemon.evaluate("2 * 3").await.unwrap();
    assert_eq!(evaluation.answer, "6");
    assert_eq!(evaluation.source, EvalSource::Daemon);
    assert_eq!(daemon.stats().await.total_requests, 2);

    daemon.shutdown().await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_daemon_that_dies_on_startup() {
    let config = config().with_daemon_startup_grace(Duration::from_millis(750));
    let result = DaemonSession::start(&fixtures().dead_daemon, config).await;
    match result {
        Err(EngineError::DaemonExited { stderr }) => assert!(stderr.contains("no pipe")),
        Err(other) => panic!("expected DaemonExited, got {:?}", other),
        Ok(_) => panic!("expected DaemonExited, got a session"),
    }
}

#[tokio::test]
#[serial]
async fn test_daemon_without_sentinel_times_out() {
    let config = config().with_daemon_timeout(Duration::from_millis(300));
    let mut session = DaemonSession::start(&fixtures().mute_daemon, config)
        .await
        .unwrap();

    let result = session.request("2+2").await;
    assert!(matches!(result, Err(EngineError::Timeout { .. })));
}

#[tokio::test]
#[serial]
async fn test_discover_in_build_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("build")).unwrap();
    std::fs::copy(&fixtures().engine, dir.path().join("build/axiom")).unwrap();

    let engine = ProcessEngine::discover(config().with_search_root(dir.path())).unwrap();
    assert_eq!(engine.path(), dir.path().join("build/axiom"));
}

#[tokio::test]
#[serial]
async fn test_piped_engine_that_never_reads_times_out() {
    let engine = ProcessEngine::new(&fixtures().deaf_engine, config());
    let expression = "1+".repeat(100_000);

    let invocation = engine
        .invoke_piped(&expression, Duration::from_millis(300))
        .await
        .unwrap();

    assert_eq!(
        invocation.outcome,
        Outcome::TimedOut {
            after: Duration::from_millis(300)
        }
    );
    assert!(invocation.elapsed < Duration::from_secs(3));
}

#[tokio::test]
#[serial]
async fn test_late_reply_never_answers_the_next_request() {
    let config = config().with_daemon_timeout(Duration::from_millis(300));
    let mut session = DaemonSession::start(&fixtures().slow_daemon, config)
        .await
        .unwrap();

    let response = session.request("fast").await.unwrap();
    assert_eq!(response.answer, Some("fast-answer".to_string()));

    let result = session.request("slow").await;
    assert!(matches!(result, Err(EngineError::Timeout { .. })));
    assert!(session.is_abandoned());

    // Give the killed daemon's answer time to arrive, had it survived.
    tokio::time::sleep(Duration::from_millis(900)).await;
    let result = session.request("next").await;
    assert!(matches!(result, Err(EngineError::Protocol { .. })));
    assert_eq!(session.stats().total_requests, 1);

    session.shutdown().await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_daemon_stderr_does_not_stall_responses() {
    let mut session = DaemonSession::start(&fixtures().chatty_daemon, config())
        .await
        .unwrap();

    for _ in 0..3 {
        let response = session.request("2+2").await.unwrap();
        assert_eq!(response.answer, Some("4".to_string()));
    }

    session.shutdown().await.unwrap();
}
