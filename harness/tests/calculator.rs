#![cfg(unix)]

#[path = "../../engine/tests/common/mod.rs"]
mod common;

use common::fixtures;
use engine::prelude::*;
use harness::{run_shell, run_speed_test, CalculatorSession, CommandResult, Rating};
use serial_test::serial;
use std::time::Duration;

fn process_engine() -> ProcessEngine {
    let config = EngineConfig::default()
        .with_timeout(Duration::from_secs(5))
        .with_daemon_timeout(Duration::from_secs(5))
        .with_daemon_startup_grace(Duration::from_millis(100));
    ProcessEngine::new(&fixtures().engine, config)
}

fn evaluated(result: &CommandResult) -> &Evaluation {
    match result {
        CommandResult::Evaluated(evaluation) => evaluation,
        other => panic!("expected an evaluation, got {:?}", other),
    }
}

#[tokio::test]
#[serial]
async fn test_engine_answers_complex_expressions() {
    let mut session = CalculatorSession::new(Some(process_engine()));

    let result = session.execute("sqrt(16)").await;
    let evaluation = evaluated(&result);
    assert_eq!(evaluation.answer, "4");
    assert_eq!(evaluation.source, EvalSource::Engine);

    // Simple arithmetic never reaches the engine.
    let result = session.execute("12 + 30").await;
    assert_eq!(evaluated(&result).source, EvalSource::FastLocal);
    assert_eq!(evaluated(&result).answer, "42");
}

#[tokio::test]
#[serial]
async fn test_rejected_expression_falls_back_locally() {
    let mut session = CalculatorSession::new(Some(process_engine()));

    let result = session.execute("floor(2.7) + 1").await;
    let evaluation = evaluated(&result);
    assert_eq!(evaluation.answer, "3");
    assert_eq!(evaluation.source, EvalSource::AutoFallback);
    assert!(result.render().ends_with("(engine failed, local fallback)"));

    let result = session.execute("hgfdjhgf").await;
    assert!(!result.is_success());
    assert!(result.render().starts_with("Error: "));
}

#[tokio::test]
#[serial]
async fn test_daemon_backed_session() {
    let daemon = SharedDaemon::start(&fixtures().engine, process_engine().config().clone())
        .await
        .unwrap();
    let mut session = CalculatorSession::new(Some(daemon));

    let engine = session.engine().unwrap();
    let evaluation = engine.evaluate("2 * 3").await.unwrap();
    assert_eq!(evaluation.answer, "6");
    assert_eq!(evaluation.source, EvalSource::Daemon);

    // Answered locally, so the daemon sees one request.
    let result = session.execute("2 * 3").await;
    assert_eq!(evaluated(&result).source, EvalSource::FastLocal);

    let daemon = session.into_engine().unwrap();
    assert_eq!(daemon.stats().await.total_requests, 1);
    daemon.shutdown().await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_shell_with_engine() {
    let input: &[u8] = b"x = 5\nsqrt(16)\nx * 2\nquit\n";
    let mut output = Vec::new();

    let session = run_shell(CalculatorSession::new(Some(process_engine())), input, &mut output)
        .await
        .unwrap();
    let text = String::from_utf8(output).unwrap();

    assert!(text.contains("x = 5 (fast local)"));
    assert!(text.contains("4 ("));
    assert!(text.contains("10 (local fallback)") || text.contains("10 (engine failed, local fallback)"));
    assert!(text.ends_with("Goodbye!\n"));
    assert!(session.has_engine());
}

#[tokio::test]
#[serial]
async fn test_speed_benchmark() {
    let report = run_speed_test(&process_engine()).await;

    assert_eq!(report.operations.len(), 8);
    let sqrt = report
        .operations
        .iter()
        .find(|op| op.expression == "sqrt(16)")
        .unwrap();
    assert!(sqrt.success);
    assert_eq!(sqrt.output, "4");

    let rejected = report
        .operations
        .iter()
        .find(|op| op.expression == "12+21")
        .unwrap();
    assert!(!rejected.success);
    assert!(rejected.output.starts_with("Error: "));

    assert_eq!(report.successful, 1);
    assert_ne!(report.rating, Rating::Senna);
}

#[tokio::test]
#[serial]
async fn test_session_recovers_after_daemon_timeout() {
    let config = process_engine()
        .config()
        .clone()
        .with_daemon_timeout(Duration::from_millis(300));
    let daemon = SharedDaemon::start(&fixtures().slow_daemon, config)
        .await
        .unwrap();
    let mut session = CalculatorSession::new(Some(daemon));

    let result = session.execute("slow").await;
    assert!(!result.is_success());
    assert!(result.render().contains("timed out"));

    // The killed daemon's late answer must not surface here.
    tokio::time::sleep(Duration::from_millis(900)).await;
    let result = session.execute("sqrt(16)").await;
    let evaluation = evaluated(&result);
    assert_eq!(evaluation.answer, "4");
    assert_eq!(evaluation.source, EvalSource::AutoFallback);

    session.into_engine().unwrap().shutdown().await.unwrap();
}
