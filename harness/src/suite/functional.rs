//! Math checks: mode switching, arithmetic, precision and core functions.

use super::{engine_failure, CheckStatus, MISSING_EXECUTABLE};
use engine::ProcessEngine;
use std::time::Duration;
use tracing::debug;

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Expression and the text its output must contain.
pub const CORE_OPERATIONS: &[(&str, &str)] = &[
    ("2+2", "4"),
    ("sqrt(16)", "4"),
    ("3.14159265358979", "3.14159265358979"),
    ("max(1,2,3,4,5)", "5"),
];

pub async fn run(engine: Option<&ProcessEngine>) -> Vec<(&'static str, CheckStatus)> {
    let Some(engine) = engine else {
        return ["symbolic", "linear_algebra", "precision", "core_operations"]
            .into_iter()
            .map(|name| (name, CheckStatus::fail(MISSING_EXECUTABLE)))
            .collect();
    };

    vec![
        ("symbolic", symbolic(engine).await),
        ("linear_algebra", linear_algebra(engine).await),
        ("precision", precision(engine).await),
        ("core_operations", core_operations(engine).await),
    ]
}

/// Only the mode switch is exercised, so success is reported as partial.
pub async fn symbolic(engine: &ProcessEngine) -> CheckStatus {
    match engine.run(&["symbolic"], CHECK_TIMEOUT).await {
        Ok(invocation) if invocation.outcome.is_success() => CheckStatus::Partial,
        Ok(invocation) => {
            debug!("symbolic: {}", invocation.stderr_summary());
            CheckStatus::Fail(None)
        }
        Err(e) => engine_failure(&e),
    }
}

pub async fn linear_algebra(engine: &ProcessEngine) -> CheckStatus {
    match engine.run(&["2 * 3"], CHECK_TIMEOUT).await {
        Ok(invocation) if invocation.stdout.contains('6') => CheckStatus::pass(),
        Ok(invocation) => {
            debug!("Expected '6', got: {}", invocation.stdout.trim());
            CheckStatus::Fail(None)
        }
        Err(e) => engine_failure(&e),
    }
}

pub async fn precision(engine: &ProcessEngine) -> CheckStatus {
    match engine.run(&["0.1 + 0.2"], CHECK_TIMEOUT).await {
        Ok(invocation) if invocation.outcome.is_success() => CheckStatus::pass(),
        Ok(invocation) => {
            debug!("precision: {}", invocation.stderr_summary());
            CheckStatus::Fail(None)
        }
        Err(e) => engine_failure(&e),
    }
}

pub async fn core_operations(engine: &ProcessEngine) -> CheckStatus {
    let mut passed = 0usize;
    for &(expression, expected) in CORE_OPERATIONS {
        match engine.run(&[expression], CHECK_TIMEOUT).await {
            Ok(invocation) if invocation.outcome.is_success() && invocation.contains(expected) => {
                passed += 1;
            }
            Ok(invocation) => debug!(
                "{} -> {} (expected {})",
                expression,
                invocation.stdout.trim(),
                expected
            ),
            Err(e) => debug!("{} -> error: {}", expression, e),
        }
    }
    tally(passed, CORE_OPERATIONS.len())
}

fn tally(passed: usize, total: usize) -> CheckStatus {
    if passed == total {
        CheckStatus::pass_with(format!("{}/{}", passed, total))
    } else if passed > 0 {
        CheckStatus::Partial
    } else {
        CheckStatus::Fail(None)
    }
}
