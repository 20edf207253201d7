//! Malformed and oversized input; the engine may reject or time out but never crash.

use super::{engine_failure, CheckStatus, MISSING_EXECUTABLE};
use engine::{Outcome, ProcessEngine};
use std::time::Duration;
use tracing::{info, warn};

const FUZZ_TIMEOUT: Duration = Duration::from_secs(5);
const OVERFLOW_TIMEOUT: Duration = Duration::from_secs(10);

/// Fixed adversarial inputs, passed verbatim as the expression argument.
pub fn malformed_inputs() -> Vec<String> {
    vec![
        "hgfdjhgf".to_string(),
        "1/0".to_string(),
        "sqrt(-1)".to_string(),
        "integrate(x, [[1,2]".to_string(),
        ")".repeat(1000),
        "x".repeat(10000),
        "\\x00\\x01\\x02".to_string(),
        "../../../etc/passwd".to_string(),
        "; rm -rf /".to_string(),
        "' OR '1'='1".to_string(),
    ]
}

/// `1+2+2+...+3` with ten thousand middle terms.
pub fn overflow_input() -> String {
    format!("1+{}3", "2+".repeat(10000))
}

pub async fn run(engine: Option<&ProcessEngine>) -> Vec<(&'static str, CheckStatus)> {
    let Some(engine) = engine else {
        return vec![
            ("fuzzing", CheckStatus::fail(MISSING_EXECUTABLE)),
            ("buffer_overflow", CheckStatus::fail(MISSING_EXECUTABLE)),
        ];
    };

    vec![
        ("fuzzing", fuzzing(engine).await),
        ("buffer_overflow", buffer_overflow(engine).await),
    ]
}

fn preview(input: &str) -> String {
    input.chars().take(20).collect()
}

pub async fn fuzzing(engine: &ProcessEngine) -> CheckStatus {
    let mut crashes = 0usize;
    for input in malformed_inputs() {
        match engine.run(&[input.as_str()], FUZZ_TIMEOUT).await {
            Ok(invocation) => match invocation.outcome {
                Outcome::Crashed { signal } => {
                    crashes += 1;
                    warn!("Crash with input '{}...' (signal {:?})", preview(&input), signal);
                }
                Outcome::TimedOut { .. } => {
                    info!("Timeout on '{}...' (acceptable)", preview(&input));
                }
                outcome => {
                    info!(
                        "Handled '{}...' -> {:?}",
                        preview(&input),
                        outcome.return_code()
                    );
                }
            },
            Err(e) => warn!("Error running '{}...': {}", preview(&input), e),
        }
    }

    if crashes == 0 {
        CheckStatus::pass()
    } else {
        CheckStatus::fail(format!("{} crashes", crashes))
    }
}

pub async fn buffer_overflow(engine: &ProcessEngine) -> CheckStatus {
    let input = overflow_input();
    match engine.run(&[input.as_str()], OVERFLOW_TIMEOUT).await {
        Ok(invocation) => match invocation.outcome {
            Outcome::Crashed { .. } => CheckStatus::fail("Crash"),
            Outcome::TimedOut { .. } => CheckStatus::pass_with("Timeout"),
            _ => CheckStatus::pass(),
        },
        Err(e) => engine_failure(&e),
    }
}
