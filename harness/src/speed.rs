//! Per-operation latency benchmark against the one-shot engine.

use engine::{Outcome, ProcessEngine};
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub const BENCH_EXPRESSIONS: &[&str] = &[
    "12+21", "2*3", "15/3", "10-5", "2^8", "sqrt(16)", "sin(0)", "100*100",
];
pub const BENCH_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Senna,
    F1,
    Racing,
    Slow,
}

impl Rating {
    /// Tier of a single operation.
    pub fn for_operation(ms: f64) -> Self {
        if ms < 50.0 {
            Rating::Senna
        } else if ms < 100.0 {
            Rating::F1
        } else if ms < 200.0 {
            Rating::Racing
        } else {
            Rating::Slow
        }
    }

    /// Overall rating; speed only counts with enough successful operations.
    pub fn overall(avg_ms: f64, success_rate: f64) -> Self {
        if avg_ms < 50.0 && success_rate > 80.0 {
            Rating::Senna
        } else if avg_ms < 100.0 && success_rate > 70.0 {
            Rating::F1
        } else if avg_ms < 200.0 && success_rate > 50.0 {
            Rating::Racing
        } else {
            Rating::Slow
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Rating::Senna => "SENNA SPEED",
            Rating::F1 => "F1 SPEED",
            Rating::Racing => "Racing",
            Rating::Slow => "Slow",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationResult {
    pub expression: String,
    /// Answer on success, error text otherwise
    pub output: String,
    pub elapsed_ms: f64,
    pub success: bool,
    pub rating: Rating,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpeedReport {
    pub operations: Vec<OperationResult>,
    pub successful: usize,
    pub success_rate: f64,
    pub avg_ms: f64,
    pub total_ms: f64,
    pub rating: Rating,
}

impl SpeedReport {
    /// Failures and timeouts count towards the average like any other operation.
    pub fn from_operations(operations: Vec<OperationResult>) -> Self {
        let count = operations.len().max(1) as f64;
        let successful = operations.iter().filter(|o| o.success).count();
        let total_ms: f64 = operations.iter().map(|o| o.elapsed_ms).sum();
        let avg_ms = total_ms / count;
        let success_rate = successful as f64 / count * 100.0;
        Self {
            rating: Rating::overall(avg_ms, success_rate),
            operations,
            successful,
            success_rate,
            avg_ms,
            total_ms,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, op) in self.operations.iter().enumerate() {
            let mark = if op.success { "✓" } else { "✗" };
            out.push_str(&format!(
                "{} Test {}/{}: {:<10} -> {:<12} ({:.1}ms) {}\n",
                mark,
                i + 1,
                self.operations.len(),
                op.expression,
                op.output,
                op.elapsed_ms,
                op.rating
            ));
        }
        out.push_str(&format!(
            "\nSuccessful operations: {}/{} ({:.1}%)\nAverage execution time: {:.1}ms\nTotal test time: {:.1}ms\nRESULT: {}\n",
            self.successful,
            self.operations.len(),
            self.success_rate,
            self.avg_ms,
            self.total_ms,
            self.rating
        ));
        out
    }
}

fn millis(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}

pub async fn run_speed_test(engine: &ProcessEngine) -> SpeedReport {
    let mut operations = Vec::with_capacity(BENCH_EXPRESSIONS.len());

    for &expression in BENCH_EXPRESSIONS {
        let start = Instant::now();
        let (output, success) = match engine.run(&[expression], BENCH_TIMEOUT).await {
            Ok(invocation) => match &invocation.outcome {
                Outcome::Succeeded { .. } => {
                    match invocation.answer(|line| engine.config().is_noise(line)) {
                        Some(answer) => (answer, true),
                        None => ("No result".to_string(), false),
                    }
                }
                Outcome::TimedOut { .. } => ("TIMEOUT".to_string(), false),
                Outcome::Crashed { .. } => ("CRASHED".to_string(), false),
                Outcome::Failed { .. } => (format!("Error: {}", invocation.stderr_summary()), false),
            },
            Err(e) => (format!("Exception: {}", e), false),
        };
        let elapsed_ms = millis(start.elapsed());
        debug!("{} -> {} ({:.1}ms)", expression, output, elapsed_ms);

        operations.push(OperationResult {
            expression: expression.to_string(),
            output,
            elapsed_ms,
            success,
            rating: Rating::for_operation(elapsed_ms),
        });
    }

    let report = SpeedReport::from_operations(operations);
    info!(
        "Speed test: {}/{} ok, {:.1}ms average, {}",
        report.successful,
        report.operations.len(),
        report.avg_ms,
        report.rating
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(elapsed_ms: f64, success: bool) -> OperationResult {
        OperationResult {
            expression: "1+1".to_string(),
            output: "2".to_string(),
            elapsed_ms,
            success,
            rating: Rating::for_operation(elapsed_ms),
        }
    }

    #[test]
    fn test_operation_tiers() {
        assert_eq!(Rating::for_operation(49.9), Rating::Senna);
        assert_eq!(Rating::for_operation(50.0), Rating::F1);
        assert_eq!(Rating::for_operation(150.0), Rating::Racing);
        assert_eq!(Rating::for_operation(200.0), Rating::Slow);
    }

    #[test]
    fn test_overall_rating_requires_success() {
        assert_eq!(Rating::overall(10.0, 100.0), Rating::Senna);
        assert_eq!(Rating::overall(10.0, 75.0), Rating::F1);
        assert_eq!(Rating::overall(10.0, 60.0), Rating::Racing);
        assert_eq!(Rating::overall(10.0, 50.0), Rating::Slow);
        assert_eq!(Rating::overall(150.0, 100.0), Rating::Racing);
    }

    #[test]
    fn test_report_aggregation() {
        let report = SpeedReport::from_operations(vec![
            op(20.0, true),
            op(40.0, true),
            op(30.0, true),
            op(500.0, false),
        ]);
        assert_eq!(report.successful, 3);
        assert_eq!(report.success_rate, 75.0);
        assert_eq!(report.total_ms, 590.0);
        assert_eq!(report.avg_ms, 147.5);
        assert_eq!(report.rating, Rating::Racing);
        assert!(report.render().contains("RESULT: Racing"));
    }
}
