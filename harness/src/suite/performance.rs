//! Latency, throughput, concurrency and memory stability.

use super::{engine_failure, CheckStatus, MISSING_EXECUTABLE};
use crate::config::HarnessConfig;
use crate::memory::{mebibytes, MemorySampler};
use engine::ProcessEngine;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, info};

pub const PING_EXPRESSION: &str = "1+1";
pub const PING_TIMEOUT: Duration = Duration::from_secs(1);
pub const FLOOD_COMMAND: &str = "linear";
pub const FLOOD_ROUNDS: usize = 10;
pub const FLOOD_TIMEOUT: Duration = Duration::from_secs(5);
pub const FLOOD_GROWTH_LIMIT: i64 = 100 * 1024 * 1024;
pub const STABILITY_GROWTH_LIMIT: i64 = 16 * 1024 * 1024;

pub async fn run(
    config: &HarnessConfig,
    engine: Option<&ProcessEngine>,
) -> Vec<(&'static str, CheckStatus)> {
    let Some(engine) = engine else {
        return ["latency", "throughput", "concurrency", "memory_stability"]
            .into_iter()
            .map(|name| (name, CheckStatus::fail(MISSING_EXECUTABLE)))
            .collect();
    };

    vec![
        ("latency", latency(engine, config.latency_iterations).await),
        ("throughput", throughput(engine).await),
        ("concurrency", concurrency(engine, config.concurrency).await),
        (
            "memory_stability",
            memory_stability(engine, config.memory_iterations).await,
        ),
    ]
}

/// Sequential `1+1` invocations; every one must answer `2`.
pub async fn latency(engine: &ProcessEngine, iterations: usize) -> CheckStatus {
    let start = Instant::now();
    for i in 0..iterations {
        match engine.run(&[PING_EXPRESSION], PING_TIMEOUT).await {
            Ok(invocation) if invocation.outcome.is_success() && invocation.contains("2") => {}
            Ok(invocation) => {
                debug!("Calculation {} failed: {}", i, invocation.stderr_summary());
                return CheckStatus::fail(format!("Calc {}", i));
            }
            Err(e) => return engine_failure(&e),
        }
    }

    let avg_ms = start.elapsed().as_secs_f64() * 1000.0 / iterations.max(1) as f64;
    info!("Latency: {:.2}ms average over {} calls", avg_ms, iterations);
    classify_latency(avg_ms)
}

pub fn classify_latency(avg_ms: f64) -> CheckStatus {
    if avg_ms < 10.0 {
        CheckStatus::pass_with("SENNA SPEED")
    } else if avg_ms < 100.0 {
        CheckStatus::pass_with("F1 SPEED")
    } else {
        CheckStatus::fail("Too slow")
    }
}

/// Repeated mode-switch commands while watching the harness' own memory.
pub async fn throughput(engine: &ProcessEngine) -> CheckStatus {
    let sampler = MemorySampler::start();
    let start = Instant::now();
    for _ in 0..FLOOD_ROUNDS {
        if let Err(e) = engine.run(&[FLOOD_COMMAND], FLOOD_TIMEOUT).await {
            return engine_failure(&e);
        }
    }
    debug!("Throughput: {} rounds in {:?}", FLOOD_ROUNDS, start.elapsed());

    match sampler.growth() {
        None => CheckStatus::warn("Memory sampling unavailable"),
        Some(growth) if growth < FLOOD_GROWTH_LIMIT => {
            info!("Throughput memory growth: {:.2} MiB", mebibytes(growth));
            CheckStatus::pass()
        }
        Some(_) => CheckStatus::warn("Memory growth"),
    }
}

/// `workers` simultaneous `1+1` invocations; all must succeed.
pub async fn concurrency(engine: &ProcessEngine, workers: usize) -> CheckStatus {
    let mut tasks = JoinSet::new();
    for _ in 0..workers {
        let engine = engine.clone();
        tasks.spawn(async move { engine.run(&[PING_EXPRESSION], FLOOD_TIMEOUT).await });
    }

    let mut failures = 0usize;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(invocation)) if invocation.outcome.is_success() && invocation.contains("2") => {}
            Ok(Ok(invocation)) => {
                debug!("Concurrent call {}", invocation.outcome.label());
                failures += 1;
            }
            Ok(Err(e)) => {
                debug!("Concurrent call failed: {}", e);
                failures += 1;
            }
            Err(e) => {
                debug!("Concurrent task panicked: {}", e);
                failures += 1;
            }
        }
    }

    if failures == 0 {
        CheckStatus::pass_with(format!("{} concurrent calls", workers))
    } else {
        CheckStatus::fail(format!("{}/{} concurrent calls failed", failures, workers))
    }
}

/// Resident memory of the harness must stay flat across many invocations.
pub async fn memory_stability(engine: &ProcessEngine, iterations: usize) -> CheckStatus {
    let sampler = MemorySampler::start();
    for _ in 0..iterations {
        if let Err(e) = engine.run(&[PING_EXPRESSION], PING_TIMEOUT).await {
            return engine_failure(&e);
        }
    }

    match sampler.growth() {
        None => CheckStatus::warn("Memory sampling unavailable"),
        Some(growth) if growth < STABILITY_GROWTH_LIMIT => CheckStatus::pass(),
        Some(growth) => CheckStatus::fail(format!("Grew {:.1} MiB", mebibytes(growth))),
    }
}
