use builder::{BuildSpec, CmakeBuilder, Generator};
use clap::{Parser, Subcommand};
use engine::prelude::*;
use harness::{
    run_shell, run_speed_test, telemetry, CalculatorSession, CommandResult, HarnessConfig,
    QaSuite, TelemetryConfig, Verdict,
};
use std::path::{Path, PathBuf};
use tokio::io::BufReader;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "harness")]
#[command(about = "QA harness, benchmark and calculator shell for the AXIOM engine")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Debug logging (RUST_LOG still wins)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full QA & stress suite and write the JSON report
    Qa {
        /// Report path (overrides the config file)
        #[arg(short, long)]
        report: Option<PathBuf>,
    },
    /// Benchmark per-operation latency
    Speed {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Evaluate a single expression
    Eval {
        expression: String,
        /// Use only the local evaluator
        #[arg(long)]
        local: bool,
        /// Feed the expression on stdin instead of as an argument
        #[arg(long, conflicts_with = "local")]
        piped: bool,
    },
    /// Interactive calculator
    Shell {
        /// Keep one engine daemon running instead of one process per line
        #[arg(long)]
        daemon: bool,
        /// Never start the engine
        #[arg(long, conflicts_with = "daemon")]
        local: bool,
        /// Save history here on exit
        #[arg(long)]
        history: Option<PathBuf>,
    },
    /// Send expressions through a daemon session
    Daemon {
        #[arg(default_value = "2+2")]
        expressions: Vec<String>,
    },
    /// Print the engine executable that would be used
    Locate,
    /// Build the engine from source with CMake
    Build {
        /// Directory containing CMakeLists.txt
        #[arg(short, long, default_value = ".")]
        source: PathBuf,
        #[arg(short, long, default_value = "build")]
        build_dir: PathBuf,
        /// Generate with Ninja
        #[arg(long)]
        ninja: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    telemetry::init(&TelemetryConfig::from_verbosity(cli.verbose))?;

    let config = HarnessConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Qa { report } => {
            let config = match report {
                Some(path) => config.with_report_path(path),
                None => config,
            };
            run_qa(config).await?;
        }
        Commands::Speed { json } => {
            run_speed(config, json).await?;
        }
        Commands::Eval {
            expression,
            local,
            piped,
        } => {
            evaluate(config, &expression, local, piped).await?;
        }
        Commands::Shell {
            daemon,
            local,
            history,
        } => {
            shell(config, daemon, local, history.as_deref()).await?;
        }
        Commands::Daemon { expressions } => {
            daemon(config, &expressions).await?;
        }
        Commands::Locate => {
            locate_engine(&config);
        }
        Commands::Build {
            source,
            build_dir,
            ninja,
        } => {
            build(source, build_dir, ninja).await?;
        }
    }

    Ok(())
}

async fn run_qa(config: HarnessConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("AXIOM ENGINE - QA & STRESS TEST SUITE");
    let suite = QaSuite::new(config);
    let report = suite.run_and_save().await?;

    print!("{}", report.render());
    println!(
        "\nDetailed results saved to: {}",
        suite.config().report_path.display()
    );
    if report.overall_status == Verdict::Failure {
        warn!("QA verdict: {}", report.overall_status);
    }
    Ok(())
}

async fn run_speed(config: HarnessConfig, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let engine = ProcessEngine::discover(config.engine)?;
    println!("Found engine: {}", engine.path().display());

    let report = run_speed_test(&engine).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render());
    }
    Ok(())
}

/// Engine if one can be found; otherwise `None` with a warning.
fn optional_engine(config: &HarnessConfig) -> Option<ProcessEngine> {
    match ProcessEngine::discover(config.engine.clone()) {
        Ok(engine) => {
            info!("Using engine {}", engine.path().display());
            Some(engine)
        }
        Err(e) => {
            warn!("{}; falling back to the local evaluator", e);
            None
        }
    }
}

async fn evaluate(
    config: HarnessConfig,
    expression: &str,
    local: bool,
    piped: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if piped {
        let engine = ProcessEngine::discover(config.engine)?;
        let invocation = engine
            .invoke_mode(expression, InvocationMode::Piped)
            .await?;
        let is_noise = |line: &str| engine.config().is_noise(line);
        match invocation.answer(is_noise) {
            Some(answer) if invocation.outcome.is_success() => println!("{}", answer),
            _ => {
                return Err(format!(
                    "engine {}: {}",
                    invocation.outcome.label(),
                    invocation.stderr_summary()
                )
                .into())
            }
        }
        return Ok(());
    }

    let engine = if local { None } else { optional_engine(&config) };
    let mut session = CalculatorSession::new(engine);
    match session.execute(expression).await {
        CommandResult::Failed(message) => Err(message.into()),
        result => {
            println!("{}", result);
            Ok(())
        }
    }
}

async fn shell(
    config: HarnessConfig,
    daemon: bool,
    local: bool,
    history: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let input = BufReader::new(tokio::io::stdin());
    let output = tokio::io::stdout();
    let history_path = history
        .map(Path::to_path_buf)
        .or_else(|| config.history_path.clone());

    if daemon {
        let path = locate(&config.engine)?;
        let engine = SharedDaemon::start(path, config.engine.clone()).await?;
        let session = run_shell(CalculatorSession::new(Some(engine)), input, output).await?;
        if let Some(path) = &history_path {
            session.save_history(path)?;
        }
        if let Some(engine) = session.into_engine() {
            let stats = engine.stats().await;
            info!(
                "Daemon served {} requests, {:.1}ms average",
                stats.total_requests,
                stats.avg_response_ms()
            );
            engine.shutdown().await?;
        }
        return Ok(());
    }

    let engine = if local { None } else { optional_engine(&config) };
    let session = run_shell(CalculatorSession::new(engine), input, output).await?;
    if let Some(path) = &history_path {
        session.save_history(path)?;
    }
    Ok(())
}

async fn daemon(
    config: HarnessConfig,
    expressions: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let path = locate(&config.engine)?;
    println!("Starting daemon: {} {}", path.display(), config.engine.daemon_flag);
    let mut session = DaemonSession::start(&path, config.engine.clone()).await?;

    for expression in expressions {
        match session.request(expression).await {
            Ok(response) => println!(
                "{} -> {} ({:.1}ms)",
                expression,
                response.answer.as_deref().unwrap_or("(no output)"),
                response.elapsed.as_secs_f64() * 1000.0
            ),
            Err(e) => {
                error!("{} -> {}", expression, e);
                println!("{} -> Error: {}", expression, e);
            }
        }
    }

    let stats = session.stats().clone();
    session.shutdown().await?;
    println!(
        "Daemon handled {} requests, {:.1}ms average",
        stats.total_requests,
        stats.avg_response_ms()
    );
    Ok(())
}

fn locate_engine(config: &HarnessConfig) {
    match locate(&config.engine) {
        Ok(path) => println!("✓ {}", path.display()),
        Err(EngineError::NotFound { searched, strays }) => {
            println!("✗ AXIOM executable not found. Searched:");
            for path in searched {
                println!("  - {}", path.display());
            }
            if !strays.is_empty() {
                println!("Executables elsewhere in the tree:");
                for path in strays {
                    println!("  - {}", path.display());
                }
            }
        }
        Err(e) => println!("✗ {}", e),
    }
}

async fn build(
    source: PathBuf,
    build_dir: PathBuf,
    ninja: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let generator = if ninja {
        Generator::Ninja
    } else {
        Generator::Default
    };
    let spec = BuildSpec::new(source)
        .with_build_dir(build_dir)
        .with_generator(generator);

    println!("Building AXIOM engine in {}", spec.resolved_build_dir().display());
    let output = CmakeBuilder::new().build(&spec).await?;

    for step in &output.steps {
        println!("✓ {} ({:.1}s)", step.step, step.elapsed.as_secs_f64());
        if !step.stdout_tail.is_empty() {
            println!("{}", step.stdout_tail);
        }
    }
    match output.executable {
        Some(path) => println!("Engine executable: {}", path.display()),
        None => println!("Build finished but no engine executable was found"),
    }
    Ok(())
}
