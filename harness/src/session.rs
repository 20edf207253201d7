//! Calculator shell logic: command dispatch between the engine and the local evaluator.

use crate::error::HarnessResult;
use crate::fallback::{self, EvalError, Evaluator};
use chrono::{DateTime, Local};
use engine::{Engine, EvalSource, Evaluation, SpeedTier};
use std::fmt;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Algebraic,
    Linear,
    Stats,
    Symbolic,
    Plot,
    Units,
}

impl Mode {
    pub const ALL: [Mode; 6] = [
        Mode::Algebraic,
        Mode::Linear,
        Mode::Stats,
        Mode::Symbolic,
        Mode::Plot,
        Mode::Units,
    ];

    pub fn keyword(&self) -> &'static str {
        match self {
            Mode::Algebraic => "algebraic",
            Mode::Linear => "linear",
            Mode::Stats => "stats",
            Mode::Symbolic => "symbolic",
            Mode::Plot => "plot",
            Mode::Units => "units",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Mode::Algebraic => "ALGEBRAIC",
            Mode::Linear => "LINEAR SYSTEM",
            Mode::Stats => "STATISTICS",
            Mode::Symbolic => "SYMBOLIC",
            Mode::Plot => "PLOTTING",
            Mode::Units => "UNITS",
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Mode::ALL
            .into_iter()
            .find(|m| m.keyword() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Mode::ALL.iter().map(|m| m.keyword()).collect();
                format!("Unknown mode '{}'. Available: {}", s.trim(), known.join(", "))
            })
    }
}

/// What one line of input produced
#[derive(Debug, Clone)]
pub enum CommandResult {
    Evaluated(Evaluation),
    Message(String),
    Failed(String),
}

impl CommandResult {
    pub fn is_success(&self) -> bool {
        !matches!(self, CommandResult::Failed(_))
    }

    pub fn source(&self) -> Option<EvalSource> {
        match self {
            CommandResult::Evaluated(evaluation) => Some(evaluation.source),
            _ => None,
        }
    }

    /// Display line with the origin and latency annotation.
    pub fn render(&self) -> String {
        match self {
            CommandResult::Evaluated(e) => match e.source {
                EvalSource::Engine | EvalSource::Daemon => match e.speed_tier() {
                    SpeedTier::Senna => format!("{} (SENNA SPEED: {}ms)", e.answer, e.elapsed_ms()),
                    SpeedTier::F1 => format!("{} (F1 SPEED: {}ms)", e.answer, e.elapsed_ms()),
                    SpeedTier::Standard => format!("{} (engine: {}ms)", e.answer, e.elapsed_ms()),
                },
                EvalSource::FastLocal => format!("{} (fast local)", e.answer),
                EvalSource::Fallback => format!("{} (local fallback)", e.answer),
                EvalSource::AutoFallback => format!("{} (engine failed, local fallback)", e.answer),
            },
            CommandResult::Message(text) => text.clone(),
            CommandResult::Failed(error) => format!("Error: {}", error),
        }
    }
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Local>,
    pub text: String,
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp.format("%H:%M:%S"), self.text)
    }
}

/// Oldest entries are dropped once a session holds this many.
pub const HISTORY_LIMIT: usize = 1000;

pub struct CalculatorSession<E: Engine> {
    engine: Option<E>,
    evaluator: Evaluator,
    mode: Mode,
    history: Vec<HistoryEntry>,
}

impl<E: Engine> CalculatorSession<E> {
    /// `None` runs every command through the local evaluator.
    pub fn new(engine: Option<E>) -> Self {
        Self {
            engine,
            evaluator: Evaluator::new(),
            mode: Mode::Algebraic,
            history: Vec::new(),
        }
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    pub fn engine(&self) -> Option<&E> {
        self.engine.as_ref()
    }

    /// Give the engine back, e.g. to shut a daemon down.
    pub fn into_engine(self) -> Option<E> {
        self.engine
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Run one line. Never fails: problems come back as [`CommandResult::Failed`].
    pub async fn execute(&mut self, line: &str) -> CommandResult {
        let command = line.trim();
        if command.is_empty() {
            return CommandResult::Message(String::new());
        }

        if command.eq_ignore_ascii_case("history") {
            return self.list_history();
        }

        self.record(format!("> {}", command));
        let result = self.dispatch(command).await;
        // Listings (help, who) stay out of the history file.
        if !matches!(&result, CommandResult::Message(text) if text.contains('\n')) {
            self.record(result.render());
        }
        result
    }

    async fn dispatch(&mut self, command: &str) -> CommandResult {
        let lower = command.to_lowercase();

        if lower == "help" {
            return CommandResult::Message(help_text());
        }
        if let Some(mode) = lower.strip_prefix("mode ") {
            return self.switch_mode(mode);
        }
        if lower == "who" {
            return self.list_workspace();
        }
        if lower == "clear" {
            self.evaluator.clear();
            return CommandResult::Message("Workspace cleared".to_string());
        }

        if is_assignment(command) {
            return match self.evaluate_locally(command, EvalSource::FastLocal) {
                Ok(evaluation) => CommandResult::Evaluated(evaluation),
                Err(e) => CommandResult::Failed(e.to_string()),
            };
        }

        if fallback::is_simple_arithmetic(command) {
            match self.evaluate_locally(command, EvalSource::FastLocal) {
                Ok(evaluation) => return CommandResult::Evaluated(evaluation),
                Err(e) => debug!("Fast path declined '{}': {}", command, e),
            }
        }

        let Some(engine) = self.engine.as_ref() else {
            return match self.evaluate_locally(command, EvalSource::Fallback) {
                Ok(evaluation) => CommandResult::Evaluated(evaluation),
                Err(e) => CommandResult::Failed(e.to_string()),
            };
        };

        match engine.evaluate(command).await {
            Ok(evaluation) => CommandResult::Evaluated(evaluation),
            Err(engine_error) => {
                warn!("Engine failed on '{}': {}", command, engine_error);
                match self.evaluate_locally(command, EvalSource::AutoFallback) {
                    Ok(evaluation) => CommandResult::Evaluated(evaluation),
                    Err(_) => CommandResult::Failed(engine_error.to_string()),
                }
            }
        }
    }

    fn evaluate_locally(&mut self, command: &str, source: EvalSource) -> Result<Evaluation, EvalError> {
        let start = Instant::now();
        let binding = self.evaluator.evaluate(command)?;
        Ok(Evaluation {
            expression: command.to_string(),
            answer: binding.to_string(),
            elapsed: start.elapsed(),
            source,
        })
    }

    fn switch_mode(&mut self, name: &str) -> CommandResult {
        match name.parse::<Mode>() {
            Ok(mode) => {
                self.mode = mode;
                info!("Switched to {} mode", mode.label());
                CommandResult::Message(format!("Switched to {} mode", mode.label()))
            }
            Err(e) => CommandResult::Failed(e),
        }
    }

    fn list_workspace(&self) -> CommandResult {
        if self.evaluator.is_empty() {
            return CommandResult::Message("No variables defined".to_string());
        }
        let lines: Vec<String> = self
            .evaluator
            .variables()
            .map(|(name, value)| format!("  {} ({}) = {}", name, value.type_name(), value))
            .collect();
        CommandResult::Message(format!("Variables:\n{}", lines.join("\n")))
    }

    fn list_history(&self) -> CommandResult {
        if self.history.is_empty() {
            return CommandResult::Message("History is empty".to_string());
        }
        let lines: Vec<String> = self.history.iter().map(|e| e.to_string()).collect();
        CommandResult::Message(lines.join("\n"))
    }

    fn record(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        self.history.push(HistoryEntry {
            timestamp: Local::now(),
            text,
        });
        if self.history.len() > HISTORY_LIMIT {
            let excess = self.history.len() - HISTORY_LIMIT;
            self.history.drain(..excess);
        }
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Write history as `[HH:MM:SS] text` lines.
    pub fn save_history(&self, path: impl AsRef<Path>) -> HarnessResult<()> {
        let mut file = std::io::BufWriter::new(std::fs::File::create(path.as_ref())?);
        for entry in &self.history {
            writeln!(file, "{}", entry)?;
        }
        file.flush()?;
        info!(
            "Saved {} history entries to {}",
            self.history.len(),
            path.as_ref().display()
        );
        Ok(())
    }
}

/// `name = expr`, excluding `==`.
fn is_assignment(command: &str) -> bool {
    let Some((name, rest)) = command.split_once('=') else {
        return false;
    };
    let name = name.trim();
    !rest.starts_with('=')
        && name
            .chars()
            .next()
            .is_some_and(|c| c.is_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_alphanumeric() || c == '_')
}

pub fn help_text() -> String {
    let modes: Vec<&str> = Mode::ALL.iter().map(|m| m.keyword()).collect();
    format!(
        "Commands:\n\
         \x20 help              show this text\n\
         \x20 mode <name>       switch mode ({})\n\
         \x20 who               list workspace variables\n\
         \x20 clear             clear workspace variables\n\
         \x20 history           list this session's history\n\
         \x20 name = expr       assign a variable (evaluated locally)\n\
         \x20 quit | exit       leave the shell\n\
         Local functions: {}\n\
         Constants: pi, e. Matrices: [1 2; 3 4]",
        modes.join(", "),
        fallback::eval::FUNCTIONS.join(" ")
    )
}
