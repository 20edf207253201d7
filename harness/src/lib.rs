pub mod config;
pub mod error;
pub mod fallback;
pub mod memory;
pub mod session;
pub mod shell;
pub mod speed;
pub mod suite;
pub mod telemetry;

pub use config::{HarnessConfig, ENGINE_ENV_VAR};
pub use error::{HarnessError, HarnessResult};
pub use fallback::{is_simple_arithmetic, Binding, EvalError, EvalResult, Evaluator, Value};
pub use memory::{resident_set_bytes, MemorySampler};
pub use session::{CalculatorSession, CommandResult, HistoryEntry, Mode};
pub use shell::{run_shell, ShellReply, ShellWorker};
pub use speed::{run_speed_test, Rating, SpeedReport};
pub use suite::{CheckStatus, QaReport, QaSuite, Section, Verdict};
pub use telemetry::{TelemetryConfig, TelemetryError};
