use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How an expression is handed to a one-shot engine process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationMode {
    /// `<executable> "<expression>"`
    Argument,
    /// Expression written to stdin, followed by `exit`.
    Piped,
}

/// How a single engine process ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded { code: i32 },
    /// Non-zero exit; the engine rejected the input but stayed in control.
    Failed { code: i32 },
    /// Terminated by a signal (or, off Unix, without an exit code).
    Crashed { signal: Option<i32> },
    TimedOut {
        #[serde(with = "duration_secs_f64")]
        after: Duration,
    },
}

impl Outcome {
    pub fn from_status(status: std::process::ExitStatus) -> Self {
        match status.code() {
            Some(0) => Outcome::Succeeded { code: 0 },
            Some(code) => Outcome::Failed { code },
            None => Outcome::Crashed {
                signal: signal_of(&status),
            },
        }
    }

    /// Return code in the POSIX convention: negative signal number on a crash.
    pub fn return_code(&self) -> Option<i32> {
        match self {
            Outcome::Succeeded { code } | Outcome::Failed { code } => Some(*code),
            Outcome::Crashed { signal } => signal.map(|s| -s),
            Outcome::TimedOut { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded { .. })
    }

    pub fn is_crash(&self) -> bool {
        matches!(self, Outcome::Crashed { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Outcome::TimedOut { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Succeeded { .. } => "succeeded",
            Outcome::Failed { .. } => "failed",
            Outcome::Crashed { .. } => "crashed",
            Outcome::TimedOut { .. } => "timed out",
        }
    }
}

#[cfg(unix)]
fn signal_of(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn signal_of(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

/// Captured result of one engine process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    pub args: Vec<String>,
    pub stdout: String,
    pub stderr: String,
    pub outcome: Outcome,
    #[serde(with = "duration_secs_f64")]
    pub elapsed: Duration,
}

impl Invocation {
    pub fn contains(&self, needle: &str) -> bool {
        self.stdout.contains(needle)
    }

    /// The last non-empty stdout line that is not banner noise.
    pub fn answer(&self, is_noise: impl Fn(&str) -> bool) -> Option<String> {
        last_meaningful_line(&self.stdout, is_noise)
    }

    pub fn stderr_summary(&self) -> String {
        let trimmed = self.stderr.trim();
        if trimmed.is_empty() {
            "Execution failed".to_string()
        } else {
            trimmed.to_string()
        }
    }
}

pub fn last_meaningful_line(text: &str, is_noise: impl Fn(&str) -> bool) -> Option<String> {
    text.lines()
        .map(str::trim)
        .rev()
        .find(|line| !line.is_empty() && !is_noise(line))
        .map(str::to_string)
}

/// Where a displayed answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalSource {
    Engine,
    Daemon,
    /// Simple arithmetic short-circuited to the local evaluator.
    FastLocal,
    /// Engine unavailable; local evaluator used.
    Fallback,
    /// Engine tried and failed; local evaluator rescued the command.
    AutoFallback,
}

/// Latency class shown next to engine answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedTier {
    Senna,
    F1,
    Standard,
}

impl SpeedTier {
    pub fn classify(elapsed: Duration) -> Self {
        let ms = elapsed.as_secs_f64() * 1000.0;
        if ms < 100.0 {
            SpeedTier::Senna
        } else if ms < 200.0 {
            SpeedTier::F1
        } else {
            SpeedTier::Standard
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub expression: String,
    pub answer: String,
    #[serde(with = "duration_secs_f64")]
    pub elapsed: Duration,
    pub source: EvalSource,
}

impl Evaluation {
    pub fn speed_tier(&self) -> SpeedTier {
        SpeedTier::classify(self.elapsed)
    }

    pub fn elapsed_ms(&self) -> f64 {
        (self.elapsed.as_secs_f64() * 10_000.0).round() / 10.0
    }
}

mod duration_secs_f64 {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(stdout: &str) -> Invocation {
        Invocation {
            args: vec!["2+2".to_string()],
            stdout: stdout.to_string(),
            stderr: String::new(),
            outcome: Outcome::Succeeded { code: 0 },
            elapsed: Duration::from_millis(12),
        }
    }

    #[test]
    fn test_return_code_convention() {
        assert_eq!(Outcome::Succeeded { code: 0 }.return_code(), Some(0));
        assert_eq!(Outcome::Failed { code: 2 }.return_code(), Some(2));
        assert_eq!(Outcome::Crashed { signal: Some(11) }.return_code(), Some(-11));
        assert_eq!(
            Outcome::TimedOut {
                after: Duration::from_secs(5)
            }
            .return_code(),
            None
        );
    }

    #[test]
    fn test_outcome_predicates() {
        assert!(Outcome::Crashed { signal: None }.is_crash());
        assert!(!Outcome::Failed { code: 1 }.is_crash());
        assert!(Outcome::Succeeded { code: 0 }.is_success());
        assert_eq!(Outcome::Failed { code: 1 }.label(), "failed");
    }

    #[cfg(unix)]
    #[test]
    fn test_outcome_from_signal_status() {
        use std::os::unix::process::ExitStatusExt;
        let status = std::process::ExitStatus::from_raw(11);
        assert_eq!(
            Outcome::from_status(status),
            Outcome::Crashed { signal: Some(11) }
        );

        let status = std::process::ExitStatus::from_raw(3 << 8);
        assert_eq!(Outcome::from_status(status), Outcome::Failed { code: 3 });
    }

    #[test]
    fn test_answer_skips_noise() {
        let inv = invocation("NumPy loaded successfully\n\n  4  \nSymPy loaded successfully\n");
        assert_eq!(inv.answer(|l| l.contains("loaded")), Some("4".to_string()));
        assert!(invocation("   \n").answer(|_| false).is_none());
    }

    #[test]
    fn test_speed_tier() {
        assert_eq!(SpeedTier::classify(Duration::from_millis(40)), SpeedTier::Senna);
        assert_eq!(SpeedTier::classify(Duration::from_millis(150)), SpeedTier::F1);
        assert_eq!(SpeedTier::classify(Duration::from_millis(900)), SpeedTier::Standard);
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_string(&Outcome::Crashed { signal: Some(6) }).unwrap();
        assert!(json.contains("\"kind\":\"crashed\""));
        let back: Outcome = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Outcome::Crashed { signal: Some(6) });
    }
}
