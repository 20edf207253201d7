//! Restricted local evaluator
//!
//! Used when the engine is unavailable, when it rejects an expression, and
//! for trivial arithmetic where spawning a process costs more than the
//! answer. Only the operators, constants and functions listed in [`eval`]
//! are reachable; there is no way to name anything else.

pub mod eval;
pub mod lexer;
pub mod parser;
pub mod value;

pub use value::{format_number, Matrix, Value};

use parser::Statement;
use regex::RegexSet;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors raised while evaluating an expression locally
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },
    #[error("name '{0}' is not defined")]
    UnknownName(String),
    #[error("function '{0}' is not available")]
    UnknownFunction(String),
    #[error("{function}() takes {expected} argument(s) ({got} given)")]
    Arity {
        function: String,
        expected: &'static str,
        got: usize,
    },
    #[error("division by zero")]
    DivisionByZero,
    #[error("{function}: {message}")]
    Domain { function: String, message: String },
    #[error("shape mismatch: {message}")]
    Shape { message: String },
    #[error("type error: {message}")]
    Type { message: String },
}

pub type EvalResult<T> = Result<T, EvalError>;

/// Name under which bare expressions store their result.
pub const ANSWER: &str = "ans";

/// Result of one evaluated line
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: String,
    pub value: Value,
    /// `name = expr` rather than a bare expression
    pub assigned: bool,
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.assigned {
            write!(f, "{} = {}", self.name, self.value)
        } else {
            write!(f, "{}", self.value)
        }
    }
}

/// Evaluator holding a workspace of named values
#[derive(Debug, Default, Clone)]
pub struct Evaluator {
    workspace: BTreeMap<String, Value>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate one line and record the result in the workspace.
    pub fn evaluate(&mut self, input: &str) -> EvalResult<Binding> {
        let tokens = lexer::tokenize(input)?;
        let binding = match parser::parse_statement(&tokens)? {
            Statement::Assign(name, expr) => Binding {
                value: eval::eval(&expr, &self.workspace)?,
                name,
                assigned: true,
            },
            Statement::Expr(expr) => Binding {
                value: eval::eval(&expr, &self.workspace)?,
                name: ANSWER.to_string(),
                assigned: false,
            },
        };
        self.workspace
            .insert(binding.name.clone(), binding.value.clone());
        Ok(binding)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.workspace.get(name)
    }

    /// Variables in name order.
    pub fn variables(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.workspace.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.workspace.is_empty()
    }

    pub fn clear(&mut self) {
        self.workspace.clear();
    }
}

/// Evaluate without a workspace.
pub fn evaluate(input: &str) -> EvalResult<Value> {
    Evaluator::new().evaluate(input).map(|b| b.value)
}

fn simple_patterns() -> &'static RegexSet {
    static PATTERNS: OnceLock<RegexSet> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        RegexSet::new([
            r"^\s*\d+\s*[+\-*/]\s*\d+\s*$",
            r"^\s*\(\s*\d+\s*[+\-*/]\s*\d+\s*\)\s*[+\-*/]\s*\d+\s*$",
            r"^\s*\d+\s*\*\*\s*\d+\s*$",
            r"^\s*\d+\s*[+\-*/]\s*\d+\s*[+\-*/]\s*\d+\s*$",
        ])
        .unwrap_or_else(|_| RegexSet::empty())
    })
}

/// Integer arithmetic cheap enough to answer without the engine.
pub fn is_simple_arithmetic(text: &str) -> bool {
    simple_patterns().is_match(text)
}
