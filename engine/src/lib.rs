//! Client side of the AXIOM engine contract.
//!
//! The engine itself is an external executable. This crate finds it, runs it
//! once per expression or as a `--daemon` session, and classifies how each
//! process ended.

pub mod config;
pub mod daemon;
pub mod locate;
pub mod process;
pub mod provider;
pub mod types;

pub use config::{EngineConfig, DEFAULT_CANDIDATES, DEFAULT_IDENTITY, DEFAULT_SENTINEL};
pub use daemon::{DaemonResponse, DaemonSession, DaemonStats, SharedDaemon};
pub use locate::{locate, stray_executables};
pub use process::ProcessEngine;
pub use provider::{Engine, EngineError, EngineResult};
pub use types::{
    last_meaningful_line, EvalSource, Evaluation, Invocation, InvocationMode, Outcome, SpeedTier,
};

pub mod prelude {
    pub use crate::config::*;
    pub use crate::daemon::*;
    pub use crate::locate::*;
    pub use crate::process::*;
    pub use crate::provider::*;
    pub use crate::types::*;
}
