//! Execution layer for spindle pipelines.
//!
//! A pipeline never spawns tools itself. It hands a `ToolInvocation` to a
//! `ToolExecutor`, which writes the tool's combined output to the invocation's
//! log file and reports the exit code. `ProcessExecutor` runs real programs;
//! `ScriptedExecutor` replays recorded output for tests and dry runs. Both
//! observe a `CancelToken` and only return once the tool has stopped.

pub mod cancel;
pub mod executor;
pub mod prereq;
pub mod process;
pub mod scripted;

pub use cancel::{CancelReason, CancelToken};
pub use executor::{select_executor, ExecOutcome, ExecutorSettings, ToolExecutor, ToolInvocation};
pub use prereq::{check_tool_prereqs, format_missing, MissingPrereq};
pub use process::ProcessExecutor;
pub use scripted::{ScriptedExecutor, ToolScript};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("executor '{0}' is not available")]
    UnknownExecutor(String),
    #[error("invalid tool script: {0}")]
    Script(String),
    #[error("tool execution failed: {0}")]
    ExecFailed(String),
}
