//! Pipeline orchestration for spindle.
//!
//! This crate ties together the request catalogue, output parsers, log tailer
//! and tool executors into the `Engine`: the API that runs a burn, copy, read,
//! erase or extract as a sequence of stages, turns tool output into progress
//! snapshots, and guarantees that every run ends in exactly one terminal phase
//! with its temp directory, log file and device locks released.

pub mod concurrency;
pub mod config;
pub mod engine;
pub mod lifecycle;
pub mod plan;
pub mod workspace;

pub use concurrency::{clear_active_run, install_signal_handler, set_active_run, DeviceLock};
pub use config::{default_config_path, ConfigError, EngineConfig, ExecutorKind, ToolPrograms};
pub use engine::{Engine, RunHandle};
pub use lifecycle::{validate_transition, RunState};
pub use plan::{preflight, programs_for, tools_for, Preflight, Stage, StageWork};
pub use workspace::RunWorkspace;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("request error: {0}")]
    Request(#[from] spindle_schema::RequestError),
    #[error("runtime error: {0}")]
    Runtime(#[from] spindle_runtime::RuntimeError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] spindle_telemetry::TelemetryError),
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
