//! Telemetry for spindle: turning raw tool output into typed events.
//!
//! Two pieces live here. The [`parse`] module holds one stateless line parser
//! per tool; [`tailer`] incrementally reads the append-only log a running tool
//! writes to. Neither raises errors across the orchestration boundary: parsers
//! return empty event lists and the tailer treats read failures as "no lines".

pub mod parse;
pub mod tailer;

pub use parse::{parse_text, parser_for, split_lines, LineParser};
pub use tailer::{tail_until, LogTailer};

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("log is already being tailed: {}", .0.display())]
    AlreadyTailed(PathBuf),
    #[error("tailer registry unavailable: {0}")]
    Registry(String),
}
