use crate::phase::Phase;
use serde::{Deserialize, Serialize};

/// A typed fact extracted from one line of tool output.
///
/// Events are the only channel through which tool output reaches a
/// `ProgressSnapshot`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OutputEvent {
    PhaseChanged {
        phase: Phase,
    },
    /// `total == 0` means the line did not state a total.
    Progress {
        current: u64,
        total: u64,
    },
    BufferStats {
        fifo: u8,
        drive: Option<u8>,
    },
    TrackChanged {
        track: u32,
    },
    SpeedNegotiated {
        speed: f32,
        simulation: bool,
    },
    Warning {
        text: String,
    },
}

impl OutputEvent {
    pub fn phase(phase: Phase) -> Self {
        OutputEvent::PhaseChanged { phase }
    }

    pub fn progress(current: u64, total: u64) -> Self {
        OutputEvent::Progress { current, total }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        OutputEvent::Warning { text: text.into() }
    }
}
