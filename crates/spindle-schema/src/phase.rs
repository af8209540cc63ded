use crate::taxonomy::ToolError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operation a pipeline run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Burn,
    Copy,
    Read,
    Erase,
    Extract,
}

impl OperationKind {
    pub fn name(self) -> &'static str {
        match self {
            OperationKind::Burn => "burn",
            OperationKind::Copy => "copy",
            OperationKind::Read => "read",
            OperationKind::Erase => "erase",
            OperationKind::Extract => "extract",
        }
    }

    /// Whether `phase` belongs to this operation's state model.
    ///
    /// Idle, cancelling and the terminal phases belong to every operation.
    pub fn admits(self, phase: &Phase) -> bool {
        use Phase::{
            Blanking, Calibrating, Cancelling, Completed, Extracting, Failed, Flushing, Idle,
            Mastering, Preparing, Reading, Staging, Starting, WritingLeadIn, WritingLeadOut,
            WritingTrack,
        };
        match phase {
            Idle | Preparing | Cancelling | Completed | Failed(_) => true,
            Staging | Mastering => self == OperationKind::Burn,
            Reading => matches!(self, OperationKind::Copy | OperationKind::Read),
            Extracting(_) => self == OperationKind::Extract,
            Starting | Blanking | Calibrating => matches!(
                self,
                OperationKind::Burn | OperationKind::Copy | OperationKind::Erase
            ),
            WritingLeadIn | WritingTrack(_) | WritingLeadOut | Flushing => {
                matches!(self, OperationKind::Burn | OperationKind::Copy)
            }
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a run ended in `Phase::Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    /// Rejected before any subprocess was spawned.
    Validation,
    /// Another run holds the device.
    DeviceBusy,
    /// A tool exited non-zero; `code` is the stable taxonomy code.
    Tool { code: u32 },
    /// Temp directory, log file, or spawn failure.
    Infrastructure,
    /// The caller cancelled the run.
    Cancelled,
    /// The caller-supplied deadline lapsed.
    TimedOut,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Validation => f.write_str("validation"),
            FailureKind::DeviceBusy => f.write_str("device busy"),
            FailureKind::Tool { code } => write!(f, "tool error {code}"),
            FailureKind::Infrastructure => f.write_str("infrastructure"),
            FailureKind::Cancelled => f.write_str("cancelled"),
            FailureKind::TimedOut => f.write_str("timed out"),
        }
    }
}

/// Terminal failure payload: a kind callers can match on plus a message for humans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    /// The classified error when a tool failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_error: Option<ToolError>,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.trim().is_empty() {
            message = format!("run failed ({kind})");
        }
        Self {
            kind,
            message,
            tool_error: None,
        }
    }

    pub fn tool(error: ToolError) -> Self {
        Self {
            kind: FailureKind::Tool { code: error.code() },
            message: error.to_string(),
            tool_error: Some(error),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, "cancelled")
    }

    pub fn timed_out() -> Self {
        Self::new(FailureKind::TimedOut, "timed out")
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self.kind, FailureKind::Cancelled | FailureKind::TimedOut)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Named stage a pipeline run is currently executing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "phase", content = "detail", rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Preparing,
    /// Copying source files into the run's staging directory.
    Staging,
    /// Reading a data disc into an image.
    Reading,
    /// Extracting the given audio track.
    Extracting(u32),
    /// Building an ISO image.
    Mastering,
    Starting,
    Blanking,
    /// Optimum power calibration.
    Calibrating,
    WritingLeadIn,
    WritingTrack(u32),
    WritingLeadOut,
    Flushing,
    Cancelling,
    Completed,
    Failed(Failure),
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed(_))
    }

    /// Non-idle, non-terminal.
    pub fn is_active(&self) -> bool {
        !matches!(self, Phase::Idle) && !self.is_terminal()
    }

    /// Position in the forward order shared by all operation kinds. The second
    /// component orders tracks within `Extracting` and `WritingTrack`.
    ///
    /// `Cancelling` and the terminal phases have no position; they are reached
    /// through dedicated transitions rather than ordering.
    pub fn ordinal(&self) -> Option<(u8, u32)> {
        let ord = match self {
            Phase::Idle => (0, 0),
            Phase::Preparing => (1, 0),
            Phase::Staging => (2, 0),
            Phase::Reading => (3, 0),
            Phase::Extracting(track) => (4, *track),
            Phase::Mastering => (5, 0),
            Phase::Starting => (6, 0),
            Phase::Blanking => (7, 0),
            Phase::Calibrating => (8, 0),
            Phase::WritingLeadIn => (9, 0),
            Phase::WritingTrack(track) => (10, *track),
            Phase::WritingLeadOut => (11, 0),
            Phase::Flushing => (12, 0),
            Phase::Cancelling | Phase::Completed | Phase::Failed(_) => return None,
        };
        Some(ord)
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Phase::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => f.write_str("idle"),
            Phase::Preparing => f.write_str("preparing"),
            Phase::Staging => f.write_str("staging files"),
            Phase::Reading => f.write_str("reading"),
            Phase::Extracting(track) => write!(f, "extracting track {track}"),
            Phase::Mastering => f.write_str("mastering image"),
            Phase::Starting => f.write_str("starting"),
            Phase::Blanking => f.write_str("blanking"),
            Phase::Calibrating => f.write_str("calibrating"),
            Phase::WritingLeadIn => f.write_str("writing lead-in"),
            Phase::WritingTrack(track) => write!(f, "writing track {track}"),
            Phase::WritingLeadOut => f.write_str("writing lead-out"),
            Phase::Flushing => f.write_str("flushing"),
            Phase::Cancelling => f.write_str("cancelling"),
            Phase::Completed => f.write_str("completed"),
            Phase::Failed(failure) => write!(f, "failed: {failure}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_and_active() {
        assert!(Phase::Completed.is_terminal());
        assert!(Phase::Failed(Failure::cancelled()).is_terminal());
        assert!(!Phase::Idle.is_active());
        assert!(Phase::Cancelling.is_active());
        assert!(Phase::WritingTrack(2).is_active());
    }

    #[test]
    fn tracks_order_within_phase() {
        assert!(Phase::WritingTrack(1).ordinal() < Phase::WritingTrack(2).ordinal());
        assert!(Phase::WritingTrack(9).ordinal() < Phase::WritingLeadOut.ordinal());
        assert!(Phase::Mastering.ordinal() < Phase::Starting.ordinal());
        assert_eq!(Phase::Cancelling.ordinal(), None);
    }

    #[test]
    fn erase_admits_only_blanking_phases() {
        assert!(OperationKind::Erase.admits(&Phase::Blanking));
        assert!(!OperationKind::Erase.admits(&Phase::WritingTrack(1)));
        assert!(!OperationKind::Read.admits(&Phase::Mastering));
        assert!(OperationKind::Copy.admits(&Phase::Reading));
        assert!(OperationKind::Copy.admits(&Phase::Flushing));
    }

    #[test]
    fn empty_failure_message_is_replaced() {
        let failure = Failure::new(FailureKind::Infrastructure, "  ");
        assert_eq!(failure.message, "run failed (infrastructure)");
    }

    #[test]
    fn tool_failure_carries_code_and_message() {
        let error = crate::taxonomy::classify(crate::Tool::Cdrecord, 7, "");
        let failure = Failure::tool(error);
        assert_eq!(failure.kind, FailureKind::Tool { code: 199 });
        assert!(failure.message.contains("cdrecord"));
        assert!(failure.message.contains('7'));
    }

    #[test]
    fn phase_serializes_with_detail() {
        let json = serde_json::to_string(&Phase::WritingTrack(3)).unwrap();
        assert_eq!(json, r#"{"phase":"writing_track","detail":3}"#);
        let back: Phase = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Phase::WritingTrack(3));
    }
}
