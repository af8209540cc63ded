use crate::CoreError;
use spindle_schema::{OperationKind, OutputEvent, Phase, ProgressSnapshot, ProgressUnit};
use std::time::Instant;
use tracing::debug;

/// Check whether a run of `kind` may move from `from` to `to`.
pub fn validate_transition(kind: OperationKind, from: &Phase, to: &Phase) -> Result<(), CoreError> {
    let valid = match (from, to) {
        (from, _) if from.is_terminal() => false,
        (Phase::Cancelling, Phase::Failed(failure)) => failure.is_cancellation(),
        (Phase::Cancelling, _) => false,
        (_, Phase::Failed(_)) => true,
        (from, Phase::Cancelling | Phase::Completed) => from.is_active(),
        (from, to) => {
            kind.admits(to)
                && match (from.ordinal(), to.ordinal()) {
                    (Some(a), Some(b)) => b >= a,
                    _ => false,
                }
        }
    };

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// The state machine of one pipeline run.
///
/// Owns the run's `ProgressSnapshot`. Parsed events go through [`RunState::apply`],
/// which drops anything the phase model forbids; orchestrator-driven moves go
/// through [`RunState::transition`], which reports them as errors instead.
#[derive(Debug)]
pub struct RunState {
    snapshot: ProgressSnapshot,
    started: Instant,
}

impl RunState {
    pub fn new(snapshot: ProgressSnapshot) -> Self {
        Self {
            snapshot,
            started: Instant::now(),
        }
    }

    pub fn snapshot(&self) -> &ProgressSnapshot {
        &self.snapshot
    }

    pub fn phase(&self) -> &Phase {
        &self.snapshot.phase
    }

    pub fn into_snapshot(self) -> ProgressSnapshot {
        self.snapshot
    }

    pub fn transition(&mut self, to: Phase) -> Result<(), CoreError> {
        if self.snapshot.phase == to {
            return Ok(());
        }
        validate_transition(self.snapshot.operation, &self.snapshot.phase, &to)?;
        debug!("run {}: {} -> {to}", self.snapshot.run_id, self.snapshot.phase);
        self.snapshot.phase = to;
        self.touch();
        Ok(())
    }

    pub fn begin_stage(
        &mut self,
        index: u32,
        count: u32,
        name: &str,
        unit: ProgressUnit,
        expected_total: Option<u64>,
    ) {
        self.snapshot
            .begin_stage(index, count, name, unit, expected_total);
        self.touch();
    }

    pub fn warn(&mut self, text: impl Into<String>) {
        self.snapshot.add_warning(text);
    }

    /// Apply one parsed event. Returns whether the snapshot changed.
    ///
    /// A terminal run ignores everything. While cancelling, counters may still
    /// move but phases may not.
    pub fn apply(&mut self, event: &OutputEvent) -> bool {
        if self.snapshot.is_terminal() {
            return false;
        }
        let changed = match event {
            OutputEvent::PhaseChanged { phase } => self.apply_phase(phase),
            OutputEvent::Progress { current, total } => {
                self.snapshot.record_progress(*current, *total)
            }
            OutputEvent::BufferStats { fifo, drive } => {
                let changed = self.snapshot.fifo_percent != Some(*fifo)
                    || (drive.is_some() && self.snapshot.drive_buffer_percent != *drive);
                self.snapshot.fifo_percent = Some(*fifo);
                if drive.is_some() {
                    self.snapshot.drive_buffer_percent = *drive;
                }
                changed
            }
            OutputEvent::TrackChanged { track } => self.snapshot.change_track(*track),
            OutputEvent::SpeedNegotiated { speed, simulation } => {
                self.snapshot.write_speed = Some(*speed);
                self.snapshot.simulation = *simulation;
                true
            }
            OutputEvent::Warning { text } => {
                let before = self.snapshot.warnings.len();
                self.snapshot.add_warning(text.as_str());
                self.snapshot.warnings.len() != before
            }
        };
        if changed {
            self.touch();
        }
        changed
    }

    fn apply_phase(&mut self, phase: &Phase) -> bool {
        if *phase == self.snapshot.phase {
            return false;
        }
        if phase.is_terminal() || *phase == Phase::Cancelling {
            debug!("ignoring parsed {phase}: only the orchestrator ends a run");
            return false;
        }
        if !self.snapshot.operation.admits(phase) {
            debug!(
                "ignoring parsed {phase}: not part of a {} run",
                self.snapshot.operation
            );
            return false;
        }
        match self.transition(phase.clone()) {
            Ok(()) => true,
            Err(e) => {
                debug!("dropping parsed phase: {e}");
                false
            }
        }
    }

    /// Refresh the elapsed time.
    pub fn touch(&mut self) {
        self.snapshot.elapsed_secs = self.started.elapsed().as_secs_f64();
    }
}
