use crate::phase::{OperationKind, Phase};
use crate::types::{DeviceId, RunId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Unit of the progress counters of the current stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressUnit {
    #[default]
    Megabytes,
    Bytes,
    /// Hundredths of a percent (mkisofs).
    BasisPoints,
    Sectors,
    Percent,
}

impl ProgressUnit {
    pub fn suffix(self) -> &'static str {
        match self {
            ProgressUnit::Megabytes => "MB",
            ProgressUnit::Bytes => "B",
            ProgressUnit::BasisPoints => "bp",
            ProgressUnit::Sectors => "sectors",
            ProgressUnit::Percent => "%",
        }
    }
}

/// Aggregate of counters and flags describing a run at one point in time.
///
/// Only raw counters are stored; percentage and ETA are derived on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub run_id: RunId,
    pub operation: OperationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceId>,
    pub phase: Phase,
    /// 1-based index of the running stage; 0 before the first stage starts.
    pub stage_index: u32,
    pub stage_count: u32,
    pub stage_name: String,
    pub unit: ProgressUnit,
    /// Sum of the totals of tracks already finished in this stage.
    pub completed_base: u64,
    pub track_current: u64,
    pub track_total: u64,
    /// Stage total known up front (image size, track count), if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<u32>,
    pub elapsed_secs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fifo_percent: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_buffer_percent: Option<u8>,
    pub simulation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_speed: Option<f32>,
    pub warnings: Vec<String>,
    pub started_at: String,
}

impl ProgressSnapshot {
    pub fn new(run_id: RunId, operation: OperationKind, device: Option<DeviceId>) -> Self {
        Self {
            run_id,
            operation,
            device,
            phase: Phase::Idle,
            stage_index: 0,
            stage_count: 0,
            stage_name: String::new(),
            unit: ProgressUnit::default(),
            completed_base: 0,
            track_current: 0,
            track_total: 0,
            expected_total: None,
            track: None,
            elapsed_secs: 0.0,
            fifo_percent: None,
            drive_buffer_percent: None,
            simulation: false,
            write_speed: None,
            warnings: Vec::new(),
            started_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Reset the stage counters for the next stage of the plan.
    pub fn begin_stage(
        &mut self,
        index: u32,
        count: u32,
        name: &str,
        unit: ProgressUnit,
        expected_total: Option<u64>,
    ) {
        name.clone_into(&mut self.stage_name);
        self.stage_index = index;
        self.stage_count = count;
        self.unit = unit;
        self.expected_total = expected_total;
        self.completed_base = 0;
        self.track_current = 0;
        self.track_total = 0;
        self.track = None;
        self.fifo_percent = None;
        self.drive_buffer_percent = None;
    }

    /// Record a progress report for the current track.
    ///
    /// A `current` below the recorded value is a regression and is ignored;
    /// a non-zero `total` is always taken. Returns whether the counter moved.
    pub fn record_progress(&mut self, current: u64, total: u64) -> bool {
        if total > 0 {
            self.track_total = total;
        }
        if current < self.track_current {
            return false;
        }
        let moved = current != self.track_current;
        self.track_current = current;
        moved
    }

    /// Switch to track `track`. Earlier track numbers are ignored.
    ///
    /// The finished track's total moves into `completed_base` so the aggregate
    /// counter never decreases.
    pub fn change_track(&mut self, track: u32) -> bool {
        match self.track {
            Some(current) if track <= current => false,
            Some(_) => {
                self.completed_base += self.track_total.max(self.track_current);
                self.track_current = 0;
                self.track_total = 0;
                self.track = Some(track);
                true
            }
            None => {
                self.track = Some(track);
                true
            }
        }
    }

    pub fn add_warning(&mut self, text: impl Into<String>) {
        let text = text.into();
        if !self.warnings.contains(&text) {
            self.warnings.push(text);
        }
    }

    /// Aggregate progress of the current stage.
    pub fn current(&self) -> u64 {
        self.completed_base + self.track_current
    }

    /// Stage total: the up-front total if known, otherwise what the tool reported.
    pub fn total(&self) -> u64 {
        self.expected_total
            .unwrap_or(self.completed_base + self.track_total)
    }

    /// Percentage of the current stage, clamped to 100.
    pub fn percent(&self) -> Option<f64> {
        if self.phase == Phase::Completed {
            return Some(100.0);
        }
        let total = self.total();
        if total == 0 {
            return None;
        }
        Some((self.current() as f64 * 100.0 / total as f64).min(100.0))
    }

    /// Linear estimate of the time left in the current stage.
    pub fn eta(&self) -> Option<Duration> {
        let percent = self.percent()?;
        if percent <= 0.0 || percent >= 100.0 || self.elapsed_secs <= 0.0 {
            return None;
        }
        let remaining = self.elapsed_secs * (100.0 - percent) / percent;
        Some(Duration::from_secs_f64(remaining))
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}
