pub mod burn;
pub mod classify;
pub mod completions;
pub mod config;
pub mod copy;
pub mod doctor;
pub mod erase;
pub mod extract;
pub mod man_pages;
pub mod read;
pub mod replay;
pub mod run;

use indicatif::{ProgressBar, ProgressStyle};
use spindle_core::{clear_active_run, programs_for, set_active_run, Engine, ExecutorKind};
use spindle_runtime::{check_tool_prereqs, format_missing, CancelToken};
use spindle_schema::{FailureKind, OperationRequest, Phase, ProgressSnapshot};
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_INVALID: u8 = 2;
pub const EXIT_DEVICE_BUSY: u8 = 3;
pub const EXIT_CANCELLED: u8 = 4;

/// What every operation command needs.
pub struct RunContext<'a> {
    pub engine: &'a Engine,
    pub json: bool,
    pub timeout: Option<Duration>,
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn exit_code_for(snapshot: &ProgressSnapshot) -> u8 {
    match &snapshot.phase {
        Phase::Completed => EXIT_SUCCESS,
        Phase::Failed(failure) => match failure.kind {
            FailureKind::Validation => EXIT_INVALID,
            FailureKind::DeviceBusy => EXIT_DEVICE_BUSY,
            FailureKind::Cancelled | FailureKind::TimedOut => EXIT_CANCELLED,
            FailureKind::Tool { .. } | FailureKind::Infrastructure => EXIT_FAILURE,
        },
        _ => EXIT_FAILURE,
    }
}

/// Run `request` in the foreground, rendering progress, and map the terminal
/// phase to an exit code.
pub fn run_request(ctx: &RunContext<'_>, request: &OperationRequest) -> Result<u8, String> {
    let config = ctx.engine.config();
    if config.executor == ExecutorKind::Process
        && std::env::var("SPINDLE_SKIP_PREREQS").as_deref() != Ok("1")
    {
        let missing = check_tool_prereqs(programs_for(request, config));
        if !missing.is_empty() {
            return Err(format_missing(&missing));
        }
    }

    let cancel = ctx
        .timeout
        .map_or_else(CancelToken::new, CancelToken::with_deadline);
    set_active_run(&cancel);

    let terminal = if ctx.json {
        ctx.engine.run(request, &cancel, |snapshot| {
            if let Ok(line) = serde_json::to_string(snapshot) {
                println!("{line}");
            }
        })
    } else {
        let pb = progress_bar();
        let terminal = ctx
            .engine
            .run(request, &cancel, |snapshot| render(&pb, snapshot));
        pb.finish_and_clear();
        print_summary(&terminal);
        terminal
    };
    clear_active_run();

    Ok(exit_code_for(&terminal))
}

pub fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold} [{bar:30.cyan/blue}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn render(pb: &ProgressBar, snapshot: &ProgressSnapshot) {
    pb.set_prefix(snapshot.phase.to_string());
    pb.set_length(snapshot.total().max(1));
    pb.set_position(snapshot.current().min(snapshot.total()));
    pb.set_message(describe(snapshot));
}

/// One-line status: counters, stage, buffers and ETA.
pub fn describe(snapshot: &ProgressSnapshot) -> String {
    let mut parts = Vec::new();
    if snapshot.stage_count > 1 {
        parts.push(format!(
            "stage {}/{} {}",
            snapshot.stage_index, snapshot.stage_count, snapshot.stage_name
        ));
    }
    if snapshot.total() > 0 {
        parts.push(format!(
            "{}/{} {}",
            snapshot.current(),
            snapshot.total(),
            snapshot.unit.suffix()
        ));
    }
    if let Some(percent) = snapshot.percent() {
        parts.push(format!("{percent:.0}%"));
    }
    if let Some(fifo) = snapshot.fifo_percent {
        match snapshot.drive_buffer_percent {
            Some(drive) => parts.push(format!("fifo {fifo}% buf {drive}%")),
            None => parts.push(format!("fifo {fifo}%")),
        }
    }
    if let Some(speed) = snapshot.write_speed {
        parts.push(format!("{speed:.1}x"));
    }
    if snapshot.simulation {
        parts.push("simulation".to_owned());
    }
    if let Some(eta) = snapshot.eta() {
        parts.push(format!("eta {}s", eta.as_secs()));
    }
    parts.join("  ")
}

fn print_summary(snapshot: &ProgressSnapshot) {
    for warning in &snapshot.warnings {
        eprintln!("{} {warning}", console::Style::new().yellow().apply_to("warning:"));
    }
    match &snapshot.phase {
        Phase::Completed => println!(
            "✓ {} {} ({:.1}s, run {})",
            snapshot.operation,
            colorize_phase(&snapshot.phase),
            snapshot.elapsed_secs,
            snapshot.run_id
        ),
        Phase::Failed(failure) => println!(
            "✗ {} {}: {} (run {})",
            snapshot.operation,
            colorize_phase(&snapshot.phase),
            failure.message,
            snapshot.run_id
        ),
        other => println!("{} ended in {other}", snapshot.operation),
    }
}

pub fn colorize_phase(phase: &Phase) -> String {
    use console::Style;
    let label = match phase {
        Phase::Completed => "completed".to_owned(),
        Phase::Failed(failure) if failure.is_cancellation() => failure.kind.to_string(),
        Phase::Failed(_) => "failed".to_owned(),
        other => other.to_string(),
    };
    match phase {
        Phase::Completed => Style::new().green().apply_to(label).to_string(),
        Phase::Failed(failure) if failure.is_cancellation() => {
            Style::new().yellow().apply_to(label).to_string()
        }
        Phase::Failed(_) => Style::new().red().bold().apply_to(label).to_string(),
        Phase::Cancelling => Style::new().yellow().apply_to(label).to_string(),
        _ => Style::new().cyan().apply_to(label).to_string(),
    }
}
