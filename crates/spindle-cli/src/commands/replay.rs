use super::{colorize_phase, describe, json_pretty, EXIT_SUCCESS};
use spindle_core::RunState;
use spindle_schema::{
    DeviceId, OperationKind, OutputEvent, Phase, ProgressSnapshot, ProgressUnit, RunId, Tool,
};
use spindle_telemetry::{parser_for, split_lines};
use std::path::Path;

/// The run and stage a tool's output is replayed into.
fn stage_for(tool: Tool) -> (OperationKind, Phase, ProgressUnit) {
    match tool {
        Tool::Cdrecord => (OperationKind::Burn, Phase::Starting, ProgressUnit::Megabytes),
        Tool::Mkisofs => (OperationKind::Burn, Phase::Mastering, ProgressUnit::BasisPoints),
        Tool::Readcd => (OperationKind::Read, Phase::Reading, ProgressUnit::Sectors),
        Tool::Cdda2wav => (OperationKind::Extract, Phase::Extracting(1), ProgressUnit::Percent),
    }
}

/// Feed a recorded log through the tool's parser and the run lifecycle.
pub fn replay(tool: Tool, text: &str) -> Result<(Vec<OutputEvent>, ProgressSnapshot), String> {
    let (kind, entry, unit) = stage_for(tool);
    let snapshot = ProgressSnapshot::new(RunId::new("replay"), kind, Some(DeviceId::new("replay")));
    let mut state = RunState::new(snapshot);
    state.transition(Phase::Preparing).map_err(|e| e.to_string())?;
    state.begin_stage(1, 1, tool.name(), unit, None);
    state.transition(entry).map_err(|e| e.to_string())?;

    let parser = parser_for(tool);
    let mut events = Vec::new();
    for line in split_lines(text) {
        for event in parser.parse_line(line) {
            state.apply(&event);
            events.push(event);
        }
    }
    Ok((events, state.into_snapshot()))
}

pub fn run(tool: Tool, log: &Path, json_output: bool) -> Result<u8, String> {
    let text = std::fs::read_to_string(log)
        .map_err(|e| format!("failed to read {}: {e}", log.display()))?;
    let (events, snapshot) = replay(tool, &text)?;

    if json_output {
        let json = serde_json::json!({
            "tool": tool,
            "events": events,
            "snapshot": snapshot,
        });
        println!("{}", json_pretty(&json)?);
        return Ok(EXIT_SUCCESS);
    }

    for event in &events {
        match event {
            OutputEvent::PhaseChanged { phase } => println!("phase     {phase}"),
            OutputEvent::Progress { current, total } => println!("progress  {current}/{total}"),
            OutputEvent::BufferStats { fifo, drive } => match drive {
                Some(drive) => println!("buffers   fifo {fifo}% drive {drive}%"),
                None => println!("buffers   fifo {fifo}%"),
            },
            OutputEvent::TrackChanged { track } => println!("track     {track}"),
            OutputEvent::SpeedNegotiated { speed, simulation } => {
                println!("speed     {speed:.1}x{}", if *simulation { " (simulation)" } else { "" });
            }
            OutputEvent::Warning { text } => println!("warning   {text}"),
        }
    }
    println!();
    println!(
        "{} events, reached {}: {}",
        events.len(),
        colorize_phase(&snapshot.phase),
        describe(&snapshot)
    );
    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cdrecord_log_reaches_lead_out() {
        let log = "Starting to write CD/DVD at speed 16.0 in real TAO mode for single session.\n\
                   Track 01:    3 of   12 MB written (fifo 100%) [buf  99%]  16.0x.\r\
                   Track 01:   12 of   12 MB written (fifo 100%) [buf  99%]  16.0x.\n\
                   Fixating...\n";
        let (events, snapshot) = replay(Tool::Cdrecord, log).unwrap();
        assert!(!events.is_empty());
        assert_eq!(snapshot.phase, Phase::WritingLeadOut);
        assert_eq!(snapshot.current(), 12);
    }

    #[test]
    fn unrecognized_lines_produce_nothing() {
        let (events, snapshot) = replay(Tool::Readcd, "hello\nworld\n").unwrap();
        assert!(events.is_empty());
        assert_eq!(snapshot.phase, Phase::Reading);
    }
}
