use super::{after_marker, leading_number, starts_with_ci, strip_program, warning_text, LineParser};
use spindle_schema::{OutputEvent, Phase, Tool};

/// Parser for cdrecord/wodim write and blank output.
#[derive(Debug, Default, Clone, Copy)]
pub struct CdrecordParser;

impl LineParser for CdrecordParser {
    fn tool(&self) -> Tool {
        Tool::Cdrecord
    }

    fn parse_line(&self, line: &str) -> Vec<OutputEvent> {
        if let Some(text) = warning_text(line, Tool::Cdrecord) {
            return vec![OutputEvent::warning(text)];
        }
        let body = strip_program(line, Tool::Cdrecord);

        if starts_with_ci(body, "Track") {
            return track_progress(body).unwrap_or_default();
        }
        if starts_with_ci(body, "Starting to write") {
            let mut events = Vec::with_capacity(2);
            if let Some(speed) = negotiated_speed(body) {
                events.push(speed);
            }
            events.push(OutputEvent::phase(Phase::Starting));
            return events;
        }

        let phase = if starts_with_ci(body, "Last chance to quit") {
            Phase::Starting
        } else if starts_with_ci(body, "Blanking") {
            Phase::Blanking
        } else if starts_with_ci(body, "Performing OPC") {
            Phase::Calibrating
        } else if starts_with_ci(body, "Writing lead-in") || starts_with_ci(body, "Writing pregap")
        {
            Phase::WritingLeadIn
        } else if starts_with_ci(body, "Fixating time")
            || starts_with_ci(body, "Flushing cache")
            || starts_with_ci(body, "Synchronizing cache")
        {
            Phase::Flushing
        } else if starts_with_ci(body, "Fixating") || starts_with_ci(body, "Writing lead-out") {
            Phase::WritingLeadOut
        } else {
            return Vec::new();
        };
        vec![OutputEvent::phase(phase)]
    }
}

/// `Starting to write CD/DVD at speed 16.0 in real TAO mode for single session.`
fn negotiated_speed(line: &str) -> Option<OutputEvent> {
    let rest = after_marker(line, "at speed")?;
    let (speed, rest) = leading_number::<f32>(rest)?;
    let mode = rest.trim_start();
    let simulation = starts_with_ci(mode, "in dummy");
    Some(OutputEvent::SpeedNegotiated { speed, simulation })
}

/// `Track 01:  123 of  650 MB written (fifo 100%) [buf  98%]  16.1x.`
///
/// Lines without `MB written` (track listings, totals) yield nothing.
fn track_progress(line: &str) -> Option<Vec<OutputEvent>> {
    after_marker(line, "MB written")?;
    let rest = line.trim_start().get("Track".len()..)?;
    let (track, rest) = leading_number::<u32>(rest)?;
    let rest = rest.strip_prefix(':')?;
    let (current, rest) = leading_number::<u64>(rest)?;
    let total = after_marker(rest, " of ")
        .filter(|_| rest.trim_start().starts_with("of"))
        .and_then(leading_number::<u64>)
        .map_or(0, |(total, _)| total);

    let mut events = vec![
        OutputEvent::TrackChanged { track },
        OutputEvent::phase(Phase::WritingTrack(track)),
        OutputEvent::progress(current, total),
    ];
    if let Some((fifo, _)) = after_marker(line, "fifo").and_then(leading_number::<u8>) {
        let drive = after_marker(line, "[buf")
            .and_then(leading_number::<u8>)
            .map(|(drive, _)| drive);
        events.push(OutputEvent::BufferStats { fifo, drive });
    }
    Some(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Vec<OutputEvent> {
        CdrecordParser.parse_line(line)
    }

    #[test]
    fn track_progress_with_buffers() {
        assert_eq!(
            parse("Track 01:  123 of  650 MB written (fifo 100%) [buf  98%]  16.1x."),
            vec![
                OutputEvent::TrackChanged { track: 1 },
                OutputEvent::phase(Phase::WritingTrack(1)),
                OutputEvent::progress(123, 650),
                OutputEvent::BufferStats {
                    fifo: 100,
                    drive: Some(98)
                },
            ]
        );
    }

    #[test]
    fn track_progress_without_drive_buffer() {
        let events = parse("Track 02:   10 of   40 MB written (fifo  87%)   4.0x.");
        assert_eq!(
            events.last(),
            Some(&OutputEvent::BufferStats {
                fifo: 87,
                drive: None
            })
        );
    }

    #[test]
    fn track_progress_with_unknown_size() {
        assert_eq!(
            parse("Track 03:    7 MB written."),
            vec![
                OutputEvent::TrackChanged { track: 3 },
                OutputEvent::phase(Phase::WritingTrack(3)),
                OutputEvent::progress(7, 0),
            ]
        );
    }

    #[test]
    fn track_listing_is_ignored() {
        assert!(parse("Track 01: data   650 MB        ").is_empty());
        assert!(parse("Track 01: Total bytes read/written: 681574400/681574400 (332800 sectors).").is_empty());
    }

    #[test]
    fn speed_and_simulation() {
        assert_eq!(
            parse("Starting to write CD/DVD at speed 16.0 in dummy TAO mode for single session."),
            vec![
                OutputEvent::SpeedNegotiated {
                    speed: 16.0,
                    simulation: true
                },
                OutputEvent::phase(Phase::Starting),
            ]
        );
        let real = parse("Starting to write CD/DVD at speed  48.0 in real SAO mode for single session.");
        assert_eq!(
            real[0],
            OutputEvent::SpeedNegotiated {
                speed: 48.0,
                simulation: false
            }
        );
    }

    #[test]
    fn phase_markers() {
        let cases = [
            ("Last chance to quit, starting real write    0 seconds.", Phase::Starting),
            ("Blanking PMA, TOC, pregap", Phase::Blanking),
            ("Performing OPC...", Phase::Calibrating),
            ("Writing pregap for track 1 at -150", Phase::WritingLeadIn),
            ("Fixating...", Phase::WritingLeadOut),
            ("Fixating time:   21.446s", Phase::Flushing),
            ("wodim: Synchronizing cache", Phase::Flushing),
        ];
        for (line, phase) in cases {
            assert_eq!(parse(line), vec![OutputEvent::phase(phase)], "line: {line}");
        }
    }

    #[test]
    fn warnings() {
        assert_eq!(
            parse("cdrecord: WARNING: Track size unknown. Data may not fit on disk."),
            vec![OutputEvent::warning("Track size unknown. Data may not fit on disk.")]
        );
    }

    #[test]
    fn malformed_numbers_yield_nothing() {
        assert!(parse("Track xx: ?? of 650 MB written").is_empty());
        assert!(parse("Track 01: 999999999999999999999999 of 1 MB written").is_empty());
    }

    #[test]
    fn unknown_lines_yield_nothing() {
        assert!(parse("Cdrecord-ProDVD-ProBD-Clone 3.02a09").is_empty());
        assert!(parse("").is_empty());
        assert!(parse("Average write speed  15.9x.").is_empty());
    }
}
