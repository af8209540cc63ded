use super::{after_marker, leading_number, strip_program, warning_text, LineParser};
use spindle_schema::{OutputEvent, Phase, Tool};

/// Parser for cdda2wav/icedax extraction output. Progress is per track, in percent.
#[derive(Debug, Default, Clone, Copy)]
pub struct Cdda2wavParser;

impl LineParser for Cdda2wavParser {
    fn tool(&self) -> Tool {
        Tool::Cdda2wav
    }

    fn parse_line(&self, line: &str) -> Vec<OutputEvent> {
        if let Some(text) = warning_text(line, Tool::Cdda2wav) {
            return vec![OutputEvent::warning(text)];
        }
        let body = strip_program(line, Tool::Cdda2wav);

        if let Some(track) = track_header(body) {
            return vec![
                OutputEvent::TrackChanged { track },
                OutputEvent::phase(Phase::Extracting(track)),
            ];
        }

        match leading_number::<u64>(body) {
            Some((percent, rest)) if rest.starts_with('%') && percent <= 100 => {
                vec![OutputEvent::progress(percent, 100)]
            }
            _ => Vec::new(),
        }
    }
}

/// `... ->'audio_03'...` or `recording track 3`.
fn track_header(line: &str) -> Option<u32> {
    if let Some(name) = after_marker(line, "->'") {
        let name = name.split('\'').next()?;
        let digits = name.rsplit('_').next()?;
        return leading_number::<u32>(digits)
            .filter(|(_, rest)| rest.is_empty())
            .map(|(track, _)| track);
    }
    let rest = after_marker(line, "recording track")?;
    leading_number::<u32>(rest).map(|(track, _)| track)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Vec<OutputEvent> {
        Cdda2wavParser.parse_line(line)
    }

    #[test]
    fn output_file_header_announces_track() {
        assert_eq!(
            parse("recording 245.3067 seconds stereo with 16 bits @ 44100.0 Hz ->'audio_03'..."),
            vec![
                OutputEvent::TrackChanged { track: 3 },
                OutputEvent::phase(Phase::Extracting(3)),
            ]
        );
    }

    #[test]
    fn icedax_track_header() {
        assert_eq!(
            parse("Recording track 12")[0],
            OutputEvent::TrackChanged { track: 12 }
        );
    }

    #[test]
    fn percent_ticks() {
        assert_eq!(parse(" 42%"), vec![OutputEvent::progress(42, 100)]);
        assert_eq!(
            parse("100%  track  3 'Song' recorded successfully"),
            vec![OutputEvent::progress(100, 100)]
        );
        assert!(parse("250%").is_empty());
    }

    #[test]
    fn header_without_track_number_is_ignored() {
        assert!(parse("recording 10.0 seconds ->'audio'...").is_empty());
    }

    #[test]
    fn warnings() {
        assert_eq!(
            parse("icedax: Warning: no CD-Text found"),
            vec![OutputEvent::warning("no CD-Text found")]
        );
    }
}
