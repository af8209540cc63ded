use super::{after_marker, leading_number, starts_with_ci, strip_program, warning_text, LineParser};
use spindle_schema::{OutputEvent, Phase, Tool};

/// Progress is reported in basis points (hundredths of a percent).
pub const MKISOFS_SCALE: u64 = 10_000;

/// Parser for mkisofs/genisoimage mastering output.
#[derive(Debug, Default, Clone, Copy)]
pub struct MkisofsParser;

impl LineParser for MkisofsParser {
    fn tool(&self) -> Tool {
        Tool::Mkisofs
    }

    fn parse_line(&self, line: &str) -> Vec<OutputEvent> {
        if let Some(text) = warning_text(line, Tool::Mkisofs) {
            return vec![OutputEvent::warning(text)];
        }
        let body = strip_program(line, Tool::Mkisofs);

        if starts_with_ci(body, "Total extents written")
            || (after_marker(body, "extents written").is_some()
                && leading_number::<u64>(body).is_some())
        {
            return vec![OutputEvent::progress(MKISOFS_SCALE, MKISOFS_SCALE)];
        }

        // ` 12.34% done, estimate finish Tue Oct 18 10:12:40 2026`
        let Some((percent, rest)) = leading_number::<f64>(body) else {
            return Vec::new();
        };
        let rest = rest.trim_start();
        if !rest.starts_with('%') || after_marker(rest, "done").is_none() {
            return Vec::new();
        }
        let current = ((percent * 100.0).round() as u64).min(MKISOFS_SCALE);
        vec![
            OutputEvent::phase(Phase::Mastering),
            OutputEvent::progress(current, MKISOFS_SCALE),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Vec<OutputEvent> {
        MkisofsParser.parse_line(line)
    }

    #[test]
    fn percent_done_is_basis_points() {
        assert_eq!(
            parse(" 12.34% done, estimate finish Sun Oct 18 10:12:40 2026"),
            vec![
                OutputEvent::phase(Phase::Mastering),
                OutputEvent::progress(1234, MKISOFS_SCALE),
            ]
        );
        assert_eq!(
            parse("100.00% done, estimate finish Sun Oct 18 10:12:41 2026")[1],
            OutputEvent::progress(MKISOFS_SCALE, MKISOFS_SCALE)
        );
    }

    #[test]
    fn completion_lines() {
        assert_eq!(
            parse("Total extents written = 332800"),
            vec![OutputEvent::progress(MKISOFS_SCALE, MKISOFS_SCALE)]
        );
        assert_eq!(
            parse("332800 extents written (650 MB)"),
            vec![OutputEvent::progress(MKISOFS_SCALE, MKISOFS_SCALE)]
        );
    }

    #[test]
    fn warnings_with_and_without_program() {
        assert_eq!(
            parse("genisoimage: Warning: creating filesystem that does not conform to ISO-9660."),
            vec![OutputEvent::warning(
                "creating filesystem that does not conform to ISO-9660."
            )]
        );
        assert_eq!(
            parse("Warning: using transliterated names"),
            vec![OutputEvent::warning("using transliterated names")]
        );
    }

    #[test]
    fn unrelated_lines_are_ignored() {
        assert!(parse("I: -input-charset not specified, using utf-8").is_empty());
        assert!(parse("Total translation table size: 0").is_empty());
        assert!(parse("Path table size(bytes): 10").is_empty());
        assert!(parse("50% of something").is_empty());
    }
}
