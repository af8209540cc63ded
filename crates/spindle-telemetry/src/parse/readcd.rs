use super::{leading_number, starts_with_ci, strip_program, warning_text, LineParser};
use spindle_schema::{OutputEvent, Phase, Tool};

/// Parser for readcd/readom sector dumps. Counters are in sectors.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReadcdParser;

impl LineParser for ReadcdParser {
    fn tool(&self) -> Tool {
        Tool::Readcd
    }

    fn parse_line(&self, line: &str) -> Vec<OutputEvent> {
        if let Some(text) = warning_text(line, Tool::Readcd) {
            return vec![OutputEvent::warning(text)];
        }
        let body = strip_program(line, Tool::Readcd);

        let progress = if starts_with_ci(body, "end:") {
            leading_number::<u64>(&body.trim_start()["end:".len()..])
                .map(|(end, _)| OutputEvent::progress(0, end))
        } else if starts_with_ci(body, "addr:") {
            leading_number::<u64>(&body.trim_start()["addr:".len()..])
                .map(|(addr, _)| OutputEvent::progress(addr, 0))
        } else {
            None
        };

        match progress {
            Some(event) => vec![OutputEvent::phase(Phase::Reading), event],
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Vec<OutputEvent> {
        ReadcdParser.parse_line(line)
    }

    #[test]
    fn end_sets_total() {
        assert_eq!(
            parse("end:    332800"),
            vec![
                OutputEvent::phase(Phase::Reading),
                OutputEvent::progress(0, 332_800)
            ]
        );
    }

    #[test]
    fn addr_sets_current() {
        assert_eq!(
            parse("addr:   166400 cnt: 64"),
            vec![
                OutputEvent::phase(Phase::Reading),
                OutputEvent::progress(166_400, 0)
            ]
        );
    }

    #[test]
    fn warnings_and_noise() {
        assert_eq!(
            parse("readom: Warning: Controller returns wrong size for CD capabilities page."),
            vec![OutputEvent::warning(
                "Controller returns wrong size for CD capabilities page."
            )]
        );
        assert!(parse("Read  speed:  7056 kB/s (CD  40x, DVD  5x).").is_empty());
        assert!(parse("addr: ??").is_empty());
    }
}
