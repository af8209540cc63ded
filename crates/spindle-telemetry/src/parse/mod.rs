//! Stateless line parsers, one per tool.
//!
//! Every line is self-contained: a parser never carries context from one
//! line to the next. Unrecognized lines and numeric fields that fail to parse
//! yield no events.

mod cdda2wav;
mod cdrecord;
mod mkisofs;
mod readcd;

pub use cdda2wav::Cdda2wavParser;
pub use cdrecord::CdrecordParser;
pub use mkisofs::MkisofsParser;
pub use readcd::ReadcdParser;

use spindle_schema::{OutputEvent, Tool};
use std::str::FromStr;

/// Translate one line of raw tool output into zero or more events.
pub trait LineParser: Send + Sync {
    fn tool(&self) -> Tool;

    fn parse_line(&self, line: &str) -> Vec<OutputEvent>;
}

static CDRECORD: CdrecordParser = CdrecordParser;
static MKISOFS: MkisofsParser = MkisofsParser;
static READCD: ReadcdParser = ReadcdParser;
static CDDA2WAV: Cdda2wavParser = Cdda2wavParser;

pub fn parser_for(tool: Tool) -> &'static dyn LineParser {
    match tool {
        Tool::Cdrecord => &CDRECORD,
        Tool::Mkisofs => &MKISOFS,
        Tool::Readcd => &READCD,
        Tool::Cdda2wav => &CDDA2WAV,
    }
}

/// Split raw output into lines. Both `\n` and `\r` terminate a line; tools
/// that redraw progress in place emit carriage returns only.
pub fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split(['\n', '\r']).filter(|line| !line.trim().is_empty())
}

/// Parse a whole recorded log, in order.
pub fn parse_text(tool: Tool, text: &str) -> Vec<OutputEvent> {
    let parser = parser_for(tool);
    split_lines(text)
        .flat_map(|line| parser.parse_line(line))
        .collect()
}

/// Drop a leading `<program>:` prefix naming `tool` or one of its aliases.
pub(crate) fn strip_program(line: &str, tool: Tool) -> &str {
    let trimmed = line.trim();
    let Some((head, rest)) = trimmed.split_once(':') else {
        return trimmed;
    };
    let head = head.trim();
    let program = head.rsplit('/').next().unwrap_or(head);
    if program.eq_ignore_ascii_case(tool.name())
        || tool
            .aliases()
            .iter()
            .any(|alias| program.eq_ignore_ascii_case(alias))
    {
        rest.trim_start()
    } else {
        trimmed
    }
}

/// `[<program>:] WARNING: text` in any letter case.
pub(crate) fn warning_text(line: &str, tool: Tool) -> Option<String> {
    let body = strip_program(line, tool);
    let (head, text) = body.split_once(':')?;
    if !head.trim().eq_ignore_ascii_case("warning") {
        return None;
    }
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_owned())
}

/// Leading number of `s` (digits, optionally one decimal point) and the rest.
pub(crate) fn leading_number<T: FromStr>(s: &str) -> Option<(T, &str)> {
    let s = s.trim_start();
    let mut seen_dot = false;
    let end = s
        .char_indices()
        .find(|&(_, c)| {
            if c == '.' && !seen_dot {
                seen_dot = true;
                false
            } else {
                !c.is_ascii_digit()
            }
        })
        .map_or(s.len(), |(i, _)| i);
    let digits = s[..end].trim_end_matches('.');
    if digits.is_empty() {
        return None;
    }
    let value = digits.parse().ok()?;
    Some((value, &s[digits.len()..]))
}

/// Text following the first case-insensitive occurrence of `marker`.
pub(crate) fn after_marker<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    let lower = line.to_ascii_lowercase();
    let at = lower.find(&marker.to_ascii_lowercase())?;
    Some(&line[at + marker.len()..])
}

/// Case-insensitive prefix test on the trimmed line.
pub(crate) fn starts_with_ci(line: &str, prefix: &str) -> bool {
    let line = line.trim_start();
    line.len() >= prefix.len()
        && line.is_char_boundary(prefix.len())
        && line[..prefix.len()].eq_ignore_ascii_case(prefix)
}
