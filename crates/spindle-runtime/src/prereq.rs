use spindle_schema::Tool;
use std::fmt;
use std::process::Command;

/// A tool program that could not be found, with install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub tool: Tool,
    pub program: String,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.program, self.purpose, self.install_hint
        )
    }
}

fn purpose(tool: Tool) -> &'static str {
    match tool {
        Tool::Cdrecord => "writing and blanking discs",
        Tool::Mkisofs => "mastering ISO images from files",
        Tool::Readcd => "reading data discs into images",
        Tool::Cdda2wav => "extracting audio tracks",
    }
}

fn install_hint(tool: Tool) -> &'static str {
    match tool {
        Tool::Cdrecord | Tool::Readcd => {
            "zypper install cdrtools | apt install wodim | dnf install wodim | pacman -S cdrtools"
        }
        Tool::Mkisofs => {
            "zypper install cdrtools | apt install genisoimage | dnf install genisoimage | pacman -S cdrtools"
        }
        Tool::Cdda2wav => {
            "zypper install cdrtools | apt install icedax | dnf install icedax | pacman -S cdrtools"
        }
    }
}

pub fn command_exists(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Check that every configured tool program can be found on `PATH`.
/// An empty list means all tools are available.
pub fn check_tool_prereqs<'a>(
    programs: impl IntoIterator<Item = (Tool, &'a str)>,
) -> Vec<MissingPrereq> {
    programs
        .into_iter()
        .filter(|(_, program)| !command_exists(program))
        .map(|(tool, program)| MissingPrereq {
            tool,
            program: program.to_owned(),
            purpose: purpose(tool),
            install_hint: install_hint(tool),
        })
        .collect()
}

/// Format a list of missing tools into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing tools:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\nconfigure alternative program names in the [tools] table of the config file.");
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_prereq_display() {
        let m = MissingPrereq {
            tool: Tool::Cdrecord,
            program: "wodim".to_owned(),
            purpose: purpose(Tool::Cdrecord),
            install_hint: "apt install wodim",
        };
        let s = m.to_string();
        assert!(s.contains("wodim"));
        assert!(s.contains("writing and blanking discs"));
        assert!(s.contains("apt install wodim"));
    }

    #[test]
    fn absent_program_is_reported() {
        let missing = check_tool_prereqs([(Tool::Readcd, "spindle-no-such-readcd")]);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].tool, Tool::Readcd);
        assert!(format_missing(&missing).contains("spindle-no-such-readcd"));
    }

    #[test]
    fn present_program_is_not_reported() {
        assert!(check_tool_prereqs([(Tool::Mkisofs, "sh")]).is_empty());
    }
}
