use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// External tools driven by spindle pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    /// Disc writing and blanking (cdrecord, wodim).
    Cdrecord,
    /// ISO mastering (mkisofs, genisoimage).
    Mkisofs,
    /// Raw data disc reads.
    Readcd,
    /// Audio track extraction (cdda2wav, icedax).
    Cdda2wav,
}

impl Tool {
    pub const ALL: [Tool; 4] = [Tool::Cdrecord, Tool::Mkisofs, Tool::Readcd, Tool::Cdda2wav];

    pub fn name(self) -> &'static str {
        match self {
            Tool::Cdrecord => "cdrecord",
            Tool::Mkisofs => "mkisofs",
            Tool::Readcd => "readcd",
            Tool::Cdda2wav => "cdda2wav",
        }
    }

    /// Alternative program names that print the same output format.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Tool::Cdrecord => &["wodim"],
            Tool::Mkisofs => &["genisoimage", "xorrisofs"],
            Tool::Readcd => &["readom"],
            Tool::Cdda2wav => &["icedax"],
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Tool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Tool::ALL
            .into_iter()
            .find(|t| t.name() == lower || t.aliases().contains(&lower.as_str()))
            .ok_or_else(|| format!("unknown tool '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_aliases() {
        assert_eq!("cdrecord".parse::<Tool>().unwrap(), Tool::Cdrecord);
        assert_eq!("WODIM".parse::<Tool>().unwrap(), Tool::Cdrecord);
        assert_eq!("genisoimage".parse::<Tool>().unwrap(), Tool::Mkisofs);
        assert_eq!("icedax".parse::<Tool>().unwrap(), Tool::Cdda2wav);
        assert!("growisofs".parse::<Tool>().is_err());
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Tool::Readcd).unwrap(), "\"readcd\"");
    }
}
