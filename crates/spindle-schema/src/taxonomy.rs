//! Per-tool error taxonomy.
//!
//! Each tool owns an ordered table of `(pattern, kind)` pairs. Classification
//! lowercases the stderr text and returns the first kind whose pattern is a
//! substring. Tables are never shared: the same English phrase can mean
//! different things for different tools. When nothing matches, an exit code in
//! the signal range (`>= 128`) yields `Signaled`, anything else `Generic`.
//!
//! cdrecord and wodim print "Operation not permitted" for the RLIMIT_MEMLOCK
//! and scheduler warnings of every non-root run, so that phrase is not a
//! pattern.

use crate::tool::Tool;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// First exit code of the conventional "terminated by signal" range.
pub const SIGNAL_EXIT_BASE: i32 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum CdrecordError {
    #[error("burner device not found or cannot be opened")]
    DeviceNotFound,
    #[error("no disc in the drive, or the disc is not writable")]
    NoDisc,
    #[error("disc is not empty; blank it or insert a blank disc")]
    DiscNotEmpty,
    #[error("buffer underrun while writing; try a lower write speed")]
    BufferUnderrun,
    #[error("table of contents is invalid or unreadable")]
    TocInvalid,
    #[error("data does not fit on the disc")]
    CapacityExceeded,
    #[error("drive could not be set up for writing")]
    DeviceSetupFailed,
    #[error("permission denied accessing the burner device")]
    PermissionDenied,
    #[error("cdrecord was terminated by signal {0}")]
    Signaled(i32),
    #[error("cdrecord failed with exit code {0}")]
    Generic(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum MkisofsError {
    #[error("a source file or directory does not exist")]
    SourceNotFound,
    #[error("permission denied reading source files")]
    PermissionDenied,
    #[error("a source file is too large for the image format")]
    FileTooLarge,
    #[error("two source files map to the same name in the image")]
    NameCollision,
    #[error("no space left to write the image")]
    OutOfSpace,
    #[error("mkisofs rejected an option")]
    InvalidOption,
    #[error("mkisofs was terminated by signal {0}")]
    Signaled(i32),
    #[error("mkisofs failed with exit code {0}")]
    Generic(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ReadcdError {
    #[error("reader device not found or cannot be opened")]
    DeviceNotFound,
    #[error("no disc in the drive")]
    NoDisc,
    #[error("unreadable sectors on the disc")]
    ReadError,
    #[error("no space left to write the image")]
    OutOfSpace,
    #[error("permission denied accessing the reader device")]
    PermissionDenied,
    #[error("readcd was terminated by signal {0}")]
    Signaled(i32),
    #[error("readcd failed with exit code {0}")]
    Generic(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum Cdda2wavError {
    #[error("reader device not found or cannot be opened")]
    DeviceNotFound,
    #[error("the disc has no audio tracks")]
    NoAudioTracks,
    #[error("unreadable audio sectors on the disc")]
    ReadError,
    #[error("no space left to write the extracted tracks")]
    OutOfSpace,
    #[error("cdda2wav was terminated by signal {0}")]
    Signaled(i32),
    #[error("cdda2wav failed with exit code {0}")]
    Generic(i32),
}

const CDRECORD_PATTERNS: &[(&str, CdrecordError)] = &[
    ("buffer under run", CdrecordError::BufferUnderrun),
    ("buffer underrun", CdrecordError::BufferUnderrun),
    ("permission denied", CdrecordError::PermissionDenied),
    ("no disk", CdrecordError::NoDisc),
    ("wrong disk", CdrecordError::NoDisc),
    ("medium not present", CdrecordError::NoDisc),
    ("data may not fit", CdrecordError::CapacityExceeded),
    ("exceeds capacity", CdrecordError::CapacityExceeded),
    ("not blank", CdrecordError::DiscNotEmpty),
    ("not empty", CdrecordError::DiscNotEmpty),
    ("closed disk", CdrecordError::DiscNotEmpty),
    ("cannot read toc", CdrecordError::TocInvalid),
    ("bad toc", CdrecordError::TocInvalid),
    ("invalid toc", CdrecordError::TocInvalid),
    ("cannot set up device", CdrecordError::DeviceSetupFailed),
    ("cannot setup device", CdrecordError::DeviceSetupFailed),
    ("cannot get mmc", CdrecordError::DeviceSetupFailed),
    ("cannot init drive", CdrecordError::DeviceSetupFailed),
    ("cannot open scsi driver", CdrecordError::DeviceNotFound),
    ("no such device", CdrecordError::DeviceNotFound),
    ("cannot open", CdrecordError::DeviceNotFound),
];

const MKISOFS_PATTERNS: &[(&str, MkisofsError)] = &[
    ("no space left on device", MkisofsError::OutOfSpace),
    ("permission denied", MkisofsError::PermissionDenied),
    ("no such file or directory", MkisofsError::SourceNotFound),
    ("file too large", MkisofsError::FileTooLarge),
    ("is too large", MkisofsError::FileTooLarge),
    ("same joliet name", MkisofsError::NameCollision),
    ("same rock ridge name", MkisofsError::NameCollision),
    ("unknown option", MkisofsError::InvalidOption),
    ("bad option", MkisofsError::InvalidOption),
    ("invalid option", MkisofsError::InvalidOption),
];

const READCD_PATTERNS: &[(&str, ReadcdError)] = &[
    ("permission denied", ReadcdError::PermissionDenied),
    ("no space left on device", ReadcdError::OutOfSpace),
    ("no disk", ReadcdError::NoDisc),
    ("medium not present", ReadcdError::NoDisc),
    ("read error", ReadcdError::ReadError),
    ("cannot read", ReadcdError::ReadError),
    ("input/output error", ReadcdError::ReadError),
    ("cannot open scsi driver", ReadcdError::DeviceNotFound),
    ("no such device", ReadcdError::DeviceNotFound),
    ("cannot open", ReadcdError::DeviceNotFound),
];

const CDDA2WAV_PATTERNS: &[(&str, Cdda2wavError)] = &[
    ("no space left on device", Cdda2wavError::OutOfSpace),
    ("no audio", Cdda2wavError::NoAudioTracks),
    ("no cdda tracks", Cdda2wavError::NoAudioTracks),
    ("read error", Cdda2wavError::ReadError),
    ("input/output error", Cdda2wavError::ReadError),
    ("no such device", Cdda2wavError::DeviceNotFound),
    ("cannot open", Cdda2wavError::DeviceNotFound),
    ("could not open", Cdda2wavError::DeviceNotFound),
];

/// A classified failure of one external tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "tool", content = "error", rename_all = "lowercase")]
pub enum ToolError {
    #[error(transparent)]
    Cdrecord(#[from] CdrecordError),
    #[error(transparent)]
    Mkisofs(#[from] MkisofsError),
    #[error(transparent)]
    Readcd(#[from] ReadcdError),
    #[error(transparent)]
    Cdda2wav(#[from] Cdda2wavError),
}

impl ToolError {
    pub fn tool(&self) -> Tool {
        match self {
            ToolError::Cdrecord(_) => Tool::Cdrecord,
            ToolError::Mkisofs(_) => Tool::Mkisofs,
            ToolError::Readcd(_) => Tool::Readcd,
            ToolError::Cdda2wav(_) => Tool::Cdda2wav,
        }
    }

    /// Stable numeric code: hundreds digit identifies the tool, `x98` is
    /// signaled and `x99` the generic fallback.
    pub fn code(&self) -> u32 {
        match self {
            ToolError::Cdrecord(e) => {
                100 + match e {
                    CdrecordError::DeviceNotFound => 1,
                    CdrecordError::NoDisc => 2,
                    CdrecordError::DiscNotEmpty => 3,
                    CdrecordError::BufferUnderrun => 4,
                    CdrecordError::TocInvalid => 5,
                    CdrecordError::CapacityExceeded => 6,
                    CdrecordError::DeviceSetupFailed => 7,
                    CdrecordError::PermissionDenied => 8,
                    CdrecordError::Signaled(_) => 98,
                    CdrecordError::Generic(_) => 99,
                }
            }
            ToolError::Mkisofs(e) => {
                200 + match e {
                    MkisofsError::SourceNotFound => 1,
                    MkisofsError::PermissionDenied => 2,
                    MkisofsError::FileTooLarge => 3,
                    MkisofsError::NameCollision => 4,
                    MkisofsError::OutOfSpace => 5,
                    MkisofsError::InvalidOption => 6,
                    MkisofsError::Signaled(_) => 98,
                    MkisofsError::Generic(_) => 99,
                }
            }
            ToolError::Readcd(e) => {
                300 + match e {
                    ReadcdError::DeviceNotFound => 1,
                    ReadcdError::NoDisc => 2,
                    ReadcdError::ReadError => 3,
                    ReadcdError::OutOfSpace => 4,
                    ReadcdError::PermissionDenied => 5,
                    ReadcdError::Signaled(_) => 98,
                    ReadcdError::Generic(_) => 99,
                }
            }
            ToolError::Cdda2wav(e) => {
                400 + match e {
                    Cdda2wavError::DeviceNotFound => 1,
                    Cdda2wavError::NoAudioTracks => 2,
                    Cdda2wavError::ReadError => 3,
                    Cdda2wavError::OutOfSpace => 4,
                    Cdda2wavError::Signaled(_) => 98,
                    Cdda2wavError::Generic(_) => 99,
                }
            }
        }
    }

    /// Whether no pattern matched and the error is the exit-code fallback.
    pub fn is_fallback(&self) -> bool {
        self.code() % 100 >= 98
    }
}

fn first_match<E: Copy>(table: &[(&str, E)], haystack: &str) -> Option<E> {
    table
        .iter()
        .find(|(pattern, _)| haystack.contains(pattern))
        .map(|(_, kind)| *kind)
}

fn signal_of(exit_code: i32) -> Option<i32> {
    (exit_code >= SIGNAL_EXIT_BASE).then(|| exit_code - SIGNAL_EXIT_BASE)
}

/// Classify a non-zero tool exit into a typed error.
///
/// Deterministic for a given `(tool, exit_code, stderr)` and always produces a
/// result.
pub fn classify(tool: Tool, exit_code: i32, stderr: &str) -> ToolError {
    let haystack = stderr.to_lowercase();
    match tool {
        Tool::Cdrecord => first_match(CDRECORD_PATTERNS, &haystack)
            .or_else(|| signal_of(exit_code).map(CdrecordError::Signaled))
            .unwrap_or(CdrecordError::Generic(exit_code))
            .into(),
        Tool::Mkisofs => first_match(MKISOFS_PATTERNS, &haystack)
            .or_else(|| signal_of(exit_code).map(MkisofsError::Signaled))
            .unwrap_or(MkisofsError::Generic(exit_code))
            .into(),
        Tool::Readcd => first_match(READCD_PATTERNS, &haystack)
            .or_else(|| signal_of(exit_code).map(ReadcdError::Signaled))
            .unwrap_or(ReadcdError::Generic(exit_code))
            .into(),
        Tool::Cdda2wav => first_match(CDDA2WAV_PATTERNS, &haystack)
            .or_else(|| signal_of(exit_code).map(Cdda2wavError::Signaled))
            .unwrap_or(Cdda2wavError::Generic(exit_code))
            .into(),
    }
}
