//! Operation requests and their structural validation.
//!
//! Requests can be built in code or loaded from a TOML job file:
//!
//! ```toml
//! operation = "burn"
//! device = "/dev/sr0"
//! volume_label = "BACKUP"
//!
//! [source]
//! files = ["/home/me/photos"]
//!
//! [options]
//! speed = 16
//! simulate = true
//! ```

use crate::phase::OperationKind;
use crate::types::DeviceId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Longest volume identifier an ISO9660 primary descriptor can hold.
pub const MAX_VOLUME_LABEL: usize = 32;

/// Input rejected before any subprocess is spawned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no source files selected")]
    NoSources,
    #[error("no device specified")]
    MissingDevice,
    #[error("source does not exist: {}", .0.display())]
    SourceMissing(PathBuf),
    #[error("destination already exists: {}", .0.display())]
    DestinationExists(PathBuf),
    #[error("two sources are both named {0:?} on the disc")]
    DuplicateSourceName(String),
    #[error(
        "sources need {required} bytes but the medium holds {available} bytes; allow overburn to try anyway"
    )]
    CapacityExceeded { required: u64, available: u64 },
    #[error("write speed must be greater than zero")]
    InvalidSpeed,
    #[error("track list must contain distinct track numbers starting at 1")]
    InvalidTrackList,
    #[error("volume label must be 1-{MAX_VOLUME_LABEL} characters")]
    InvalidVolumeLabel,
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("failed to read request file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse request: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("invalid request: {0}")]
    Invalid(#[from] ValidationError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Track-at-once.
    #[default]
    Tao,
    /// Disc-at-once.
    Dao,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlankMode {
    /// Only the PMA, TOC and pregap.
    #[default]
    Fast,
    /// The entire disc.
    All,
}

impl BlankMode {
    pub fn as_arg(self) -> &'static str {
        match self {
            BlankMode::Fast => "fast",
            BlankMode::All => "all",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WriteOptions {
    #[serde(default)]
    pub speed: Option<u32>,
    /// Dummy write: the laser stays off.
    #[serde(default)]
    pub simulate: bool,
    #[serde(default)]
    pub eject: bool,
    #[serde(default)]
    pub mode: WriteMode,
    #[serde(default = "default_true")]
    pub burn_free: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            speed: None,
            simulate: false,
            eject: false,
            mode: WriteMode::default(),
            burn_free: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MediaCapacity {
    /// Usable bytes on the medium; unchecked when absent.
    #[serde(default)]
    pub capacity_bytes: Option<u64>,
    #[serde(default)]
    pub allow_overburn: bool,
}

impl MediaCapacity {
    pub fn of_megabytes(mb: u64) -> Self {
        Self {
            capacity_bytes: Some(mb * 1024 * 1024),
            allow_overburn: false,
        }
    }

    /// `Ok(true)` when `required` exceeds the medium but overburn is allowed.
    pub fn check(&self, required: u64) -> Result<bool, ValidationError> {
        match self.capacity_bytes {
            Some(available) if required > available => {
                if self.allow_overburn {
                    Ok(true)
                } else {
                    Err(ValidationError::CapacityExceeded {
                        required,
                        available,
                    })
                }
            }
            _ => Ok(false),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BurnSource {
    /// Files and directories mastered into an ISO image first.
    Files(Vec<PathBuf>),
    /// A prepared disc image.
    Image(PathBuf),
    /// WAV files written as audio tracks.
    Audio(Vec<PathBuf>),
}

impl BurnSource {
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            BurnSource::Files(paths) | BurnSource::Audio(paths) => {
                paths.iter().map(PathBuf::as_path).collect()
            }
            BurnSource::Image(path) => vec![path.as_path()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BurnRequest {
    pub device: DeviceId,
    pub source: BurnSource,
    #[serde(default)]
    pub options: WriteOptions,
    #[serde(default)]
    pub capacity: MediaCapacity,
    #[serde(default)]
    pub volume_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CopyRequest {
    pub source_device: DeviceId,
    pub target_device: DeviceId,
    #[serde(default)]
    pub options: WriteOptions,
    #[serde(default)]
    pub capacity: MediaCapacity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadRequest {
    pub device: DeviceId,
    pub destination: PathBuf,
    #[serde(default)]
    pub overwrite: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EraseRequest {
    pub device: DeviceId,
    #[serde(default)]
    pub mode: BlankMode,
    #[serde(default)]
    pub options: WriteOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractRequest {
    pub device: DeviceId,
    pub destination: PathBuf,
    /// Tracks to extract; empty means all.
    #[serde(default)]
    pub tracks: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum OperationRequest {
    Burn(BurnRequest),
    Copy(CopyRequest),
    Read(ReadRequest),
    Erase(EraseRequest),
    Extract(ExtractRequest),
}

impl OperationRequest {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationRequest::Burn(_) => OperationKind::Burn,
            OperationRequest::Copy(_) => OperationKind::Copy,
            OperationRequest::Read(_) => OperationKind::Read,
            OperationRequest::Erase(_) => OperationKind::Erase,
            OperationRequest::Extract(_) => OperationKind::Extract,
        }
    }

    /// Every device the run must hold exclusively, without duplicates.
    pub fn devices(&self) -> Vec<&DeviceId> {
        let mut devices = match self {
            OperationRequest::Burn(r) => vec![&r.device],
            OperationRequest::Copy(r) => vec![&r.source_device, &r.target_device],
            OperationRequest::Read(r) => vec![&r.device],
            OperationRequest::Erase(r) => vec![&r.device],
            OperationRequest::Extract(r) => vec![&r.device],
        };
        devices.sort();
        devices.dedup();
        devices
    }

    /// The device shown in progress snapshots (the writer for copies).
    pub fn primary_device(&self) -> &DeviceId {
        match self {
            OperationRequest::Burn(r) => &r.device,
            OperationRequest::Copy(r) => &r.target_device,
            OperationRequest::Read(r) => &r.device,
            OperationRequest::Erase(r) => &r.device,
            OperationRequest::Extract(r) => &r.device,
        }
    }

    /// Structural checks that need no filesystem access.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.devices().iter().any(|d| d.trim().is_empty()) {
            return Err(ValidationError::MissingDevice);
        }
        match self {
            OperationRequest::Burn(r) => {
                let paths = r.source.paths();
                if paths.is_empty() || paths.iter().any(|p| p.as_os_str().is_empty()) {
                    return Err(ValidationError::NoSources);
                }
                if let BurnSource::Files(files) = &r.source {
                    distinct_names(files)?;
                }
                if let Some(label) = &r.volume_label {
                    if label.is_empty() || label.chars().count() > MAX_VOLUME_LABEL {
                        return Err(ValidationError::InvalidVolumeLabel);
                    }
                }
                validate_options(&r.options)
            }
            OperationRequest::Copy(r) => validate_options(&r.options),
            OperationRequest::Erase(r) => validate_options(&r.options),
            OperationRequest::Read(_) => Ok(()),
            OperationRequest::Extract(r) => {
                let mut sorted = r.tracks.clone();
                sorted.sort_unstable();
                sorted.dedup();
                if sorted.len() != r.tracks.len() || sorted.first() == Some(&0) {
                    return Err(ValidationError::InvalidTrackList);
                }
                Ok(())
            }
        }
    }
}

/// Sources land side by side at the image root, so their file names must
/// differ.
fn distinct_names(paths: &[PathBuf]) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for path in paths {
        let name = path
            .file_name()
            .map_or_else(|| "source".to_owned(), |n| n.to_string_lossy().into_owned());
        if !seen.insert(name.clone()) {
            return Err(ValidationError::DuplicateSourceName(name));
        }
    }
    Ok(())
}

fn validate_options(options: &WriteOptions) -> Result<(), ValidationError> {
    if options.speed == Some(0) {
        return Err(ValidationError::InvalidSpeed);
    }
    Ok(())
}

pub fn parse_request_str(input: &str) -> Result<OperationRequest, RequestError> {
    let request: OperationRequest = toml::from_str(input)?;
    request.validate()?;
    Ok(request)
}

pub fn parse_request_file(path: impl AsRef<Path>) -> Result<OperationRequest, RequestError> {
    let content = fs::read_to_string(path)?;
    parse_request_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn burn(source: BurnSource) -> OperationRequest {
        OperationRequest::Burn(BurnRequest {
            device: DeviceId::new("/dev/sr0"),
            source,
            options: WriteOptions::default(),
            capacity: MediaCapacity::default(),
            volume_label: None,
        })
    }

    #[test]
    fn parses_burn_job_file() {
        let input = r#"
operation = "burn"
device = "/dev/sr0"
volume_label = "BACKUP"

[source]
files = ["/data/photos", "/data/notes.txt"]

[options]
speed = 16
simulate = true

[capacity]
capacity_bytes = 734003200
"#;
        let request = parse_request_str(input).unwrap();
        let OperationRequest::Burn(burn) = &request else {
            panic!("expected burn request");
        };
        assert_eq!(burn.options.speed, Some(16));
        assert!(burn.options.simulate);
        assert!(burn.options.burn_free);
        assert_eq!(burn.source.paths().len(), 2);
        assert_eq!(request.kind(), OperationKind::Burn);
    }

    #[test]
    fn parses_erase_with_defaults() {
        let request = parse_request_str("operation = \"erase\"\ndevice = \"/dev/sr1\"\n").unwrap();
        let OperationRequest::Erase(erase) = request else {
            panic!("expected erase request");
        };
        assert_eq!(erase.mode, BlankMode::Fast);
    }

    #[test]
    fn rejects_unknown_fields() {
        let input = "operation = \"read\"\ndevice = \"/dev/sr0\"\ndestination = \"x.iso\"\nbogus = 1\n";
        assert!(matches!(
            parse_request_str(input),
            Err(RequestError::ParseToml(_))
        ));
    }

    #[test]
    fn empty_file_list_is_rejected() {
        assert_eq!(
            burn(BurnSource::Files(Vec::new())).validate(),
            Err(ValidationError::NoSources)
        );
    }

    #[test]
    fn sources_sharing_a_file_name_are_rejected() {
        assert_eq!(
            burn(BurnSource::Files(vec![
                PathBuf::from("/data/a/readme.txt"),
                PathBuf::from("/data/b/readme.txt"),
            ]))
            .validate(),
            Err(ValidationError::DuplicateSourceName("readme.txt".to_owned()))
        );
        assert!(burn(BurnSource::Files(vec![
            PathBuf::from("/data/a/readme.txt"),
            PathBuf::from("/data/a/notes.txt"),
        ]))
        .validate()
        .is_ok());
    }

    #[test]
    fn blank_device_is_rejected() {
        let request = OperationRequest::Read(ReadRequest {
            device: DeviceId::new("  "),
            destination: PathBuf::from("out.iso"),
            overwrite: false,
        });
        assert_eq!(request.validate(), Err(ValidationError::MissingDevice));
    }

    #[test]
    fn zero_speed_is_rejected() {
        let mut request = burn(BurnSource::Image(PathBuf::from("disc.iso")));
        if let OperationRequest::Burn(r) = &mut request {
            r.options.speed = Some(0);
        }
        assert_eq!(request.validate(), Err(ValidationError::InvalidSpeed));
    }

    #[test]
    fn overlong_volume_label_is_rejected() {
        let mut request = burn(BurnSource::Image(PathBuf::from("disc.iso")));
        if let OperationRequest::Burn(r) = &mut request {
            r.volume_label = Some("X".repeat(MAX_VOLUME_LABEL + 1));
        }
        assert_eq!(request.validate(), Err(ValidationError::InvalidVolumeLabel));
    }

    #[test]
    fn duplicate_tracks_are_rejected() {
        let request = OperationRequest::Extract(ExtractRequest {
            device: DeviceId::new("/dev/sr0"),
            destination: PathBuf::from("out"),
            tracks: vec![1, 2, 2],
        });
        assert_eq!(request.validate(), Err(ValidationError::InvalidTrackList));
    }

    #[test]
    fn copy_on_one_device_locks_it_once() {
        let request = OperationRequest::Copy(CopyRequest {
            source_device: DeviceId::new("/dev/sr0"),
            target_device: DeviceId::new("/dev/sr0"),
            options: WriteOptions::default(),
            capacity: MediaCapacity::default(),
        });
        assert_eq!(request.devices().len(), 1);
    }

    #[test]
    fn capacity_check_honors_overburn() {
        let mut capacity = MediaCapacity::of_megabytes(1);
        assert_eq!(capacity.check(1024), Ok(false));
        assert!(matches!(
            capacity.check(2 * 1024 * 1024),
            Err(ValidationError::CapacityExceeded { .. })
        ));
        capacity.allow_overburn = true;
        assert_eq!(capacity.check(2 * 1024 * 1024), Ok(true));
        assert_eq!(MediaCapacity::default().check(u64::MAX), Ok(false));
    }
}
