//! Pre-flight checks and stage plans for each operation.
//!
//! Everything here runs before the first subprocess: structural validation
//! lives on the request itself, filesystem and capacity checks live here.

use crate::config::EngineConfig;
use crate::workspace::RunWorkspace;
use spindle_schema::{
    BurnRequest, BurnSource, MediaCapacity, OperationRequest, Phase, ProgressUnit, Tool,
    ValidationError, WriteMode, WriteOptions,
};
use std::path::{Path, PathBuf};

const MB: u64 = 1024 * 1024;

/// What pre-flight learned about the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preflight {
    /// Total size of the burn sources.
    pub source_bytes: u64,
    /// Sources exceed the medium but overburn was allowed.
    pub overburn: bool,
    pub warnings: Vec<String>,
}

/// Filesystem and capacity checks. Never spawns anything.
pub fn preflight(request: &OperationRequest) -> Result<Preflight, ValidationError> {
    let mut result = Preflight::default();
    match request {
        OperationRequest::Burn(burn) => {
            for path in burn.source.paths() {
                if !path.exists() {
                    return Err(ValidationError::SourceMissing(path.to_path_buf()));
                }
                result.source_bytes += tree_size(path);
            }
            result.overburn = burn.capacity.check(result.source_bytes)?;
            if result.overburn {
                if let Some(available) = burn.capacity.capacity_bytes {
                    result.warnings.push(format!(
                        "sources exceed the medium by {} bytes; writing with overburn",
                        result.source_bytes - available
                    ));
                }
            }
        }
        OperationRequest::Read(read) => {
            if read.destination.exists() && !read.overwrite {
                return Err(ValidationError::DestinationExists(read.destination.clone()));
            }
        }
        OperationRequest::Extract(extract) => {
            if extract.destination.exists() && !extract.destination.is_dir() {
                return Err(ValidationError::DestinationExists(
                    extract.destination.clone(),
                ));
            }
        }
        OperationRequest::Copy(_) | OperationRequest::Erase(_) => {}
    }
    Ok(result)
}

/// Bytes under `path`, following directories.
pub fn tree_size(path: &Path) -> u64 {
    let Ok(meta) = std::fs::metadata(path) else {
        return 0;
    };
    if !meta.is_dir() {
        return meta.len();
    }
    std::fs::read_dir(path)
        .map(|entries| {
            entries
                .flatten()
                .map(|entry| tree_size(&entry.path()))
                .sum()
        })
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageWork {
    /// Copy sources into the workspace staging directory.
    CopyFiles(Vec<PathBuf>),
    RunTool {
        tool: Tool,
        args: Vec<String>,
        working_dir: PathBuf,
    },
}

/// One step of an operation's plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub name: &'static str,
    /// Phase the orchestrator enters when the stage begins.
    pub entry: Phase,
    pub unit: ProgressUnit,
    pub expected_total: Option<u64>,
    /// Take the expected total from this file's size (in MB) once the stage starts.
    pub sized_by: Option<PathBuf>,
    /// Checked against an image produced by an earlier stage.
    pub capacity: Option<CapacityGuard>,
    pub work: StageWork,
}

/// Capacity check for an image whose size is only known mid-run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacityGuard {
    pub image: PathBuf,
    pub capacity: MediaCapacity,
}

impl Stage {
    fn tool(name: &'static str, entry: Phase, unit: ProgressUnit, tool: Tool, args: Vec<String>, working_dir: PathBuf) -> Self {
        Self {
            name,
            entry,
            unit,
            expected_total: None,
            sized_by: None,
            capacity: None,
            work: StageWork::RunTool {
                tool,
                args,
                working_dir,
            },
        }
    }

    #[must_use]
    fn expecting(mut self, total: Option<u64>) -> Self {
        self.expected_total = total;
        self
    }

    #[must_use]
    fn sized_by(mut self, path: PathBuf) -> Self {
        self.sized_by = Some(path);
        self
    }

    #[must_use]
    fn guarded(mut self, image: PathBuf, capacity: MediaCapacity) -> Self {
        self.capacity = Some(CapacityGuard { image, capacity });
        self
    }

    /// Check the guarded image before the stage runs. Adds `-overburn` ahead
    /// of the image argument and returns a warning when the image is too big
    /// but overburn is allowed.
    pub fn check_capacity(&mut self) -> Result<Option<String>, ValidationError> {
        let Some(guard) = &self.capacity else {
            return Ok(None);
        };
        let size = std::fs::metadata(&guard.image).map_or(0, |meta| meta.len());
        if !guard.capacity.check(size)? {
            return Ok(None);
        }
        let over = size - guard.capacity.capacity_bytes.unwrap_or(size);
        if let StageWork::RunTool { args, .. } = &mut self.work {
            if !args.iter().any(|a| a == "-overburn") {
                let at = args.len().saturating_sub(1);
                args.insert(at, "-overburn".to_owned());
            }
        }
        Ok(Some(format!(
            "image exceeds the medium by {over} bytes; writing with overburn"
        )))
    }

    pub fn tool_kind(&self) -> Option<Tool> {
        match &self.work {
            StageWork::RunTool { tool, .. } => Some(*tool),
            StageWork::CopyFiles(_) => None,
        }
    }
}

/// Ordered stages for `request`, with paths resolved against `workspace`.
pub fn build_plan(
    request: &OperationRequest,
    workspace: &RunWorkspace,
    preflight: &Preflight,
) -> Vec<Stage> {
    let temp = workspace.temp_dir().to_path_buf();
    match request {
        OperationRequest::Burn(burn) => burn_plan(burn, workspace, preflight),
        OperationRequest::Copy(copy) => {
            let image = workspace.image_path();
            vec![
                Stage::tool(
                    "read",
                    Phase::Reading,
                    ProgressUnit::Sectors,
                    Tool::Readcd,
                    readcd_args(&copy.source_device, &image),
                    temp.clone(),
                ),
                Stage::tool(
                    "write",
                    Phase::Starting,
                    ProgressUnit::Megabytes,
                    Tool::Cdrecord,
                    write_args(
                        &copy.target_device,
                        &copy.options,
                        false,
                        false,
                        &[image.clone()],
                    ),
                    temp,
                )
                .sized_by(image.clone())
                .guarded(image, copy.capacity),
            ]
        }
        OperationRequest::Read(read) => vec![Stage::tool(
            "read",
            Phase::Reading,
            ProgressUnit::Sectors,
            Tool::Readcd,
            readcd_args(&read.device, &read.destination),
            temp,
        )],
        OperationRequest::Erase(erase) => {
            let mut args = device_args(&erase.device, &erase.options);
            args.push(format!("blank={}", erase.mode.as_arg()));
            vec![Stage::tool(
                "blank",
                Phase::Starting,
                ProgressUnit::Percent,
                Tool::Cdrecord,
                args,
                temp,
            )]
        }
        OperationRequest::Extract(extract) => {
            let ranges = track_ranges(&extract.tracks);
            if ranges.is_empty() {
                return vec![Stage::tool(
                    "extract",
                    Phase::Extracting(1),
                    ProgressUnit::Percent,
                    Tool::Cdda2wav,
                    cdda2wav_args(&extract.device, None),
                    extract.destination.clone(),
                )];
            }
            ranges
                .into_iter()
                .map(|(first, last)| {
                    Stage::tool(
                        "extract",
                        Phase::Extracting(first),
                        ProgressUnit::Percent,
                        Tool::Cdda2wav,
                        cdda2wav_args(&extract.device, Some((first, last))),
                        extract.destination.clone(),
                    )
                    .expecting(Some(u64::from(last - first + 1) * 100))
                })
                .collect()
        }
    }
}

fn burn_plan(burn: &BurnRequest, workspace: &RunWorkspace, preflight: &Preflight) -> Vec<Stage> {
    let temp = workspace.temp_dir().to_path_buf();
    let source_mb = Some(preflight.source_bytes.div_ceil(MB));
    match &burn.source {
        BurnSource::Files(paths) => {
            let image = workspace.image_path();
            let mut mkisofs = vec!["-o".to_owned(), path_arg(&image), "-J".to_owned(), "-R".to_owned()];
            if let Some(label) = &burn.volume_label {
                mkisofs.push("-V".to_owned());
                mkisofs.push(label.clone());
            }
            mkisofs.push(path_arg(&workspace.staging_dir()));
            vec![
                Stage {
                    name: "stage",
                    entry: Phase::Staging,
                    unit: ProgressUnit::Bytes,
                    expected_total: Some(preflight.source_bytes),
                    sized_by: None,
                    capacity: None,
                    work: StageWork::CopyFiles(paths.clone()),
                },
                Stage::tool(
                    "master",
                    Phase::Mastering,
                    ProgressUnit::BasisPoints,
                    Tool::Mkisofs,
                    mkisofs,
                    temp.clone(),
                ),
                Stage::tool(
                    "write",
                    Phase::Starting,
                    ProgressUnit::Megabytes,
                    Tool::Cdrecord,
                    write_args(&burn.device, &burn.options, preflight.overburn, false, &[image.clone()]),
                    temp,
                )
                .expecting(source_mb)
                .sized_by(image),
            ]
        }
        BurnSource::Image(image) => vec![Stage::tool(
            "write",
            Phase::Starting,
            ProgressUnit::Megabytes,
            Tool::Cdrecord,
            write_args(&burn.device, &burn.options, preflight.overburn, false, std::slice::from_ref(image)),
            temp,
        )
        .expecting(source_mb)],
        BurnSource::Audio(tracks) => vec![Stage::tool(
            "write",
            Phase::Starting,
            ProgressUnit::Megabytes,
            Tool::Cdrecord,
            write_args(&burn.device, &burn.options, preflight.overburn, true, tracks),
            temp,
        )
        .expecting(source_mb)],
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn device_args(device: &str, options: &WriteOptions) -> Vec<String> {
    let mut args = vec!["-v".to_owned(), format!("dev={device}")];
    if let Some(speed) = options.speed {
        args.push(format!("speed={speed}"));
    }
    if options.simulate {
        args.push("-dummy".to_owned());
    }
    if options.eject {
        args.push("-eject".to_owned());
    }
    args
}

/// cdrecord arguments for writing `inputs` to `device`.
pub fn write_args(
    device: &str,
    options: &WriteOptions,
    overburn: bool,
    audio: bool,
    inputs: &[PathBuf],
) -> Vec<String> {
    let mut args = device_args(device, options);
    args.push(
        match options.mode {
            WriteMode::Tao => "-tao",
            WriteMode::Dao => "-dao",
        }
        .to_owned(),
    );
    if options.burn_free {
        args.push("driveropts=burnfree".to_owned());
    }
    if overburn {
        args.push("-overburn".to_owned());
    }
    if audio {
        args.push("-audio".to_owned());
    }
    args.extend(inputs.iter().map(|p| path_arg(p)));
    args
}

fn readcd_args(device: &str, destination: &Path) -> Vec<String> {
    vec![format!("dev={device}"), format!("f={}", path_arg(destination))]
}

fn cdda2wav_args(device: &str, range: Option<(u32, u32)>) -> Vec<String> {
    let mut args = vec!["-D".to_owned(), device.to_owned(), "-B".to_owned()];
    if let Some((first, last)) = range {
        args.push("-t".to_owned());
        args.push(format!("{first}+{last}"));
    }
    args
}

/// Group a track list into sorted contiguous `(first, last)` ranges.
pub fn track_ranges(tracks: &[u32]) -> Vec<(u32, u32)> {
    let mut sorted = tracks.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    let mut ranges: Vec<(u32, u32)> = Vec::new();
    for track in sorted {
        match ranges.last_mut() {
            Some((_, last)) if *last + 1 == track => *last = track,
            _ => ranges.push((track, track)),
        }
    }
    ranges
}

/// Expected total for a stage sized by an intermediate file, in MB.
pub fn file_megabytes(path: &Path) -> Option<u64> {
    std::fs::metadata(path)
        .ok()
        .filter(|meta| meta.len() > 0)
        .map(|meta| meta.len().div_ceil(MB))
}

/// Tools the plan for `request` will run, in order, without duplicates.
pub fn tools_for(request: &OperationRequest) -> Vec<Tool> {
    match request {
        OperationRequest::Burn(burn) => match burn.source {
            BurnSource::Files(_) => vec![Tool::Mkisofs, Tool::Cdrecord],
            BurnSource::Image(_) | BurnSource::Audio(_) => vec![Tool::Cdrecord],
        },
        OperationRequest::Copy(_) => vec![Tool::Readcd, Tool::Cdrecord],
        OperationRequest::Read(_) => vec![Tool::Readcd],
        OperationRequest::Erase(_) => vec![Tool::Cdrecord],
        OperationRequest::Extract(_) => vec![Tool::Cdda2wav],
    }
}

/// Programs `config` would start for `request`.
pub fn programs_for<'a>(request: &OperationRequest, config: &'a EngineConfig) -> Vec<(Tool, &'a str)> {
    tools_for(request)
        .into_iter()
        .map(|tool| (tool, config.tools.program(tool)))
        .collect()
}
