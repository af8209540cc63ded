//! Incremental reader for an append-only log file.
//!
//! The tailer tracks a byte offset and only advances it past complete lines,
//! so a line split across two writes is delivered once, whole. A missing file
//! reads as "no new lines".

use crate::TelemetryError;
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

fn active_paths() -> &'static Mutex<HashSet<PathBuf>> {
    static ACTIVE: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    ACTIVE.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Tails one log file. At most one tailer per path exists in the process.
#[derive(Debug)]
pub struct LogTailer {
    path: PathBuf,
    offset: u64,
}

impl LogTailer {
    /// Register a tailer for `path`, starting at offset zero.
    pub fn start(path: impl Into<PathBuf>) -> Result<Self, TelemetryError> {
        let path = path.into();
        let mut active = active_paths()
            .lock()
            .map_err(|e| TelemetryError::Registry(e.to_string()))?;
        if !active.insert(path.clone()) {
            return Err(TelemetryError::AlreadyTailed(path));
        }
        debug!("tailing {}", path.display());
        Ok(Self { path, offset: 0 })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes consumed so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read whatever complete lines were appended since the last poll.
    pub fn poll(&mut self) -> Vec<String> {
        self.read_new(false)
    }

    /// Final flush: every remaining byte is delivered, including a trailing
    /// line without a terminator. Returns the lines and the final offset, which
    /// equals the file length.
    pub fn finish(mut self) -> (Vec<String>, u64) {
        let lines = self.read_new(true);
        (lines, self.offset)
    }

    fn read_new(&mut self, flush: bool) -> Vec<String> {
        match self.read_chunk() {
            Ok(bytes) => self.consume(&bytes, flush),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!("failed to read log {}: {e}", self.path.display());
                Vec::new()
            }
        }
    }

    fn read_chunk(&mut self) -> io::Result<Vec<u8>> {
        let mut file = File::open(&self.path)?;
        let len = file.metadata()?.len();
        if len < self.offset {
            debug!("log {} shrank, rewinding", self.path.display());
            self.offset = 0;
        }
        file.seek(SeekFrom::Start(self.offset))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    fn consume(&mut self, bytes: &[u8], flush: bool) -> Vec<String> {
        let complete = if flush {
            bytes.len()
        } else {
            match bytes.iter().rposition(|&b| b == b'\n' || b == b'\r') {
                Some(last) => last + 1,
                None => return Vec::new(),
            }
        };
        self.offset += complete as u64;
        String::from_utf8_lossy(&bytes[..complete])
            .split(['\n', '\r'])
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect()
    }
}

impl Drop for LogTailer {
    fn drop(&mut self) {
        if let Ok(mut active) = active_paths().lock() {
            active.remove(&self.path);
        }
    }
}

/// Poll `tailer` every `interval` until `stop` is raised, then flush.
///
/// Each non-empty batch goes to `on_lines` in file order. Returns the final
/// offset. Meant to run on a scoped thread whose lifetime is bounded by one
/// pipeline stage.
pub fn tail_until<F>(
    mut tailer: LogTailer,
    interval: Duration,
    stop: &AtomicBool,
    mut on_lines: F,
) -> u64
where
    F: FnMut(Vec<String>),
{
    loop {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        let lines = tailer.poll();
        if !lines.is_empty() {
            on_lines(lines);
        }
        thread::sleep(interval);
    }
    let path = tailer.path().to_path_buf();
    let (lines, offset) = tailer.finish();
    if !lines.is_empty() {
        on_lines(lines);
    }
    debug!("stopped tailing {} at offset {offset}", path.display());
    offset
}
