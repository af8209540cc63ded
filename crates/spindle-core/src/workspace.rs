use crate::CoreError;
use spindle_schema::RunId;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Temporary resources owned by one pipeline run: a uniquely named temp
/// directory and the log file every tool stage writes to.
///
/// `cleanup()` removes both and reports failures. If a run unwinds before
/// reaching it, `Drop` removes them anyway.
#[derive(Debug)]
pub struct RunWorkspace {
    run_id: RunId,
    temp_dir: Option<TempDir>,
    temp_path: PathBuf,
    log_path: PathBuf,
}

impl RunWorkspace {
    pub fn create(run_id: &RunId, temp_root: &Path, log_dir: &Path) -> Result<Self, CoreError> {
        std::fs::create_dir_all(temp_root)?;
        std::fs::create_dir_all(log_dir)?;

        let temp_dir = tempfile::Builder::new()
            .prefix(&format!("spindle-{run_id}-"))
            .tempdir_in(temp_root)?;
        let temp_path = temp_dir.path().to_path_buf();
        let log_path = log_dir.join(format!("spindle-{run_id}.log"));
        File::create(&log_path)?;
        debug!(
            "run {run_id}: temp dir {}, log {}",
            temp_path.display(),
            log_path.display()
        );

        Ok(Self {
            run_id: run_id.clone(),
            temp_dir: Some(temp_dir),
            temp_path,
            log_path,
        })
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_path
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Where source files are copied before mastering.
    pub fn staging_dir(&self) -> PathBuf {
        self.temp_path.join("staging")
    }

    /// Intermediate disc image (mastered or read).
    pub fn image_path(&self) -> PathBuf {
        self.temp_path.join("image.iso")
    }

    /// Empty the log before the next tool stage writes to it.
    pub fn reset_log(&self) -> io::Result<()> {
        File::create(&self.log_path).map(drop)
    }

    /// Remove the log file and the temp directory.
    pub fn cleanup(mut self) -> Result<(), CoreError> {
        let log_result = remove_log(&self.log_path);
        let dir_result = match self.temp_dir.take() {
            Some(dir) => dir.close(),
            None => Ok(()),
        };
        debug!("run {}: workspace removed", self.run_id);
        log_result?;
        dir_result?;
        Ok(())
    }
}

fn remove_log(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

impl Drop for RunWorkspace {
    fn drop(&mut self) {
        if let Some(dir) = self.temp_dir.take() {
            warn!("run {}: workspace dropped without cleanup", self.run_id);
            let _ = remove_log(&self.log_path);
            let _ = dir.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace(root: &Path) -> RunWorkspace {
        RunWorkspace::create(&RunId::new("a1b2c3d4e5f6"), &root.join("tmp"), &root.join("logs"))
            .unwrap()
    }

    #[test]
    fn names_carry_the_run_id() {
        let root = tempfile::tempdir().unwrap();
        let ws = workspace(root.path());
        let dir_name = ws.temp_dir().file_name().unwrap().to_string_lossy().into_owned();
        assert!(dir_name.starts_with("spindle-a1b2c3d4e5f6-"));
        assert_eq!(ws.log_path(), root.path().join("logs/spindle-a1b2c3d4e5f6.log"));
        assert!(ws.log_path().exists());
        ws.cleanup().unwrap();
    }

    #[test]
    fn cleanup_removes_everything() {
        let root = tempfile::tempdir().unwrap();
        let ws = workspace(root.path());
        std::fs::create_dir_all(ws.staging_dir()).unwrap();
        std::fs::write(ws.staging_dir().join("a.txt"), b"x").unwrap();
        let (dir, log) = (ws.temp_dir().to_path_buf(), ws.log_path().to_path_buf());
        ws.cleanup().unwrap();
        assert!(!dir.exists());
        assert!(!log.exists());
    }

    #[test]
    fn drop_removes_everything() {
        let root = tempfile::tempdir().unwrap();
        let ws = workspace(root.path());
        let (dir, log) = (ws.temp_dir().to_path_buf(), ws.log_path().to_path_buf());
        drop(ws);
        assert!(!dir.exists());
        assert!(!log.exists());
    }

    #[test]
    fn reset_log_truncates() {
        let root = tempfile::tempdir().unwrap();
        let ws = workspace(root.path());
        std::fs::write(ws.log_path(), b"old stage output\n").unwrap();
        ws.reset_log().unwrap();
        assert_eq!(std::fs::metadata(ws.log_path()).unwrap().len(), 0);
        ws.cleanup().unwrap();
    }

    #[test]
    fn cleanup_tolerates_missing_log() {
        let root = tempfile::tempdir().unwrap();
        let ws = workspace(root.path());
        std::fs::remove_file(ws.log_path()).unwrap();
        assert!(ws.cleanup().is_ok());
    }
}
