use crate::CoreError;
use fs2::FileExt;
use spindle_runtime::CancelToken;
use spindle_schema::DeviceId;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use tracing::debug;

/// Exclusive hold on one device for the lifetime of a run.
///
/// Backed by an advisory lock file, so it excludes runs in other processes as
/// well as other runs in this one.
#[derive(Debug)]
pub struct DeviceLock {
    device: DeviceId,
    lock_file: File,
}

impl DeviceLock {
    pub fn lock_path(lock_dir: &Path, device: &DeviceId) -> PathBuf {
        lock_dir.join(format!("{}.lock", device.lock_name()))
    }

    /// `Ok(None)` when another run holds the device.
    pub fn try_acquire(lock_dir: &Path, device: &DeviceId) -> Result<Option<Self>, CoreError> {
        std::fs::create_dir_all(lock_dir)?;

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(Self::lock_path(lock_dir, device))?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!("locked device {device}");
                Ok(Some(Self {
                    device: device.clone(),
                    lock_file: file,
                }))
            }
            Err(_) => Ok(None),
        }
    }

    pub fn device(&self) -> &DeviceId {
        &self.device
    }
}

impl Drop for DeviceLock {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
        debug!("released device {}", self.device);
    }
}

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

fn active_run() -> &'static Mutex<Option<CancelToken>> {
    static ACTIVE: OnceLock<Mutex<Option<CancelToken>>> = OnceLock::new();
    ACTIVE.get_or_init(|| Mutex::new(None))
}

/// Make `token` the one Ctrl-C cancels.
pub fn set_active_run(token: &CancelToken) {
    if let Ok(mut active) = active_run().lock() {
        *active = Some(token.clone());
    }
}

pub fn clear_active_run() {
    if let Ok(mut active) = active_run().lock() {
        *active = None;
    }
}

/// First Ctrl-C cancels the active run; a second one exits immediately.
pub fn install_signal_handler() {
    let _ = ctrlc::set_handler(move || {
        if INTERRUPTED.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        if let Ok(active) = active_run().lock() {
            if let Some(token) = active.as_ref() {
                token.cancel();
            }
        }
        eprintln!("\ncancelling, waiting for the tool to stop (press Ctrl-C again to abort)...");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_file_is_named_after_device() {
        let dir = tempfile::tempdir().unwrap();
        let device = DeviceId::new("/dev/sr0");
        let _lock = DeviceLock::try_acquire(dir.path(), &device).unwrap().unwrap();
        assert!(dir.path().join("dev_sr0.lock").exists());
    }

    #[test]
    fn second_acquire_is_refused_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let device = DeviceId::new("/dev/sr0");
        let _lock = DeviceLock::try_acquire(dir.path(), &device).unwrap().unwrap();
        assert!(DeviceLock::try_acquire(dir.path(), &device).unwrap().is_none());
        assert!(DeviceLock::try_acquire(dir.path(), &DeviceId::new("/dev/sr1"))
            .unwrap()
            .is_some());
    }

    #[test]
    fn lock_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let device = DeviceId::new("1,0,0");
        {
            let _lock = DeviceLock::try_acquire(dir.path(), &device).unwrap().unwrap();
        }
        assert!(DeviceLock::try_acquire(dir.path(), &device).unwrap().is_some());
    }

    #[test]
    fn active_run_registration() {
        let token = CancelToken::new();
        set_active_run(&token);
        clear_active_run();
        assert!(active_run().lock().unwrap().is_none());
    }
}
