use crate::cancel::CancelToken;
use crate::executor::{ExecOutcome, ToolExecutor, ToolInvocation};
use crate::RuntimeError;
use std::fs::OpenOptions;
use std::os::unix::process::ExitStatusExt;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Spawns tools as child processes with stdout and stderr appended to the log.
///
/// Cancellation sends SIGTERM, then SIGKILL once the grace period is over.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    poll_interval: Duration,
    terminate_grace: Duration,
    /// Sends SIGTERM to a pid.
    terminate: fn(u32) -> Result<(), RuntimeError>,
}

impl ProcessExecutor {
    pub fn new(poll_interval: Duration, terminate_grace: Duration) -> Self {
        Self {
            poll_interval: poll_interval.max(Duration::from_millis(1)),
            terminate_grace,
            terminate,
        }
    }
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(5))
    }
}

impl ToolExecutor for ProcessExecutor {
    fn name(&self) -> &str {
        "process"
    }

    fn invoke(
        &self,
        invocation: &ToolInvocation,
        cancel: &CancelToken,
    ) -> Result<ExecOutcome, RuntimeError> {
        let stdout = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&invocation.log_path)?;
        let stderr = stdout.try_clone()?;

        info!("running {}", invocation.command_line());
        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|source| RuntimeError::Spawn {
                program: invocation.program.clone(),
                source,
            })?;

        let mut terminated_at: Option<Instant> = None;
        let mut killed = false;
        loop {
            if let Some(status) = child.try_wait()? {
                let exit_code = exit_code_of(status);
                debug!("{} exited with {exit_code}", invocation.program);
                return Ok(ExecOutcome {
                    exit_code,
                    error_text: None,
                    cancelled: terminated_at.is_some(),
                });
            }

            if cancel.is_cancelled() {
                match terminated_at {
                    None => {
                        if let Err(e) = (self.terminate)(child.id()) {
                            warn!("{e}; killing after the grace period");
                        }
                        terminated_at = Some(Instant::now());
                    }
                    Some(at) if !killed && at.elapsed() >= self.terminate_grace => {
                        warn!(
                            "{} did not exit after SIGTERM, killing it",
                            invocation.program
                        );
                        if let Err(e) = child.kill() {
                            warn!("failed to kill {}: {e}", invocation.program);
                        }
                        killed = true;
                    }
                    Some(_) => {}
                }
            }

            thread::sleep(self.poll_interval);
        }
    }
}

fn exit_code_of(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(-1)
}

fn terminate(pid: u32) -> Result<(), RuntimeError> {
    let pid_i32 = i32::try_from(pid)
        .map_err(|_| RuntimeError::ExecFailed(format!("invalid pid {pid}: exceeds i32 range")))?;
    debug!("sending SIGTERM to pid {pid}");
    // SAFETY: kill() only takes plain integers; pid belongs to our own child.
    #[allow(unsafe_code)]
    let ret = unsafe { libc::kill(pid_i32, libc::SIGTERM) };
    if ret != 0 {
        let errno = std::io::Error::last_os_error();
        if errno.raw_os_error() == Some(libc::ESRCH) {
            debug!("pid {pid} already exited before SIGTERM");
        } else {
            return Err(RuntimeError::ExecFailed(format!(
                "failed to send SIGTERM to pid {pid}: {errno}"
            )));
        }
    }
    Ok(())
}
