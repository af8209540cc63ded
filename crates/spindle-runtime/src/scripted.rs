use crate::cancel::CancelToken;
use crate::executor::{ExecOutcome, ToolExecutor, ToolInvocation};
use crate::RuntimeError;
use serde::{Deserialize, Serialize};
use spindle_schema::Tool;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use tracing::debug;

/// Exit code reported when a scripted tool is stopped by cancellation (SIGTERM).
pub const SCRIPTED_TERMINATED_EXIT: i32 = 143;

/// Recorded behavior of one tool for the scripted executor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolScript {
    /// Output lines, written to the log one at a time.
    #[serde(default)]
    pub lines: Vec<String>,
    /// Recorded log file replayed after `lines`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replay: Option<PathBuf>,
    #[serde(default)]
    pub exit_code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
    /// Pause after each written line.
    #[serde(default)]
    pub line_delay_ms: u64,
    /// After the output, keep running until the cancel token fires.
    #[serde(default)]
    pub hang_until_cancelled: bool,
    /// Size of the file created at the invocation's output path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_bytes: Option<u64>,
}

impl ToolScript {
    pub fn lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    #[must_use]
    pub fn error_text(mut self, text: impl Into<String>) -> Self {
        self.error_text = Some(text.into());
        self
    }

    #[must_use]
    pub fn line_delay(mut self, delay: Duration) -> Self {
        self.line_delay_ms = delay.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn output_bytes(mut self, bytes: u64) -> Self {
        self.output_bytes = Some(bytes);
        self
    }

    #[must_use]
    pub fn hang(mut self) -> Self {
        self.hang_until_cancelled = true;
        self
    }

    fn all_lines(&self) -> Result<Vec<String>, RuntimeError> {
        let mut lines = self.lines.clone();
        if let Some(path) = &self.replay {
            let recorded = std::fs::read_to_string(path).map_err(|e| {
                RuntimeError::Script(format!("cannot read {}: {e}", path.display()))
            })?;
            lines.extend(recorded.lines().map(str::to_owned));
        }
        Ok(lines)
    }
}

/// Executor that writes scripted output instead of running programs.
///
/// Tools without a script succeed silently. Every invocation is recorded so
/// tests can assert what would have been run.
#[derive(Debug)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<Tool, ToolScript>>,
    invocations: Mutex<Vec<ToolInvocation>>,
    poll_interval: Duration,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            invocations: Mutex::new(Vec::new()),
            poll_interval: Duration::from_millis(10),
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    #[must_use]
    pub fn with_script(self, tool: Tool, script: ToolScript) -> Self {
        self.set_script(tool, script);
        self
    }

    pub fn set_script(&self, tool: Tool, script: ToolScript) {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.insert(tool, script);
        }
    }

    /// Invocations seen so far, in order.
    pub fn invocations(&self) -> Vec<ToolInvocation> {
        self.invocations
            .lock()
            .map(|inv| inv.clone())
            .unwrap_or_default()
    }

    fn terminated() -> ExecOutcome {
        ExecOutcome {
            exit_code: SCRIPTED_TERMINATED_EXIT,
            error_text: None,
            cancelled: true,
        }
    }
}

impl Default for ScriptedExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolExecutor for ScriptedExecutor {
    fn name(&self) -> &str {
        "scripted"
    }

    fn invoke(
        &self,
        invocation: &ToolInvocation,
        cancel: &CancelToken,
    ) -> Result<ExecOutcome, RuntimeError> {
        self.invocations
            .lock()
            .map_err(|e| RuntimeError::ExecFailed(format!("mutex poisoned: {e}")))?
            .push(invocation.clone());

        let script = self
            .scripts
            .lock()
            .map_err(|e| RuntimeError::ExecFailed(format!("mutex poisoned: {e}")))?
            .get(&invocation.tool)
            .cloned()
            .unwrap_or_default();
        debug!("scripted {}", invocation.command_line());

        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&invocation.log_path)?;
        let delay = Duration::from_millis(script.line_delay_ms);
        for line in script.all_lines()? {
            if cancel.is_cancelled() {
                return Ok(Self::terminated());
            }
            writeln!(log, "{line}")?;
            log.flush()?;
            if !delay.is_zero() {
                thread::sleep(delay);
            }
        }

        if let (Some(bytes), Some(path)) = (script.output_bytes, invocation.output_path()) {
            debug!("scripted output {} ({bytes} bytes)", path.display());
            std::fs::File::create(&path)?.set_len(bytes)?;
        }

        if script.hang_until_cancelled {
            while !cancel.is_cancelled() {
                thread::sleep(self.poll_interval);
            }
            return Ok(Self::terminated());
        }

        Ok(ExecOutcome {
            exit_code: script.exit_code,
            error_text: script.error_text,
            cancelled: false,
        })
    }
}
