use crate::cancel::CancelToken;
use crate::scripted::{ScriptedExecutor, ToolScript};
use crate::RuntimeError;
use spindle_schema::Tool;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// One tool run as requested by a pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub tool: Tool,
    /// Executable to start; usually the tool name or a configured alias.
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// The executor appends all stdout and stderr here.
    pub log_path: PathBuf,
}

impl ToolInvocation {
    /// Shell-like rendering for logs.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// File the tool writes its product to, when its arguments name one:
    /// `f=` for readcd, `-o` for mkisofs.
    pub fn output_path(&self) -> Option<PathBuf> {
        let named = match self.tool {
            Tool::Readcd => self.args.iter().find_map(|a| a.strip_prefix("f=")),
            Tool::Mkisofs => self
                .args
                .windows(2)
                .find(|pair| pair[0] == "-o")
                .map(|pair| pair[1].as_str()),
            Tool::Cdrecord | Tool::Cdda2wav => None,
        }?;
        Some(self.working_dir.join(named))
    }
}

/// How a tool run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutcome {
    /// Process exit code; signals are reported as `128 + signal`.
    pub exit_code: i32,
    /// Extra diagnostic text the executor captured outside the log.
    pub error_text: Option<String>,
    /// The run was stopped because the cancel token fired.
    pub cancelled: bool,
}

impl ExecOutcome {
    pub fn exited(exit_code: i32) -> Self {
        Self {
            exit_code,
            error_text: None,
            cancelled: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs external tools on behalf of the orchestrator.
///
/// `invoke` blocks until the tool has exited. When `cancel` fires mid-run the
/// executor stops the tool its own way and still returns only after the tool
/// is gone, so the log is complete when the caller flushes it.
pub trait ToolExecutor: Send + Sync {
    fn name(&self) -> &str;

    fn invoke(
        &self,
        invocation: &ToolInvocation,
        cancel: &CancelToken,
    ) -> Result<ExecOutcome, RuntimeError>;
}

/// Knobs shared by the built-in executors.
#[derive(Debug, Clone, Default)]
pub struct ExecutorSettings {
    pub poll_interval: Duration,
    pub terminate_grace: Duration,
    /// Per-tool scripts for the scripted executor, keyed by tool name.
    pub scripts: BTreeMap<String, ToolScript>,
}

pub fn select_executor(
    name: &str,
    settings: &ExecutorSettings,
) -> Result<Box<dyn ToolExecutor>, RuntimeError> {
    match name {
        "process" => Ok(Box::new(crate::process::ProcessExecutor::new(
            settings.poll_interval,
            settings.terminate_grace,
        ))),
        "scripted" => {
            let executor = ScriptedExecutor::new().with_poll_interval(settings.poll_interval);
            for (tool, script) in &settings.scripts {
                let tool: Tool = tool.parse().map_err(RuntimeError::Script)?;
                executor.set_script(tool, script.clone());
            }
            Ok(Box::new(executor))
        }
        other => Err(RuntimeError::UnknownExecutor(other.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_builtin_executors() {
        let settings = ExecutorSettings::default();
        assert_eq!(select_executor("process", &settings).unwrap().name(), "process");
        assert_eq!(select_executor("scripted", &settings).unwrap().name(), "scripted");
    }

    #[test]
    fn unknown_executor_fails() {
        assert!(matches!(
            select_executor("privileged-helper", &ExecutorSettings::default()),
            Err(RuntimeError::UnknownExecutor(_))
        ));
    }

    #[test]
    fn unknown_script_tool_fails() {
        let mut settings = ExecutorSettings::default();
        settings
            .scripts
            .insert("growisofs".to_owned(), ToolScript::default());
        assert!(matches!(
            select_executor("scripted", &settings),
            Err(RuntimeError::Script(_))
        ));
    }

    #[test]
    fn command_line_joins_args() {
        let invocation = ToolInvocation {
            tool: Tool::Readcd,
            program: "readom".to_owned(),
            args: vec!["dev=/dev/sr0".to_owned(), "f=out.iso".to_owned()],
            working_dir: PathBuf::from("/tmp"),
            log_path: PathBuf::from("/tmp/x.log"),
        };
        assert_eq!(invocation.command_line(), "readom dev=/dev/sr0 f=out.iso");
        assert_eq!(invocation.output_path(), Some(PathBuf::from("/tmp/out.iso")));
    }

    #[test]
    fn output_path_follows_the_tool() {
        let mut invocation = ToolInvocation {
            tool: Tool::Mkisofs,
            program: "genisoimage".to_owned(),
            args: vec!["-o".to_owned(), "/work/image.iso".to_owned(), "-J".to_owned()],
            working_dir: PathBuf::from("/tmp"),
            log_path: PathBuf::from("/tmp/x.log"),
        };
        assert_eq!(invocation.output_path(), Some(PathBuf::from("/work/image.iso")));
        invocation.tool = Tool::Cdrecord;
        assert_eq!(invocation.output_path(), None);
    }
}
