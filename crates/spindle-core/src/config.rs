//! Engine configuration, loaded from TOML.
//!
//! ```toml
//! poll_interval_ms = 100
//! lock_dir = "/run/lock/spindle"
//! executor = "process"
//!
//! [tools]
//! cdrecord = "wodim"
//! mkisofs = "genisoimage"
//! ```

use serde::{Deserialize, Serialize};
use spindle_runtime::{ExecutorSettings, ToolScript};
use spindle_schema::Tool;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_ENV: &str = "SPINDLE_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    /// Spawn the configured programs.
    #[default]
    Process,
    /// Replay `[scripts]` instead of running anything.
    Scripted,
}

impl ExecutorKind {
    pub fn name(self) -> &'static str {
        match self {
            ExecutorKind::Process => "process",
            ExecutorKind::Scripted => "scripted",
        }
    }
}

/// Program started for each tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolPrograms {
    #[serde(default = "default_cdrecord")]
    pub cdrecord: String,
    #[serde(default = "default_mkisofs")]
    pub mkisofs: String,
    #[serde(default = "default_readcd")]
    pub readcd: String,
    #[serde(default = "default_cdda2wav")]
    pub cdda2wav: String,
}

fn default_cdrecord() -> String {
    Tool::Cdrecord.name().to_owned()
}

fn default_mkisofs() -> String {
    Tool::Mkisofs.name().to_owned()
}

fn default_readcd() -> String {
    Tool::Readcd.name().to_owned()
}

fn default_cdda2wav() -> String {
    Tool::Cdda2wav.name().to_owned()
}

impl Default for ToolPrograms {
    fn default() -> Self {
        Self {
            cdrecord: default_cdrecord(),
            mkisofs: default_mkisofs(),
            readcd: default_readcd(),
            cdda2wav: default_cdda2wav(),
        }
    }
}

impl ToolPrograms {
    pub fn program(&self, tool: Tool) -> &str {
        match tool {
            Tool::Cdrecord => &self.cdrecord,
            Tool::Mkisofs => &self.mkisofs,
            Tool::Readcd => &self.readcd,
            Tool::Cdda2wav => &self.cdda2wav,
        }
    }

    pub fn all(&self) -> impl Iterator<Item = (Tool, &str)> {
        Tool::ALL.into_iter().map(|tool| (tool, self.program(tool)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Parent of each run's temporary directory.
    #[serde(default = "std::env::temp_dir")]
    pub temp_root: PathBuf,
    #[serde(default = "std::env::temp_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_lock_dir")]
    pub lock_dir: PathBuf,
    /// Recent log lines kept for error classification.
    #[serde(default = "default_tail_lines")]
    pub tail_lines: usize,
    #[serde(default = "default_terminate_grace_ms")]
    pub terminate_grace_ms: u64,
    #[serde(default)]
    pub executor: ExecutorKind,
    #[serde(default)]
    pub tools: ToolPrograms,
    /// Tool scripts for the scripted executor, keyed by tool name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scripts: BTreeMap<String, ToolScript>,
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_lock_dir() -> PathBuf {
    std::env::temp_dir().join("spindle-locks")
}

fn default_tail_lines() -> usize {
    20
}

fn default_terminate_grace_ms() -> u64 {
    5000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            temp_root: std::env::temp_dir(),
            log_dir: std::env::temp_dir(),
            lock_dir: default_lock_dir(),
            tail_lines: default_tail_lines(),
            terminate_grace_ms: default_terminate_grace_ms(),
            executor: ExecutorKind::default(),
            tools: ToolPrograms::default(),
            scripts: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Load from `explicit`, `$SPINDLE_CONFIG`, or `~/.config/spindle/config.toml`,
    /// in that order. A missing default file yields the defaults; an explicitly
    /// named file must exist.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::load(Path::new(&path));
        }
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be greater than zero".to_owned(),
            ));
        }
        if self.tail_lines == 0 {
            return Err(ConfigError::Invalid(
                "tail_lines must be greater than zero".to_owned(),
            ));
        }
        if let Some(name) = self.scripts.keys().find(|name| name.parse::<Tool>().is_err()) {
            return Err(ConfigError::Invalid(format!(
                "scripts.{name} does not name a known tool"
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }

    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            poll_interval: self.poll_interval(),
            terminate_grace: self.terminate_grace(),
            scripts: self.scripts.clone(),
        }
    }

    /// A config whose temp, log and lock directories all live under `root`.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            temp_root: root.join("tmp"),
            log_dir: root.join("logs"),
            lock_dir: root.join("locks"),
            ..Self::default()
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(PathBuf::from(home).join(".config/spindle/config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = EngineConfig::parse("").unwrap();
        assert_eq!(config.poll_interval_ms, 100);
        assert_eq!(config.tail_lines, 20);
        assert_eq!(config.terminate_grace_ms, 5000);
        assert_eq!(config.executor, ExecutorKind::Process);
        assert_eq!(config.tools.program(Tool::Cdrecord), "cdrecord");
    }

    #[test]
    fn tool_programs_override() {
        let config = EngineConfig::parse(
            r#"
[tools]
cdrecord = "wodim"
cdda2wav = "icedax"
"#,
        )
        .unwrap();
        assert_eq!(config.tools.program(Tool::Cdrecord), "wodim");
        assert_eq!(config.tools.program(Tool::Cdda2wav), "icedax");
        assert_eq!(config.tools.program(Tool::Mkisofs), "mkisofs");
    }

    #[test]
    fn scripted_executor_with_scripts() {
        let config = EngineConfig::parse(
            r#"
executor = "scripted"

[scripts.cdrecord]
lines = ["Performing OPC...", "Fixating..."]
exit_code = 0
"#,
        )
        .unwrap();
        assert_eq!(config.executor, ExecutorKind::Scripted);
        assert_eq!(config.executor_settings().scripts["cdrecord"].lines.len(), 2);
    }

    #[test]
    fn rejects_unknown_keys_and_bad_values() {
        assert!(matches!(
            EngineConfig::parse("poll_ms = 5"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            EngineConfig::parse("poll_interval_ms = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::parse("[scripts.growisofs]\nexit_code = 1\n"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");
        let mut config = EngineConfig::rooted_at(dir.path());
        config.tools.mkisofs = "genisoimage".to_owned();
        config.save(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            EngineConfig::load_or_default(Some(&dir.path().join("absent.toml"))),
            Err(ConfigError::Io(_))
        ));
    }
}
