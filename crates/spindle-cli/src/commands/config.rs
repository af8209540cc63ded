use super::{json_pretty, EXIT_SUCCESS};
use spindle_core::EngineConfig;
use std::path::Path;

pub fn run(config: &EngineConfig, write: Option<&Path>, json_output: bool) -> Result<u8, String> {
    if let Some(path) = write {
        config
            .save(path)
            .map_err(|e| format!("failed to write {}: {e}", path.display()))?;
        println!("config written to {}", path.display());
        return Ok(EXIT_SUCCESS);
    }
    if json_output {
        println!("{}", json_pretty(config)?);
    } else {
        let text = toml::to_string_pretty(config)
            .map_err(|e| format!("TOML serialization failed: {e}"))?;
        print!("{text}");
    }
    Ok(EXIT_SUCCESS)
}
