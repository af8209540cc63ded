use super::{json_pretty, EXIT_SUCCESS};
use spindle_schema::{classify, Tool};
use std::path::Path;

pub fn run(
    tool: Tool,
    exit_code: i32,
    stderr: Option<&str>,
    stderr_file: Option<&Path>,
    json_output: bool,
) -> Result<u8, String> {
    let text = match (stderr, stderr_file) {
        (Some(text), _) => text.to_owned(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?,
        (None, None) => String::new(),
    };
    let error = classify(tool, exit_code, &text);

    if json_output {
        let json = serde_json::json!({
            "tool": error.tool(),
            "exit_code": exit_code,
            "code": error.code(),
            "message": error.to_string(),
            "fallback": error.is_fallback(),
            "error": error,
        });
        println!("{}", json_pretty(&json)?);
    } else {
        println!("{} error {}: {error}", error.tool(), error.code());
        if error.is_fallback() {
            println!("(no known message in the output; classified by exit code)");
        }
    }
    Ok(EXIT_SUCCESS)
}
