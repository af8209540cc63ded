use super::{run_request, RunContext};
use spindle_schema::parse_request_file;
use std::path::Path;
use tracing::debug;

pub fn run(ctx: &RunContext<'_>, path: &Path) -> Result<u8, String> {
    let request = parse_request_file(path).map_err(|e| format!("request error: {e}"))?;
    debug!("loaded {} request from {}", request.kind(), path.display());
    run_request(ctx, &request)
}
