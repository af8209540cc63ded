use super::{run_request, RunContext};
use spindle_schema::{DeviceId, ExtractRequest, OperationRequest};
use std::path::Path;

/// An empty `tracks` extracts every track on the disc.
pub fn run(
    ctx: &RunContext<'_>,
    device: &str,
    output: &Path,
    tracks: Vec<u32>,
) -> Result<u8, String> {
    let request = OperationRequest::Extract(ExtractRequest {
        device: DeviceId::new(device),
        destination: output.to_path_buf(),
        tracks,
    });
    run_request(ctx, &request)
}
