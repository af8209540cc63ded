use super::{run_request, RunContext};
use spindle_schema::{DeviceId, OperationRequest, ReadRequest};
use std::path::Path;

pub fn run(ctx: &RunContext<'_>, device: &str, output: &Path, overwrite: bool) -> Result<u8, String> {
    let request = OperationRequest::Read(ReadRequest {
        device: DeviceId::new(device),
        destination: output.to_path_buf(),
        overwrite,
    });
    run_request(ctx, &request)
}
