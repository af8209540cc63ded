use super::{run_request, RunContext};
use spindle_schema::{BlankMode, DeviceId, EraseRequest, OperationRequest, WriteOptions};

pub fn run(
    ctx: &RunContext<'_>,
    device: &str,
    mode: BlankMode,
    options: WriteOptions,
) -> Result<u8, String> {
    let request = OperationRequest::Erase(EraseRequest {
        device: DeviceId::new(device),
        mode,
        options,
    });
    run_request(ctx, &request)
}
