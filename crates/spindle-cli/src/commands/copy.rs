use super::{run_request, RunContext};
use spindle_schema::{CopyRequest, DeviceId, MediaCapacity, OperationRequest, WriteOptions};

pub fn run(
    ctx: &RunContext<'_>,
    from: &str,
    to: &str,
    options: WriteOptions,
    capacity: MediaCapacity,
) -> Result<u8, String> {
    let request = OperationRequest::Copy(CopyRequest {
        source_device: DeviceId::new(from),
        target_device: DeviceId::new(to),
        options,
        capacity,
    });
    run_request(ctx, &request)
}
