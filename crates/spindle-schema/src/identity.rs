use crate::phase::OperationKind;
use crate::types::{DeviceId, RunId};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static RUN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Identity of one pipeline run.
///
/// The run id names the run's temp directory and log file, so two runs in
/// the same process or on the same host must never share one.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RunIdentity {
    pub run_id: RunId,
    /// Full blake3 digest the short id was cut from.
    pub digest: String,
}

/// Derive a fresh run identity from the operation, its device, the clock,
/// the process id, and a process-wide counter.
pub fn generate_run_id(kind: OperationKind, device: &DeviceId) -> RunIdentity {
    let mut hasher = blake3::Hasher::new();

    hasher.update(format!("op:{kind}").as_bytes());
    hasher.update(format!("dev:{device}").as_bytes());

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos());
    hasher.update(format!("t:{nanos}").as_bytes());
    hasher.update(format!("pid:{}", std::process::id()).as_bytes());
    let seq = RUN_COUNTER.fetch_add(1, Ordering::Relaxed);
    hasher.update(format!("seq:{seq}").as_bytes());

    let hex = hasher.finalize().to_hex().to_string();
    let short = hex[..12].to_owned();

    RunIdentity {
        run_id: RunId::new(short),
        digest: hex,
    }
}
