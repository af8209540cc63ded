use super::{EXIT_FAILURE, EXIT_SUCCESS};
use spindle_core::{DeviceLock, EngineConfig, ExecutorKind};
use spindle_runtime::check_tool_prereqs;
use spindle_schema::{DeviceId, Tool};
use std::path::Path;

pub fn run(config: &EngineConfig, json_output: bool) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    check_tools(config, &mut checks, &mut all_pass);
    check_dir("temp_root", "Temp root", &config.temp_root, &mut checks, &mut all_pass);
    check_dir("log_dir", "Log directory", &config.log_dir, &mut checks, &mut all_pass);
    check_dir("lock_dir", "Lock directory", &config.lock_dir, &mut checks, &mut all_pass);
    check_locks(config, &mut checks);
    check_disk_space(&config.temp_root, &mut checks);

    print_results(&checks, all_pass, json_output)
}

fn check_tools(config: &EngineConfig, checks: &mut Vec<Check>, all_pass: &mut bool) {
    if config.executor == ExecutorKind::Scripted {
        checks.push(Check::info(
            "tools",
            &format!(
                "Scripted executor: no tools are run ({} scripts configured)",
                config.scripts.len()
            ),
        ));
        return;
    }
    let missing = check_tool_prereqs(config.tools.all());
    if missing.is_empty() {
        checks.push(Check::pass("tools", "All configured tools found on PATH"));
        return;
    }
    for m in &missing {
        // A missing mkisofs only stops file burns; cdrecord is needed by every write.
        let name = format!("tool_{}", m.tool);
        let message = format!(
            "{} not found ({}); install: {}",
            m.program, m.purpose, m.install_hint
        );
        if m.tool == Tool::Cdrecord {
            *all_pass = false;
            checks.push(Check::fail(&name, &message));
        } else {
            checks.push(Check::warn(&name, &message));
        }
    }
}

fn check_dir(name: &str, label: &str, dir: &Path, checks: &mut Vec<Check>, all_pass: &mut bool) {
    if let Err(e) = std::fs::create_dir_all(dir) {
        *all_pass = false;
        checks.push(Check::fail(
            name,
            &format!("{label} {} cannot be created: {e}", dir.display()),
        ));
        return;
    }
    match tempfile::tempfile_in(dir) {
        Ok(_) => checks.push(Check::pass(
            name,
            &format!("{label} {} is writable", dir.display()),
        )),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                name,
                &format!("{label} {} is not writable: {e}", dir.display()),
            ));
        }
    }
}

fn check_locks(config: &EngineConfig, checks: &mut Vec<Check>) {
    let Ok(entries) = std::fs::read_dir(&config.lock_dir) else {
        return;
    };
    // Lock file stems are already lock-safe names, so they round-trip as device ids.
    let held = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let path = entry.path();
            if path.extension()? != "lock" {
                return None;
            }
            path.file_stem()?.to_str().map(DeviceId::new)
        })
        .filter(|device| matches!(DeviceLock::try_acquire(&config.lock_dir, device), Ok(None)))
        .count();
    if held == 0 {
        checks.push(Check::pass("device_locks", "No device is held by a run"));
    } else {
        checks.push(Check::warn(
            "device_locks",
            &format!("{held} device(s) held by a running operation"),
        ));
    }
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> Result<u8, String> {
    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "status": c.status,
                "message": c.message,
            })).collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?
        );
    } else {
        println!("Spindle Doctor\n");
        for check in checks {
            let icon = match check.status.as_str() {
                "pass" => "✓",
                "fail" => "✗",
                "warn" => "⚠",
                _ => "ℹ",
            };
            println!("  {icon} {}", check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

struct Check {
    name: String,
    status: String,
    message: String,
}

impl Check {
    fn new(name: &str, status: &str, message: &str) -> Self {
        Self {
            name: name.to_owned(),
            status: status.to_owned(),
            message: message.to_owned(),
        }
    }

    fn pass(name: &str, message: &str) -> Self {
        Self::new(name, "pass", message)
    }

    fn fail(name: &str, message: &str) -> Self {
        Self::new(name, "fail", message)
    }

    fn warn(name: &str, message: &str) -> Self {
        Self::new(name, "warn", message)
    }

    fn info(name: &str, message: &str) -> Self {
        Self::new(name, "info", message)
    }
}

fn check_disk_space(temp_root: &Path, checks: &mut Vec<Check>) {
    let Ok(c_path) = std::ffi::CString::new(temp_root.to_string_lossy().as_bytes()) else {
        return;
    };

    // SAFETY: zeroed statvfs is a valid initial state for the struct.
    #[allow(unsafe_code, clippy::undocumented_unsafe_blocks)]
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    // SAFETY: the path is NUL-terminated and the output struct lives on the
    // stack; it is only read when the call returns 0.
    #[allow(unsafe_code, clippy::undocumented_unsafe_blocks)]
    let ret = unsafe { libc::statvfs(c_path.as_ptr(), &raw mut stat) };
    if ret != 0 {
        return;
    }

    #[allow(clippy::useless_conversion)]
    let avail_mb = u64::from(stat.f_bavail) * u64::from(stat.f_frsize) / (1024 * 1024);

    // A DVD image needs up to 4.7 GB of scratch space; a CD image 700 MB.
    if avail_mb < 800 {
        checks.push(Check::fail(
            "disk_space",
            &format!("Temp root has {avail_mb} MB free; a CD image needs about 700 MB"),
        ));
    } else if avail_mb < 4800 {
        checks.push(Check::warn(
            "disk_space",
            &format!("Temp root has {avail_mb} MB free; enough for CDs but not DVD images"),
        ));
    } else {
        checks.push(Check::pass(
            "disk_space",
            &format!("Temp root has {} GB free", avail_mb / 1024),
        ));
    }
}
