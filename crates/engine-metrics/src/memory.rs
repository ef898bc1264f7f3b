use sysinfo::{Pid, ProcessesToUpdate, System};

/// Current process's resident memory, in megabytes, read from `sysinfo`.
/// Used as the before/after sample bracketing each step (§4.7).
pub fn current_process_memory_mb() -> u64 {
    let mut sys = System::new();
    let pid = Pid::from_u32(std::process::id());
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    sys.process(pid).map(|p| p.memory() / 1024 / 1024).unwrap_or(0)
}
