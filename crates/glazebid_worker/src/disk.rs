//! Disk guard and process observation.
//!
//! The temp volume is shared by every job on the host; when usage meets
//! the pressure threshold the scheduler stops claiming work. Readings
//! come from sysinfo; a volume we cannot observe reads as 0.0 so an
//! observation failure never wedges the worker.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use sysinfo::{Disks, ProcessesToUpdate, System};
use tracing::{info, warn};

/// Percent used on the volume holding `temp_dir`, or 0.0 when the volume
/// cannot be observed.
pub fn usage_pct(temp_dir: &Path) -> f64 {
    let disks = Disks::new_with_refreshed_list();

    // The disk whose mount point is the longest prefix of the temp dir
    // is the volume the temp dir lives on.
    let best = disks
        .iter()
        .filter(|d| temp_dir.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len());

    match best {
        Some(disk) if disk.total_space() > 0 => {
            let used = disk.total_space() - disk.available_space();
            let pct = used as f64 / disk.total_space() as f64 * 100.0;
            (pct * 10.0).round() / 10.0
        }
        _ => {
            warn!("Could not read disk usage for {}", temp_dir.display());
            0.0
        }
    }
}

/// True when usage meets or exceeds the threshold (inclusive).
pub fn is_pressure(temp_dir: &Path, threshold_pct: f64) -> bool {
    let pct = usage_pct(temp_dir);
    if pct >= threshold_pct {
        warn!(
            "Disk pressure detected: {:.1}% used (threshold {:.0}%)",
            pct, threshold_pct
        );
        return true;
    }
    false
}

/// Resident memory of this process in MB, for heartbeats.
pub fn memory_usage_mb() -> f64 {
    let Ok(pid) = sysinfo::get_current_pid() else {
        return 0.0;
    };
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system
        .process(pid)
        .map(|p| p.memory() as f64 / (1024.0 * 1024.0))
        .unwrap_or(0.0)
}

/// Startup sweep: delete every job temp dir whose job is not currently
/// locked. Creates the temp root when absent.
pub fn cleanup_orphan_temp_dirs(temp_dir: &Path, locked_job_ids: &HashSet<String>) {
    if !temp_dir.exists() {
        if let Err(e) = fs::create_dir_all(temp_dir) {
            warn!("Could not create temp root {}: {}", temp_dir.display(), e);
        }
        return;
    }

    let entries = match fs::read_dir(temp_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Could not list temp root {}: {}", temp_dir.display(), e);
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if locked_job_ids.contains(&name) {
            continue;
        }
        info!("Cleaning orphan temp dir {}", path.display());
        let _ = fs::remove_dir_all(&path);
    }
}

/// Best-effort removal of one job's temp dir; a missing directory is not
/// an error.
pub fn cleanup_job_temp(temp_dir: &Path, job_id: &str) {
    let job_dir = temp_dir.join(job_id);
    if job_dir.exists() {
        let _ = fs::remove_dir_all(&job_dir);
        info!("Cleaned up temp dir {}", job_dir.display());
    }
}
