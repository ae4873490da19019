use crate::probes::ProbeError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use sysinfo::{CpuExt, DiskExt, System, SystemExt};

#[derive(Debug, Clone, PartialEq)]
pub struct DiskUsage {
    pub mount: PathBuf,
    pub total_bytes: u64,
    pub used_bytes: u64,
}

impl DiskUsage {
    pub fn percent(&self) -> f64 {
        percent(self.used_bytes, self.total_bytes)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSnapshot {
    pub cpu_percent: f64,
    pub memory_total_bytes: u64,
    pub memory_used_bytes: u64,
    /// Volume holding the current working directory, when one could be matched.
    pub disk: Option<DiskUsage>,
}

impl ResourceSnapshot {
    pub fn memory_percent(&self) -> f64 {
        percent(self.memory_used_bytes, self.memory_total_bytes)
    }
}

pub fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        used as f64 / total as f64 * 100.0
    }
}

/// Take a system-wide snapshot; CPU usage is averaged over `window`.
pub async fn probe_resources(window: Duration) -> Result<ResourceSnapshot, ProbeError> {
    if !System::IS_SUPPORTED {
        return Err(ProbeError::Unavailable {
            facility: "resource statistics",
            reason: "sysinfo does not support this platform".to_string(),
        });
    }

    let mut system = System::new();
    system.refresh_cpu();
    tokio::time::sleep(window.max(System::MINIMUM_CPU_UPDATE_INTERVAL)).await;
    system.refresh_cpu();
    system.refresh_memory();
    system.refresh_disks_list();
    system.refresh_disks();

    let cwd = std::env::current_dir().map_err(|source| ProbeError::Io {
        path: ".".to_string(),
        source,
    })?;
    let disks: Vec<DiskUsage> = system
        .disks()
        .iter()
        .map(|d| {
            let total = d.total_space();
            DiskUsage {
                mount: d.mount_point().to_path_buf(),
                total_bytes: total,
                used_bytes: total.saturating_sub(d.available_space()),
            }
        })
        .collect();

    Ok(ResourceSnapshot {
        cpu_percent: system.global_cpu_info().cpu_usage() as f64,
        memory_total_bytes: system.total_memory(),
        memory_used_bytes: system.used_memory(),
        disk: disk_for_path(&disks, &cwd).cloned(),
    })
}

/// The disk whose mount point is the longest prefix of `path`.
pub fn disk_for_path<'a>(disks: &'a [DiskUsage], path: &Path) -> Option<&'a DiskUsage> {
    disks
        .iter()
        .filter(|d| path.starts_with(&d.mount))
        .max_by_key(|d| d.mount.components().count())
}

pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
