// ===============================
// src/system.rs (host CPU / memory / disk gauges)
// ===============================
//
// A 1s sampler keeps cpu_usage_percent, memory_usage_percent and
// disk_usage_percent fresh; /metrics/system reads them back.
//
use std::path::Path;
use std::time::Duration;

use sysinfo::{Disks, System};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::metrics::{CPU_USAGE, DISK_USAGE, MEMORY_USAGE};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SystemUsage {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
}

fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    used as f64 / total as f64 * 100.0
}

pub struct SystemSampler {
    system: System,
    disks: Disks,
}

impl SystemSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        // cpu usage is a delta, the first refresh only sets the baseline
        system.refresh_cpu();
        system.refresh_memory();
        Self { system, disks: Disks::new_with_refreshed_list() }
    }

    /// Disk mounted at `/`, else the first one listed.
    fn disk_percent(&self) -> f64 {
        let list = self.disks.list();
        let disk = list
            .iter()
            .find(|d| d.mount_point() == Path::new("/"))
            .or_else(|| list.first());
        match disk {
            Some(d) => percent(d.total_space().saturating_sub(d.available_space()), d.total_space()),
            None => 0.0,
        }
    }

    /// Refresh host stats and publish them on the gauges.
    pub fn refresh(&mut self) -> SystemUsage {
        self.system.refresh_cpu();
        self.system.refresh_memory();
        self.disks.refresh();

        let usage = SystemUsage {
            cpu_percent: f64::from(self.system.global_cpu_info().cpu_usage()),
            memory_percent: percent(self.system.used_memory(), self.system.total_memory()),
            disk_percent: self.disk_percent(),
        };
        CPU_USAGE.set(usage.cpu_percent);
        MEMORY_USAGE.set(usage.memory_percent);
        DISK_USAGE.set(usage.disk_percent);
        usage
    }
}

impl Default for SystemSampler {
    fn default() -> Self { Self::new() }
}

/// Sample forever every `every`.
pub async fn run(every: Duration) {
    let mut sampler = SystemSampler::new();
    let mut tick = interval(every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(every_ms = every.as_millis() as u64, "system metrics sampler started");
    loop {
        tick.tick().await;
        let u = sampler.refresh();
        debug!(cpu = u.cpu_percent, mem = u.memory_percent, disk = u.disk_percent, "system usage");
    }
}
