use super::HostMetricsProvider;
use crate::model::{Degraded, Usage, round1};
use std::path::Path;
use sysinfo::{Disks, System};

/// Host metrics backed by `sysinfo`.
pub struct SysinfoCollector {
    sys: System,
    disks: Disks,
}

impl SysinfoCollector {
    pub fn new() -> Self {
        let mut sys = System::new();
        // CPU usage is a delta between refreshes; prime it so the first
        // sample has a baseline.
        sys.refresh_cpu_usage();
        sys.refresh_memory();
        Self {
            sys,
            disks: Disks::new_with_refreshed_list(),
        }
    }
}

impl Default for SysinfoCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl HostMetricsProvider for SysinfoCollector {
    fn cpu_percent(&mut self) -> Result<f64, Degraded> {
        self.sys.refresh_cpu_usage();
        if self.sys.cpus().is_empty() {
            return Err(Degraded::unavailable("no CPUs reported"));
        }
        Ok(round1(f64::from(self.sys.global_cpu_usage())))
    }

    fn cpu_frequency_mhz(&mut self) -> Result<f64, Degraded> {
        self.sys.refresh_cpu_frequency();
        match self.sys.cpus().first().map(|cpu| cpu.frequency()) {
            Some(mhz) if mhz > 0 => Ok(mhz as f64),
            _ => Err(Degraded::unavailable("CPU frequency not reported by this platform")),
        }
    }

    fn virtual_memory(&mut self) -> Result<Usage, Degraded> {
        self.sys.refresh_memory();
        let total = self.sys.total_memory();
        if total == 0 {
            return Err(Degraded::unavailable("total memory reported as 0"));
        }
        Ok(Usage::from_totals(self.sys.used_memory(), total))
    }

    fn swap_memory(&mut self) -> Result<Usage, Degraded> {
        // Already refreshed with memory, but swap may be sampled on its own.
        self.sys.refresh_memory();
        Ok(Usage::from_totals(self.sys.used_swap(), self.sys.total_swap()))
    }

    fn disk_usage(&mut self, root: &Path) -> Result<Usage, Degraded> {
        self.disks.refresh(true);
        // The filesystem holding `root` is the one with the deepest mount point.
        let disk = self
            .disks
            .list()
            .iter()
            .filter(|disk| root.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().components().count())
            .ok_or_else(|| Degraded::unavailable(format!("no filesystem mounted at {}", root.display())))?;

        let total = disk.total_space();
        if total == 0 {
            return Err(Degraded::unavailable(format!(
                "{} reports zero capacity",
                disk.mount_point().display()
            )));
        }
        let used = total.saturating_sub(disk.available_space());
        Ok(Usage::from_totals(used, total))
    }
}
