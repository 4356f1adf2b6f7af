use std::path::Path;
use std::time::Duration;

use crate::model::{Degraded, PowerReport, Usage};

pub mod host;
pub mod powertop;

pub use host::SysinfoCollector;
pub use powertop::{PowertopCollector, ReportGrammar};

/// Instantaneous host resource readings.
///
/// Every call reflects a fresh OS snapshot. Failures are reported as a
/// [`Degraded`] reason, never as a fatal error.
pub trait HostMetricsProvider {
    /// Global CPU utilization since the previous call, in percent.
    fn cpu_percent(&mut self) -> Result<f64, Degraded>;

    /// Current CPU frequency. Many VMs and containers cannot report this.
    fn cpu_frequency_mhz(&mut self) -> Result<f64, Degraded>;

    fn virtual_memory(&mut self) -> Result<Usage, Degraded>;

    fn swap_memory(&mut self) -> Result<Usage, Degraded>;

    /// Usage of the filesystem that contains `root`.
    fn disk_usage(&mut self, root: &Path) -> Result<Usage, Degraded>;
}

/// Outcome of the one-time power tool setup gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolStatus {
    AlreadyRunning,
    Started,
}

/// An external power-profiling tool that produces a textual report.
pub trait PowerReportProvider {
    fn is_running(&mut self) -> bool;

    /// No-op when the tool already runs. Starts it when installed; when it
    /// is missing, installs it and returns
    /// [`Error::SetupRequired`](crate::Error::SetupRequired) with operator
    /// instructions.
    fn ensure_tool_running(&mut self) -> crate::Result<ToolStatus>;

    /// Run the tool for `duration` and return the raw report text.
    fn capture_report(&mut self, duration: Duration) -> Result<String, Degraded>;

    /// Each field is matched on its own; misses default independently.
    fn parse_report(&self, raw: &str) -> PowerReport;
}
