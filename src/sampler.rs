//! The sampling loop: sample, append, flush, sleep, until cancelled.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Local;
use tracing::{debug, error, info};

use crate::collectors::{HostMetricsProvider, PowerReportProvider};
use crate::error::Result;
use crate::logfile::LogFile;
use crate::model::{Field, MetricsSample, PowerReport, Sample, Usage};

/// Longest uninterrupted sleep between cancellation checks.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Reads one [`Sample`] per call from the configured providers.
pub struct Sampler<H> {
    host: H,
    power: Option<Box<dyn PowerReportProvider>>,
    disk_root: PathBuf,
    capture: Duration,
}

impl<H: HostMetricsProvider> Sampler<H> {
    pub fn new(host: H, disk_root: impl Into<PathBuf>) -> Self {
        Self {
            host,
            power: None,
            disk_root: disk_root.into(),
            capture: Duration::from_secs(1),
        }
    }

    /// Add a power report to every sample, captured over `capture`.
    pub fn with_power(mut self, provider: Box<dyn PowerReportProvider>, capture: Duration) -> Self {
        self.power = Some(provider);
        self.capture = capture;
        self
    }

    /// Read every field once. Provider failures never escape: each failed
    /// field carries its default and the reason.
    pub fn sample_once(&mut self) -> Sample {
        let timestamp = Local::now();
        let cpu_percent = Field::from_result(self.host.cpu_percent(), 0.0);
        let cpu_frequency_mhz = Field::from_result(self.host.cpu_frequency_mhz(), 0.0);
        let (mem_percent, mem_used_bytes) = split(Field::from_result(self.host.virtual_memory(), Usage::default()));
        let (swap_percent, swap_used_bytes) = split(Field::from_result(self.host.swap_memory(), Usage::default()));
        let (disk_percent, disk_used_bytes) =
            split(Field::from_result(self.host.disk_usage(&self.disk_root), Usage::default()));

        let metrics = MetricsSample {
            timestamp,
            cpu_percent,
            cpu_frequency_mhz,
            mem_percent,
            mem_used_bytes,
            swap_percent,
            swap_used_bytes,
            disk_percent,
            disk_used_bytes,
        };
        let degraded = metrics.degraded_fields();
        if !degraded.is_empty() {
            debug!(fields = ?degraded, "host metrics degraded to defaults");
        }

        Sample {
            metrics,
            power: self.power_report(),
        }
    }

    /// Capture and parse one power report, or `None` when power is disabled.
    pub fn power_report(&mut self) -> Option<PowerReport> {
        let capture = self.capture;
        let provider = self.power.as_mut()?;
        let report = match provider.capture_report(capture) {
            Ok(raw) => provider.parse_report(&raw),
            Err(reason) => {
                debug!(%reason, "power report unavailable");
                PowerReport::defaulted(reason)
            }
        };
        let degraded = report.degraded_fields();
        if !degraded.is_empty() {
            debug!(fields = ?degraded, "power fields degraded to defaults");
        }
        Some(report)
    }
}

fn split(usage: Field<Usage>) -> (Field<f64>, Field<u64>) {
    (usage.clone().map(|u| u.percent), usage.map(|u| u.used_bytes))
}

/// Loop timing and operator feedback.
#[derive(Clone, Debug)]
pub struct RunOptions {
    pub interval: Duration,
    /// Nominal sampling time between progress messages.
    pub progress_every: Duration,
    /// Print `Logged sample #N` (`power sample` with power) after every row.
    pub announce_samples: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            progress_every: Duration::from_secs(3600),
            announce_samples: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
}

#[derive(Clone, Debug)]
pub struct RunSummary {
    pub path: PathBuf,
    pub rows: u64,
    pub stop: StopReason,
}

/// Sample into `log` every `options.interval` until `cancel` is set.
///
/// Cancellation is checked before each tick and throughout the sleep; a
/// row already being sampled is still written. Progress lines go to `out`.
/// A failed write is fatal: whatever was buffered is flushed and the error
/// returned. In every case `log` is consumed.
pub fn run<H, W, O>(
    sampler: &mut Sampler<H>,
    mut log: LogFile<W>,
    options: &RunOptions,
    cancel: &AtomicBool,
    out: &mut O,
) -> Result<RunSummary>
where
    H: HostMetricsProvider,
    W: Write,
    O: Write,
{
    info!(path = %log.path().display(), interval = ?options.interval, power = log.include_power(), "sampling started");
    let mut elapsed = Duration::ZERO;
    let mut next_progress = options.progress_every;

    while !cancel.load(Ordering::SeqCst) {
        let sample = sampler.sample_once();
        if let Err(err) = log.append(&sample) {
            error!(%err, rows = log.rows(), "log write failed, stopping");
            log.salvage();
            return Err(err);
        }

        if options.announce_samples {
            let kind = if log.include_power() { "power sample" } else { "sample" };
            let _ = writeln!(out, "Logged {kind} #{}", log.rows());
        }

        elapsed += options.interval;
        if !options.progress_every.is_zero() && elapsed >= next_progress {
            let message = describe_progress(elapsed);
            info!(rows = log.rows(), "{message}");
            let _ = writeln!(out, "{message}");
            next_progress += options.progress_every;
        }

        if !sleep_unless_cancelled(options.interval, cancel) {
            break;
        }
    }

    let summary = RunSummary {
        path: log.path().to_path_buf(),
        rows: log.rows(),
        stop: StopReason::Cancelled,
    };
    log.close()?;
    info!(rows = summary.rows, "sampling stopped");
    Ok(summary)
}

fn describe_progress(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs >= 3600.0 {
        format!("Logged {:.1} hours", secs / 3600.0)
    } else if secs >= 60.0 {
        format!("Logged {:.1} minutes", secs / 60.0)
    } else {
        format!("Logged {secs:.1} seconds")
    }
}

/// Returns `false` if cancelled before `total` elapsed.
fn sleep_unless_cancelled(total: Duration, cancel: &AtomicBool) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if cancel.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_wording() {
        assert_eq!(describe_progress(Duration::from_secs(3600)), "Logged 1.0 hours");
        assert_eq!(describe_progress(Duration::from_secs(7200)), "Logged 2.0 hours");
        assert_eq!(describe_progress(Duration::from_secs(90)), "Logged 1.5 minutes");
        assert_eq!(describe_progress(Duration::from_secs(3)), "Logged 3.0 seconds");
    }

    #[test]
    fn sleep_returns_early_when_cancelled() {
        let cancel = AtomicBool::new(true);
        let start = Instant::now();
        assert!(!sleep_unless_cancelled(Duration::from_secs(10), &cancel));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn sleep_completes_when_not_cancelled() {
        let cancel = AtomicBool::new(false);
        assert!(sleep_unless_cancelled(Duration::from_millis(10), &cancel));
    }
}
