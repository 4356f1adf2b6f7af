use chrono::{DateTime, Local};

use super::{Field, PowerReport};

/// Bytes used and percent used of some capacity (memory, swap, a filesystem).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Usage {
    pub used_bytes: u64,
    pub percent: f64,
}

impl Usage {
    /// Percent is rounded to one decimal place, as the legacy logs were.
    pub fn from_totals(used_bytes: u64, total_bytes: u64) -> Self {
        let percent = if total_bytes == 0 {
            0.0
        } else {
            round1(used_bytes as f64 / total_bytes as f64 * 100.0)
        };
        Self {
            used_bytes,
            percent,
        }
    }
}

pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// One host-metrics reading. Built fresh on every tick.
#[derive(Clone, Debug)]
pub struct MetricsSample {
    pub timestamp: DateTime<Local>,
    pub cpu_percent: Field<f64>,
    pub cpu_frequency_mhz: Field<f64>,
    pub mem_percent: Field<f64>,
    pub mem_used_bytes: Field<u64>,
    pub swap_percent: Field<f64>,
    pub swap_used_bytes: Field<u64>,
    pub disk_percent: Field<f64>,
    pub disk_used_bytes: Field<u64>,
}

impl MetricsSample {
    pub const COLUMNS: [&'static str; 10] = [
        "Timestamp",
        "Timestamp (Seconds)",
        "CPU %",
        "CPU Frequency",
        "Virtual Memory %",
        "Virtual Memory",
        "Swap Memory %",
        "Swap Memory",
        "Disk Usage %",
        "Disk Usage",
    ];

    /// Unix time with microsecond precision.
    pub fn unix_seconds(&self) -> f64 {
        self.timestamp.timestamp_micros() as f64 / 1_000_000.0
    }

    /// Field values in [`Self::COLUMNS`] order.
    pub fn values(&self) -> Vec<String> {
        vec![
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
            format!("{:?}", self.unix_seconds()),
            self.cpu_percent.render(),
            self.cpu_frequency_mhz.render(),
            self.mem_percent.render(),
            self.mem_used_bytes.render(),
            self.swap_percent.render(),
            self.swap_used_bytes.render(),
            self.disk_percent.render(),
            self.disk_used_bytes.render(),
        ]
    }

    /// Names of the fields that fell back to defaults, for diagnostics.
    pub fn degraded_fields(&self) -> Vec<&'static str> {
        let flags = [
            ("cpu_percent", self.cpu_percent.is_defaulted()),
            ("cpu_frequency_mhz", self.cpu_frequency_mhz.is_defaulted()),
            ("mem_percent", self.mem_percent.is_defaulted()),
            ("mem_used_bytes", self.mem_used_bytes.is_defaulted()),
            ("swap_percent", self.swap_percent.is_defaulted()),
            ("swap_used_bytes", self.swap_used_bytes.is_defaulted()),
            ("disk_percent", self.disk_percent.is_defaulted()),
            ("disk_used_bytes", self.disk_used_bytes.is_defaulted()),
        ];
        flags
            .into_iter()
            .filter_map(|(name, defaulted)| defaulted.then_some(name))
            .collect()
    }
}

/// Everything written for one tick: host metrics plus the power report when
/// power logging is enabled.
#[derive(Clone, Debug)]
pub struct Sample {
    pub metrics: MetricsSample,
    pub power: Option<PowerReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_percent_rounds_to_one_decimal() {
        let usage = Usage::from_totals(1, 3);
        assert_eq!(usage.percent, 33.3);
        assert_eq!(usage.used_bytes, 1);
    }

    #[test]
    fn usage_with_zero_total_is_zero_percent() {
        assert_eq!(Usage::from_totals(0, 0).percent, 0.0);
    }
}
