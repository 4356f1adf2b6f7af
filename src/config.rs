//! Run configuration.
//!
//! One [`Config`] is built at startup (JSON file, then command-line
//! overrides) and handed to whatever needs it. Nothing here is global.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::node::NodeConfig;

pub const BASE_LOG_NAME: &str = "LOGGED_CPU.csv";
pub const POWER_LOG_NAME: &str = "loggedPowerOutput.csv";

/// Which schema the sampler writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogMode {
    Base,
    Power,
}

impl LogMode {
    pub fn include_power(self) -> bool {
        self == LogMode::Power
    }

    fn default_interval(self) -> Duration {
        match self {
            LogMode::Base => Duration::from_secs(1),
            // A power capture alone costs about a second plus tool overhead.
            LogMode::Power => Duration::from_secs(5),
        }
    }

    fn default_file_name(self) -> &'static str {
        match self {
            LogMode::Base => BASE_LOG_NAME,
            LogMode::Power => POWER_LOG_NAME,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub sampler: SamplerConfig,
    pub powertop: PowertopConfig,
    pub node: NodeConfig,
}

impl Config {
    /// Read a JSON config file, or use defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path)
            .map_err(|err| Error::io(err, format!("failed to read config {}", path.display())))?;
        serde_json::from_str(&text).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Log file. Defaults to a mode-specific name in [`default_data_dir`].
    pub output: Option<PathBuf>,
    /// Seconds between ticks. Defaults to 1, or 5 with power reporting.
    pub interval_secs: Option<f64>,
    /// Any path on the filesystem whose usage is logged.
    pub disk_root: PathBuf,
    /// Nominal elapsed sampling time between progress messages.
    pub progress_every_secs: f64,
    /// Print a line after every row. Defaults to on in power mode.
    pub announce_samples: Option<bool>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            output: None,
            interval_secs: None,
            disk_root: PathBuf::from("/"),
            progress_every_secs: 3600.0,
            announce_samples: None,
        }
    }
}

impl SamplerConfig {
    pub fn output_path(&self, mode: LogMode) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| default_data_dir().join(mode.default_file_name()))
    }

    pub fn interval(&self, mode: LogMode) -> Result<Duration> {
        match self.interval_secs {
            Some(secs) => positive_secs("sampler.interval_secs", secs),
            None => Ok(mode.default_interval()),
        }
    }

    pub fn progress_every(&self) -> Result<Duration> {
        positive_secs("sampler.progress_every_secs", self.progress_every_secs)
    }

    pub fn announce_samples(&self, mode: LogMode) -> bool {
        self.announce_samples.unwrap_or(mode.include_power())
    }
}

/// Settings for the PowerTOP-backed power report provider.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct PowertopConfig {
    pub binary: PathBuf,
    /// Where the tool writes its CSV report. Truncated before each capture.
    pub report_path: PathBuf,
    pub capture_secs: u64,
    /// Extra time allowed past `capture_secs` before the capture is killed.
    pub capture_grace_secs: f64,
    /// Process whose power contribution is reported.
    pub subsystem: String,
    pub install_command: Vec<String>,
    pub launch_command: Vec<String>,
}

impl Default for PowertopConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("powertop"),
            report_path: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("powertop.csv"),
            capture_secs: 1,
            capture_grace_secs: 10.0,
            subsystem: "./Signatures.o".to_string(),
            install_command: ["apt-get", "install", "-y", "powertop"]
                .map(String::from)
                .to_vec(),
            launch_command: ["gnome-terminal", "--", "powertop"]
                .map(String::from)
                .to_vec(),
        }
    }
}

impl PowertopConfig {
    pub fn capture(&self) -> Duration {
        Duration::from_secs(self.capture_secs)
    }

    pub fn capture_deadline(&self) -> Result<Duration> {
        let grace = if self.capture_grace_secs == 0.0 {
            Duration::ZERO
        } else {
            positive_secs("powertop.capture_grace_secs", self.capture_grace_secs)?
        };
        Ok(self.capture() + grace)
    }
}

fn positive_secs(field: &'static str, secs: f64) -> Result<Duration> {
    match Duration::try_from_secs_f64(secs) {
        Ok(duration) if !duration.is_zero() => Ok(duration),
        _ => Err(Error::InvalidConfig {
            field,
            value: secs.to_string(),
        }),
    }
}

/// `~/Desktop`, or `/media/<user>/Blockchains` when that drive is mounted.
pub fn default_data_dir() -> PathBuf {
    if let Ok(user) = std::env::var("USER") {
        let external = Path::new("/media").join(user).join("Blockchains");
        if external.is_dir() {
            return external;
        }
    }
    dirs::desktop_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Desktop")))
        .unwrap_or_else(|| PathBuf::from("."))
}
