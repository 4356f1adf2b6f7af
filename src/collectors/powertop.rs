use super::{PowerReportProvider, ToolStatus};
use crate::config::PowertopConfig;
use crate::error::{Error, Result};
use crate::model::{Degraded, Field, PowerReport};
use crate::process;
use regex::Regex;
use std::ffi::OsString;
use std::fs;
use std::process::{Command, Stdio};
use std::sync::LazyLock;
use std::time::Duration;
use sysinfo::{ProcessesToUpdate, System};
use tracing::{debug, info, warn};

static TOOL_VERSION: LazyLock<Regex> =
    LazyLock::new(|| labelled("PowerTOP Version"));
static KERNEL_VERSION: LazyLock<Regex> =
    LazyLock::new(|| labelled("Kernel Version"));
static SYSTEM_NAME: LazyLock<Regex> =
    LazyLock::new(|| labelled("System Name"));
static CPU_INFO: LazyLock<Regex> =
    LazyLock::new(|| labelled("CPU Information"));
static OS_INFO: LazyLock<Regex> =
    LazyLock::new(|| labelled("OS Information"));
static DISCHARGE: LazyLock<Regex> =
    LazyLock::new(|| measured("The battery reports a discharge rate of:"));
static BASELINE: LazyLock<Regex> =
    LazyLock::new(|| measured("The system baseline power is estimated at:"));

/// `Label;value` lines from the report header.
fn labelled(label: &str) -> Regex {
    Regex::new(&format!(r"^{};([^;\r\n]+)", regex::escape(label))).expect("escaped label is a valid pattern")
}

/// `Sentence: 12.3 W` lines; captures the number and the unit.
fn measured(sentence: &str) -> Regex {
    Regex::new(&format!(r"^{}\s*([0-9.]+)\s*([^0-9.;\s][^;\r\n]*)", regex::escape(sentence)))
        .expect("escaped sentence is a valid pattern")
}

/// Line grammar of a PowerTOP CSV report.
///
/// Every field is matched independently against the first report line
/// that fits its pattern. A field with no matching line falls back to its
/// default with [`Degraded::ParseMismatch`].
#[derive(Clone, Debug)]
pub struct ReportGrammar {
    subsystem: Regex,
}

impl ReportGrammar {
    /// `subsystem` is the process name whose power line is reported, e.g.
    /// `./Signatures.o`.
    pub fn new(subsystem: &str) -> Self {
        let pattern = format!(r"^[^\]]+\] {} ; +([0-9.]+) ([a-zA-Z]+)", regex::escape(subsystem));
        Self {
            subsystem: Regex::new(&pattern).expect("escaped subsystem is a valid pattern"),
        }
    }

    pub fn parse(&self, raw: &str) -> PowerReport {
        let (discharge_rate, discharge_unit) = measurement(raw, &DISCHARGE, "discharge_rate", "discharge_unit");
        let (baseline_power, baseline_unit) = measurement(raw, &BASELINE, "baseline_power", "baseline_unit");
        let (signature_power, signature_unit) =
            measurement(raw, &self.subsystem, "signature_power", "signature_unit");

        PowerReport {
            tool_version: text(raw, &TOOL_VERSION, "tool_version"),
            kernel_version: text(raw, &KERNEL_VERSION, "kernel_version"),
            system_name: text(raw, &SYSTEM_NAME, "system_name"),
            cpu_info: text(raw, &CPU_INFO, "cpu_info"),
            os_info: text(raw, &OS_INFO, "os_info"),
            discharge_rate,
            discharge_unit,
            baseline_power,
            baseline_unit,
            signature_power,
            signature_unit,
        }
    }
}

impl Default for ReportGrammar {
    fn default() -> Self {
        Self::new("./Signatures.o")
    }
}

fn first_match<'a>(raw: &'a str, re: &Regex) -> Option<regex::Captures<'a>> {
    raw.lines().map(str::trim).find_map(|line| re.captures(line))
}

fn text(raw: &str, re: &Regex, field: &'static str) -> Field<String> {
    match first_match(raw, re) {
        Some(caps) => Field::Read(caps[1].trim().to_string()),
        None => Field::defaulted(String::new(), Degraded::ParseMismatch { field }),
    }
}

fn measurement(
    raw: &str,
    re: &Regex,
    value_field: &'static str,
    unit_field: &'static str,
) -> (Field<String>, Field<String>) {
    match first_match(raw, re) {
        Some(caps) => (
            Field::Read(caps[1].to_string()),
            Field::Read(caps[2].replace(' ', "")),
        ),
        None => (
            Field::defaulted("0".to_string(), Degraded::ParseMismatch { field: value_field }),
            Field::defaulted(String::new(), Degraded::ParseMismatch { field: unit_field }),
        ),
    }
}

/// Power reports from PowerTOP's `--csv` output.
pub struct PowertopCollector {
    config: PowertopConfig,
    grammar: ReportGrammar,
    grace: Duration,
    sys: System,
}

impl PowertopCollector {
    pub fn new(config: PowertopConfig) -> Result<Self> {
        let grace = config.capture_deadline()? - config.capture();
        Ok(Self {
            grammar: ReportGrammar::new(&config.subsystem),
            grace,
            config,
            sys: System::new(),
        })
    }

    fn process_name(&self) -> OsString {
        self.config
            .binary
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| self.config.binary.clone().into_os_string())
    }

    fn is_installed(&self) -> bool {
        Command::new(&self.config.binary)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
    }

    fn install(&self) -> Result<()> {
        let Some((program, args)) = self.config.install_command.split_first() else {
            return Ok(());
        };
        info!(command = ?self.config.install_command, "installing power tool");
        process::output(program, args)
            .map(drop)
            .map_err(|err| Error::io(err, format!("failed to run {program}")))
    }
}

impl PowerReportProvider for PowertopCollector {
    fn is_running(&mut self) -> bool {
        self.sys.refresh_processes(ProcessesToUpdate::All, true);
        let name = self.process_name();
        self.sys.processes_by_exact_name(&name).next().is_some()
    }

    fn ensure_tool_running(&mut self) -> Result<ToolStatus> {
        if self.is_running() {
            return Ok(ToolStatus::AlreadyRunning);
        }

        let binary = self.config.binary.display().to_string();
        if !self.is_installed() {
            warn!(%binary, "power tool not found");
            self.install()?;
            return Err(Error::SetupRequired {
                message: format!(
                    "{binary} was not installed. After installing it, run \"sudo {binary} --calibrate\" before logging power."
                ),
            });
        }

        process::spawn_detached(&self.config.launch_command)?;
        info!(command = ?self.config.launch_command, "started power tool");
        Ok(ToolStatus::Started)
    }

    fn capture_report(&mut self, duration: Duration) -> std::result::Result<String, Degraded> {
        if !self.is_running() {
            return Err(Degraded::ToolNotRunning);
        }

        let path = &self.config.report_path;
        // Never parse a report left over from an earlier capture.
        fs::File::create(path)
            .map_err(|err| Degraded::unavailable(format!("cannot create {}: {err}", path.display())))?;

        let mut child = Command::new(&self.config.binary)
            .arg(format!("--time={}", duration.as_secs().max(1)))
            .arg(format!("--csv={}", path.display()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| Degraded::unavailable(format!("cannot start capture: {err}")))?;

        let deadline = duration + self.grace;
        match process::wait_with_deadline(&mut child, deadline) {
            Ok(Some(status)) if !status.success() => {
                warn!(%status, "power capture exited unsuccessfully");
            }
            Ok(Some(_)) => debug!(path = %path.display(), "power capture finished"),
            Ok(None) => return Err(Degraded::TimedOut(deadline)),
            Err(err) => return Err(Degraded::unavailable(format!("capture wait failed: {err}"))),
        }

        fs::read_to_string(path)
            .map_err(|err| Degraded::unavailable(format!("cannot read {}: {err}", path.display())))
    }

    fn parse_report(&self, raw: &str) -> PowerReport {
        self.grammar.parse(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "\
____________________________________________________________________
 PowerTOP Report
PowerTOP Version;v2.14 ran at Tue Oct 12 10:00:00 2021
Kernel Version;Linux version 5.11.0-37-generic
System Name;LENOVO20L5
CPU Information;8 Intel(R) Core(TM) i7-8550U CPU @ 1.80GHz
OS Information;Ubuntu 20.04.3 LTS
The battery reports a discharge rate of:  12.3 W
The system baseline power is estimated at:  4.56 W
  1.2 ms/s;  14.3;  Process;  [PID 4242] ./Signatures.o ;  310 mW
";

    #[test]
    fn parses_full_report() {
        let report = ReportGrammar::default().parse(REPORT);
        assert_eq!(report.tool_version.value(), "v2.14 ran at Tue Oct 12 10:00:00 2021");
        assert_eq!(report.kernel_version.value(), "Linux version 5.11.0-37-generic");
        assert_eq!(report.system_name.value(), "LENOVO20L5");
        assert_eq!(report.cpu_info.value(), "8 Intel(R) Core(TM) i7-8550U CPU @ 1.80GHz");
        assert_eq!(report.os_info.value(), "Ubuntu 20.04.3 LTS");
        assert_eq!(report.discharge_rate.value(), "12.3");
        assert_eq!(report.discharge_unit.value(), "W");
        assert_eq!(report.baseline_power.value(), "4.56");
        assert_eq!(report.baseline_unit.value(), "W");
        assert_eq!(report.signature_power.value(), "310");
        assert_eq!(report.signature_unit.value(), "mW");
        assert!(report.degraded_fields().is_empty());
    }

    #[test]
    fn missing_lines_default_independently() {
        let raw = "PowerTOP Version;v2.14\nThe system baseline power is estimated at: 3.1 W\n";
        let report = ReportGrammar::default().parse(raw);
        assert_eq!(report.tool_version.value(), "v2.14");
        assert_eq!(report.baseline_power.value(), "3.1");
        assert_eq!(report.discharge_rate.value(), "0");
        assert_eq!(report.discharge_unit.value(), "");
        assert_eq!(
            report.kernel_version.reason(),
            Some(&Degraded::ParseMismatch { field: "kernel_version" })
        );
        assert_eq!(
            report.degraded_fields(),
            vec![
                "kernel_version",
                "system_name",
                "cpu_info",
                "os_info",
                "discharge_rate",
                "discharge_unit",
                "signature_power",
                "signature_unit",
            ]
        );
    }

    #[test]
    fn malformed_measurement_is_a_mismatch() {
        let raw = "The battery reports a discharge rate of: unknown\n";
        let report = ReportGrammar::default().parse(raw);
        assert!(report.discharge_rate.is_defaulted());
        assert_eq!(report.discharge_rate.value(), "0");
    }

    #[test]
    fn measurement_without_unit_is_a_mismatch() {
        let raw = "The battery reports a discharge rate of: 12.3\nThe system baseline power is estimated at: 4.5mW\n";
        let report = ReportGrammar::default().parse(raw);
        assert_eq!(report.discharge_rate.value(), "0");
        assert_eq!(report.discharge_unit.value(), "");
        assert_eq!(
            report.discharge_rate.reason(),
            Some(&Degraded::ParseMismatch { field: "discharge_rate" })
        );
        assert_eq!(report.baseline_power.value(), "4.5");
        assert_eq!(report.baseline_unit.value(), "mW");
    }

    #[test]
    fn subsystem_name_is_matched_literally() {
        let raw = "  0.1 ms/s; 1.0; Process; [PID 7] geth+x ;  2.5 W\n  0.1 ms/s; 1.0; Process; [PID 8] gethhx ;  9.9 W\n";
        let report = ReportGrammar::new("geth+x").parse(raw);
        assert_eq!(report.signature_power.value(), "2.5");
        assert_eq!(report.signature_unit.value(), "W");
    }

    #[test]
    fn empty_report_is_all_defaults() {
        let report = ReportGrammar::default().parse("");
        assert_eq!(report.values(), PowerReport::defaulted(Degraded::ToolNotRunning).values());
    }

    fn missing_tool_config(dir: &std::path::Path) -> PowertopConfig {
        PowertopConfig {
            binary: "hostlog-missing-power-tool".into(),
            report_path: dir.join("report.csv"),
            install_command: vec!["true".into()],
            ..Default::default()
        }
    }

    #[test]
    fn capture_without_running_tool_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let mut collector = PowertopCollector::new(missing_tool_config(dir.path())).unwrap();
        assert!(!collector.is_running());
        assert_eq!(
            collector.capture_report(Duration::from_secs(1)),
            Err(Degraded::ToolNotRunning)
        );
    }

    #[cfg(unix)]
    #[test]
    fn missing_tool_requires_setup() {
        let dir = tempfile::tempdir().unwrap();
        let mut collector = PowertopCollector::new(missing_tool_config(dir.path())).unwrap();
        assert!(matches!(
            collector.ensure_tool_running(),
            Err(Error::SetupRequired { message }) if message.contains("--calibrate")
        ));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn capture_past_deadline_times_out() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("slowpowertop");
        fs::write(&script, "#!/bin/sh\nsleep 5\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        // A resident instance so the tool counts as running.
        let mut resident = Command::new(&script).spawn().unwrap();
        std::thread::sleep(Duration::from_millis(200));

        let mut collector = PowertopCollector::new(PowertopConfig {
            binary: script.clone(),
            report_path: dir.path().join("report.csv"),
            capture_grace_secs: 0.1,
            ..Default::default()
        })
        .unwrap();
        let result = collector.capture_report(Duration::from_secs(1));

        let _ = resident.kill();
        let _ = resident.wait();
        assert!(matches!(result, Err(Degraded::TimedOut(_))), "{result:?}");
    }
}
