//! The CSV log: fixed header, one row per tick.
//!
//! Every line, header included, ends with a trailing comma. Existing
//! consumers of these logs depend on that and on the column order.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use csv::{QuoteStyle, Terminator, WriterBuilder};

use crate::error::{Error, Result};
use crate::model::{Degraded, MetricsSample, PowerReport, Sample};

fn writer_builder() -> WriterBuilder {
    let mut builder = WriterBuilder::new();
    builder
        .has_headers(false)
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::Any(b'\n'));
    builder
}

/// The empty last field is what produces the trailing comma.
fn record<I, S>(fields: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut record: Vec<String> = fields.into_iter().map(Into::into).collect();
    record.push(String::new());
    record
}

fn render(record: &[String]) -> String {
    let mut writer = writer_builder().from_writer(Vec::new());
    // Writing into memory cannot fail.
    let _ = writer.write_record(record);
    let bytes = writer.into_inner().unwrap_or_default();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn header_record(include_power: bool) -> Vec<String> {
    let mut columns: Vec<&str> = MetricsSample::COLUMNS.to_vec();
    if include_power {
        columns.extend(PowerReport::COLUMNS);
    }
    record(columns)
}

fn row_record(sample: &Sample) -> Vec<String> {
    let mut values = sample.metrics.values();
    if let Some(power) = &sample.power {
        values.extend(power.values());
    }
    record(values)
}

/// The ordered column list, trailing comma included, without a newline.
pub fn header(include_power: bool) -> String {
    let mut line = render(&header_record(include_power));
    line.pop();
    line
}

pub fn column_count(include_power: bool) -> usize {
    MetricsSample::COLUMNS.len() + if include_power { PowerReport::COLUMNS.len() } else { 0 }
}

/// Render one sample as a newline-terminated row in header order.
pub fn format_row(sample: &Sample) -> String {
    render(&row_record(sample))
}

/// An open log with its header already written.
///
/// Owned by the sampling loop for the whole run; [`LogFile::close`] consumes
/// it, so nothing can be appended after the run ends.
pub struct LogFile<W: Write = File> {
    writer: csv::Writer<W>,
    path: PathBuf,
    include_power: bool,
    rows: u64,
}

/// Create or truncate `path` and write the header row.
pub fn open_log(path: &Path, include_power: bool) -> Result<LogFile> {
    let file = File::create(path)
        .map_err(|err| Error::io(err, format!("failed to open log {}", path.display())))?;
    LogFile::from_writer(file, path, include_power)
}

impl<W: Write> LogFile<W> {
    /// Wrap any writer; the header is written and flushed immediately.
    pub fn from_writer(writer: W, path: &Path, include_power: bool) -> Result<Self> {
        let mut log = Self {
            writer: writer_builder().from_writer(writer),
            path: path.to_path_buf(),
            include_power,
            rows: 0,
        };
        log.write_record(&header_record(include_power))?;
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn include_power(&self) -> bool {
        self.include_power
    }

    /// Data rows written so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Append one row and flush it.
    ///
    /// The row always matches the header: a missing power report is filled
    /// with defaults, a surplus one is dropped.
    pub fn append(&mut self, sample: &Sample) -> Result<()> {
        let record = match (&sample.power, self.include_power) {
            (None, true) => row_record(&Sample {
                metrics: sample.metrics.clone(),
                power: Some(PowerReport::defaulted(Degraded::unavailable("power reporting disabled"))),
            }),
            (Some(_), false) => row_record(&Sample {
                metrics: sample.metrics.clone(),
                power: None,
            }),
            _ => row_record(sample),
        };
        self.write_record(&record)?;
        self.rows += 1;
        Ok(())
    }

    fn write_record(&mut self, record: &[String]) -> Result<()> {
        let context = || format!("failed to write {}", self.path.display());
        self.writer
            .write_record(record)
            .map_err(|err| Error::io(io::Error::from(err), context()))?;
        self.writer.flush().map_err(|err| Error::io(err, context()))
    }

    /// Best-effort flush after a failed write. Errors are ignored because the
    /// original failure is what gets reported.
    pub(crate) fn salvage(&mut self) {
        let _ = self.writer.flush();
    }

    /// Flush and release the underlying writer.
    pub fn close(mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|err| Error::io(err, format!("failed to flush {}", self.path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_header_is_exact() {
        assert_eq!(
            header(false),
            "Timestamp,Timestamp (Seconds),CPU %,CPU Frequency,Virtual Memory %,Virtual Memory,Swap Memory %,Swap Memory,Disk Usage %,Disk Usage,"
        );
        assert_eq!(header(false), header(false));
    }

    #[test]
    fn power_header_appends_power_columns() {
        let power = header(true);
        assert!(power.starts_with(&header(false)));
        assert!(power.ends_with(
            "Powertop Version,Kernel Version,System Name,CPU Stats,OS Stats,Power Usage,Unit,Baseline Power,Unit,Signatures Power,Signatures Unit,"
        ));
        assert_eq!(power.matches(',').count(), column_count(true));
    }

    #[test]
    fn records_quote_only_unsafe_values() {
        assert_eq!(render(&record(["Intel i7", "a,b"])), "Intel i7,\"a,b\",\n");
        assert_eq!(render(&record(["say \"hi\""])), "\"say \"\"hi\"\"\",\n");
    }

    #[test]
    fn open_log_truncates_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.csv");
        std::fs::write(&path, "old,row,\nanother,\n").unwrap();

        let log = open_log(&path, false).unwrap();
        log.close().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, format!("{}\n", header(false)));
    }

    #[test]
    fn open_log_fails_without_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("test.csv");
        assert!(matches!(open_log(&path, false), Err(Error::Io { .. })));
    }
}
