use std::path::Path;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "hostlog=info";
const LOG_PREFIX: &str = "hostlog";

/// Keeps the non-blocking file writer alive. Dropping it flushes pending lines.
#[derive(Debug)]
#[must_use]
pub struct Guard {
    _inner: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Initialize diagnostics: compact stderr output plus a daily rolling file in `dir`.
///
/// `RUST_LOG` overrides the default `hostlog=info` filter. If the log
/// directory cannot be used, logging continues on stderr only.
pub fn init(dir: &Path) -> Guard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let stderr_layer = fmt::layer()
        .compact()
        .with_line_number(true)
        .with_writer(std::io::stderr);

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(3)
        .filename_prefix(LOG_PREFIX)
        .filename_suffix("log")
        .build(dir);

    match appender {
        Ok(appender) => {
            let (file_writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer()
                .compact()
                .with_ansi(false)
                .with_line_number(true)
                .with_writer(file_writer);
            if let Err(err) = tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(file_layer)
                .try_init()
            {
                eprintln!("setting tracing default failed: {err:?}");
            }
            Guard {
                _inner: Some(guard),
            }
        }
        Err(err) => {
            eprintln!("log directory {} unusable ({err}), logging to stderr only", dir.display());
            if let Err(err) = tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .try_init()
            {
                eprintln!("setting tracing default failed: {err:?}");
            }
            Guard { _inner: None }
        }
    }
}
