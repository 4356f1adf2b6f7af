//! Error handling.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Fatal errors. Anything that only costs a single field of a sample is a
/// [`Degraded`](crate::model::Degraded) reason instead.
#[derive(Error, Debug)]
#[must_use]
pub enum Error {
    #[error("{context}: {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path:?}: {source}")]
    Config {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid configuration {value:?} for {field:?}")]
    InvalidConfig { field: &'static str, value: String },
    #[error("{message}")]
    SetupRequired { message: String },
    #[error("no account could be found or created in {datadir:?}")]
    AccountUnavailable { datadir: PathBuf },
}

impl Error {
    pub fn io(source: std::io::Error, context: impl Into<String>) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
