//! Hostlog: operator tooling for local blockchain node experiments.
//!
//! The core is a best-effort sampler that appends host CPU, memory, swap,
//! disk and optional PowerTOP readings to a CSV log once per tick. This
//! library exposes it, the providers behind it, and the node launcher for
//! use by the binary and by tests.

pub mod collectors;
pub mod config;
pub mod error;
pub mod logfile;
pub mod logging;
pub mod model;
pub mod node;
pub mod process;
pub mod sampler;

pub use error::{Error, Result};
