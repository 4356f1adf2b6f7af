// Re-export all model types from submodules.

pub use field::{Degraded, Field};
pub use power::PowerReport;
pub use sample::{MetricsSample, Sample, Usage};
pub(crate) use sample::round1;

mod field;
mod power;
mod sample;
