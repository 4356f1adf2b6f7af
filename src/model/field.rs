use std::time::Duration;

use thiserror::Error;

/// Why a field fell back to its default value.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum Degraded {
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("power tool is not running")]
    ToolNotRunning,
    #[error("no report line matched {field}")]
    ParseMismatch { field: &'static str },
    #[error("capture exceeded {0:?}")]
    TimedOut(Duration),
}

impl Degraded {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::ProviderUnavailable(reason.into())
    }
}

/// One sampled value: either what the provider returned, or the documented
/// default together with the reason it was substituted.
#[derive(Clone, Debug, PartialEq)]
pub enum Field<T> {
    Read(T),
    Defaulted { value: T, reason: Degraded },
}

impl<T> Field<T> {
    pub fn defaulted(value: T, reason: Degraded) -> Self {
        Self::Defaulted { value, reason }
    }

    /// Absorb a provider result, substituting `default` on failure.
    pub fn from_result(result: Result<T, Degraded>, default: T) -> Self {
        match result {
            Ok(value) => Self::Read(value),
            Err(reason) => Self::Defaulted {
                value: default,
                reason,
            },
        }
    }

    pub fn value(&self) -> &T {
        match self {
            Self::Read(value) | Self::Defaulted { value, .. } => value,
        }
    }

    pub fn reason(&self) -> Option<&Degraded> {
        match self {
            Self::Read(_) => None,
            Self::Defaulted { reason, .. } => Some(reason),
        }
    }

    pub fn is_defaulted(&self) -> bool {
        matches!(self, Self::Defaulted { .. })
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Field<U> {
        match self {
            Self::Read(value) => Field::Read(f(value)),
            Self::Defaulted { value, reason } => Field::Defaulted {
                value: f(value),
                reason,
            },
        }
    }
}

impl Field<f64> {
    /// Render for the log. Read values keep their decimal point (`40.0`),
    /// defaulted numbers print as a bare `0`.
    pub fn render(&self) -> String {
        match self {
            Self::Read(value) => format!("{value:?}"),
            Self::Defaulted { .. } => "0".to_string(),
        }
    }
}

impl Field<u64> {
    pub fn render(&self) -> String {
        self.value().to_string()
    }
}

impl Field<String> {
    pub fn render(&self) -> String {
        self.value().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_result_keeps_reason() {
        let field = Field::from_result(Err(Degraded::ToolNotRunning), 0.0);
        assert!(field.is_defaulted());
        assert_eq!(field.reason(), Some(&Degraded::ToolNotRunning));
        assert_eq!(*field.value(), 0.0);
    }

    #[test]
    fn float_rendering() {
        assert_eq!(Field::Read(40.0).render(), "40.0");
        assert_eq!(Field::Read(12.5).render(), "12.5");
        assert_eq!(
            Field::defaulted(0.0, Degraded::unavailable("no cpufreq")).render(),
            "0"
        );
    }

    #[test]
    fn map_preserves_degradation() {
        let field = Field::defaulted(3_u64, Degraded::ParseMismatch { field: "x" }).map(|v| v * 2);
        assert_eq!(*field.value(), 6);
        assert!(field.is_defaulted());
    }
}
