//! Error taxonomy shared across components.
//!
//! Kinds, not type names: call sites needing to branch on a specific
//! failure match on `ControlError` variants; everything else propagates
//! through `anyhow::Result` with `.context(...)`, matching the dual
//! error-handling style used throughout this crate.
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("network error calling {provider}: {source}")]
    Network {
        provider: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} is rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Duration,
    },

    #[error("forecast for {provider} has only {got} hours, need at least {needed}")]
    ShortHorizon {
        provider: String,
        got: usize,
        needed: usize,
    },

    #[error("forecast aggregation failed: {0}")]
    Forecast(String),

    #[error("inverter communication error during '{operation}': {source}")]
    InverterComm {
        operation: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("inverter unreachable for {elapsed:?} during '{operation}', giving up")]
    Outage {
        operation: String,
        elapsed: Duration,
    },

    #[error("invalid override for {field}: {reason}")]
    InvalidOverride { field: String, reason: String },
}

impl ControlError {
    /// Whether this error should cause the process to terminate, per the
    /// propagation policy: only outage and config errors are fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ControlError::Outage { .. } | ControlError::Config(_))
    }
}
