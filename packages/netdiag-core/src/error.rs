//! Error taxonomy for probe failures.
//!
//! These errors never cross the sentinel-returning public operations; they are
//! only visible through the `try_*` variants.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    /// The external program could not be found on this system.
    #[error("{0} utility not found")]
    ProcessUnavailable(String),

    /// The external program did not finish before its deadline.
    #[error("{program} command timed out after {}s", .after.as_secs())]
    ProcessTimeout { program: String, after: Duration },

    #[error("connection to {target} failed: {source}")]
    Connection {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connection to {0} timed out")]
    ConnectTimeout(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Parse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ProbeError {
    /// Short human-readable reason used as the diagnostic text of failed probes.
    pub fn reason(&self) -> String {
        match self {
            ProbeError::ProcessTimeout { program, .. } => format!("{} command timed out", program),
            other => other.to_string(),
        }
    }
}

pub type ProbeResult<T> = std::result::Result<T, ProbeError>;
