//! Crate-wide error type.
//!
//! Mirrors the fatal/non-fatal split of the error handling design: only
//! configuration and install failures are ever surfaced as `Err`. Stream
//! anomalies, agent death and teardown failures are logged and absorbed by
//! the modules that observe them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectorError {
    /// Malformed configuration DOM, or `[target]` used with no target hint.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A host's install step (temp-dir probe, agent copy, config copy)
    /// failed.
    #[error("[{host}] install failed during {operation}: {detail}")]
    Install {
        host: String,
        operation: String,
        detail: String,
    },

    /// The remote temp-dir probe wrote to stderr. Per the design's
    /// zero-tolerance stance on silent remote misconfiguration this is
    /// treated as fatal even though the probe itself exited zero.
    #[error("[{host}] unexpected stderr during {operation}: {stderr}")]
    RuntimeTransport {
        host: String,
        operation: String,
        stderr: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CollectorError>;
