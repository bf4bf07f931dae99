//! Error taxonomy for the polling core.
//!
//! Only two families need to be matched on by name: session lifecycle
//! errors (to decide retry vs. fatal) and per-target fetch errors (to
//! fold into cycle metrics). Everything else travels as `anyhow::Error`.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while building or recycling the external session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Unrecoverable setup failure (missing credential store, bad
    /// credentials). Never retried; terminal for the run.
    #[error("session init failed: {0:#}")]
    Init(anyhow::Error),

    /// Environment-level failure (network hiccup, resource pressure).
    /// Retried a small fixed number of times before escalating.
    #[error("transient session failure: {0:#}")]
    Transient(anyhow::Error),
}

impl SessionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SessionError::Transient(_))
    }

    /// Retry exhaustion turns a lingering transient error into a fatal one.
    pub fn into_fatal(self) -> SessionError {
        match self {
            SessionError::Transient(e) => SessionError::Init(e),
            other => other,
        }
    }
}

/// Per-target fetch failures. Always local to one target in one cycle.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("fetch failed: {0:#}")]
    Other(anyhow::Error),
}
