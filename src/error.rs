//! Error kinds surfaced by the executor and its remote services.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Diagnostic payload reported by the warehouse for a failed job.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { reason: None, location: None, message: message.into() }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.reason, &self.location) {
            (Some(r), Some(l)) => write!(f, "{} ({r} at {l})", self.message),
            (Some(r), None) => write!(f, "{} ({r})", self.message),
            (None, Some(l)) => write!(f, "{} (at {l})", self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// Malformed or mismatched query/parameter binding; never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The job reached a failed terminal state on the remote side.
    #[error("remote execution failed: {0}")]
    RemoteExecution(RemoteError),

    /// Row pagination was interrupted after the job completed.
    /// Re-reading from a fresh iterator is safe.
    #[error("transient fetch error: {0}")]
    TransientFetch(String),

    /// HTTP or payload decoding failure outside of pagination.
    #[error("transport error: {0}")]
    Transport(String),
}

impl QueryError {
    pub fn configuration(msg: impl Into<String>) -> Self { Self::Configuration(msg.into()) }
    pub fn transient(msg: impl Into<String>) -> Self { Self::TransientFetch(msg.into()) }
    pub fn transport(msg: impl Into<String>) -> Self { Self::Transport(msg.into()) }

    /// Only interrupted pagination is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientFetch(_))
    }

    /// The remote diagnostic payload, if this is a remote execution failure.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            Self::RemoteExecution(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;
