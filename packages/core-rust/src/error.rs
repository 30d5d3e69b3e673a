//! Error types surfaced to callers inside a [`Response`](crate::Response).

/// Failure to choose an endpoint for a call.
#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("selection strategy [{name}] not found")]
    StrategyNotFound { name: String },
    #[error("no selection strategy available for service [{service}]")]
    MissingStrategy { service: String },
    #[error("no available instance of service [{service}]")]
    NoInstance { service: String },
    #[error("instance registry error for service [{service}]: {message}")]
    Registry { service: String, message: String },
    #[error(
        "no available instance supports [{protocol}] protocol, service: {service}, supported: {supported:?}"
    )]
    ProtocolMismatch {
        protocol: String,
        service: String,
        supported: Vec<String>,
    },
}

/// Any failure of a logical call, as delivered to the caller.
#[derive(Debug, thiserror::Error)]
pub enum InvocationError {
    #[error("load balance failed: {0}")]
    Selection(#[from] SelectionError),
    #[error("downstream call failed: {0:#}")]
    Downstream(anyhow::Error),
    #[error("call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("call cancelled")]
    Cancelled,
    #[error("no transport registered for protocol [{protocol}]")]
    UnsupportedProtocol { protocol: String },
    #[error("retry times expired after {attempts} attempts")]
    RetryExhausted { attempts: u32 },
}

impl InvocationError {
    /// Wraps any downstream failure.
    pub fn downstream(err: impl Into<anyhow::Error>) -> Self {
        Self::Downstream(err.into())
    }

    /// Returns `true` if the error came from endpoint selection.
    #[must_use]
    pub fn is_selection(&self) -> bool {
        matches!(self, Self::Selection(_))
    }
}
