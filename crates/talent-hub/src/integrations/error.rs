use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Failure of a single connector call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectorError {
    #[error("missing credential field '{0}'")]
    MissingCredential(&'static str),
    #[error("credentials rejected by provider (status {0})")]
    Authentication(u16),
    #[error("provider throttled the request")]
    Throttled { retry_after: Option<Duration> },
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
    #[error("provider rejected request (status {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("unexpected provider response: {0}")]
    InvalidResponse(String),
    #[error("connector misconfigured: {0}")]
    Misconfigured(String),
}

impl ConnectorError {
    /// Timeouts, 5xx, transport faults, and throttling are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectorError::Throttled { .. }
                | ConnectorError::Unavailable(_)
                | ConnectorError::Timeout(_)
        )
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ConnectorError::MissingCredential(_) | ConnectorError::Authentication(_) => {
                ErrorKind::AuthenticationFailed
            }
            ConnectorError::Unsupported(_) => ErrorKind::UnsupportedOperation,
            ConnectorError::Misconfigured(_) => ErrorKind::InvalidConfiguration,
            ConnectorError::Throttled { .. }
            | ConnectorError::Unavailable(_)
            | ConnectorError::Timeout(_)
            | ConnectorError::Rejected { .. }
            | ConnectorError::InvalidResponse(_) => ErrorKind::TransientProviderError,
        }
    }
}

/// Stable error codes surfaced to the API layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AuthenticationFailed,
    TransientProviderError,
    MappingRejection,
    UnsupportedOperation,
    NoAvailability,
    RateLimited,
    IntegrationNotFound,
    IntegrationDisabled,
    CapabilityMismatch,
    UnknownProvider,
    InvalidConfiguration,
    InvalidRequest,
    Cancelled,
    Storage,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::AuthenticationFailed => "authentication_failed",
            ErrorKind::TransientProviderError => "transient_provider_error",
            ErrorKind::MappingRejection => "mapping_rejection",
            ErrorKind::UnsupportedOperation => "unsupported_operation",
            ErrorKind::NoAvailability => "no_availability",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::IntegrationNotFound => "integration_not_found",
            ErrorKind::IntegrationDisabled => "integration_disabled",
            ErrorKind::CapabilityMismatch => "capability_mismatch",
            ErrorKind::UnknownProvider => "unknown_provider",
            ErrorKind::InvalidConfiguration => "invalid_configuration",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Storage => "storage",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason a composite operation could not start (or had to stop as a whole).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct HubError {
    pub kind: ErrorKind,
    pub message: String,
    /// Earliest time a deferred batch is expected to be admitted again.
    pub retry_at: Option<DateTime<Utc>>,
}

impl HubError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_at: None,
        }
    }

    pub fn deferred(retry_at: DateTime<Utc>) -> Self {
        Self {
            kind: ErrorKind::RateLimited,
            message: format!("provider quota exhausted until {}", retry_at.to_rfc3339()),
            retry_at: Some(retry_at),
        }
    }
}

impl From<ConnectorError> for HubError {
    fn from(value: ConnectorError) -> Self {
        Self::new(value.kind(), value.to_string())
    }
}
