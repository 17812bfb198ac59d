use portal_types::ApiPathError;
use thiserror::Error;

/// Failure of a backend call, classified so callers can decide whether to
/// degrade (show defaults) or propagate.
#[derive(Debug, Error)]
pub enum ApiError {
    /// 401 from the backend. Never retried.
    #[error("session expired, please sign in again")]
    SessionExpired,

    /// 503 from the backend. Never retried.
    #[error("service unavailable: {body}")]
    ServiceUnavailable { body: String },

    #[error("not found: {path}")]
    NotFound { path: String, body: String },

    /// Any other non-2xx status, after retries where applicable.
    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },

    /// Transport failure that persisted through the final attempt.
    #[error("request failed after {attempts} attempt(s): {source}")]
    Network {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// Transport failure while reading a successful response body.
    #[error("failed to read response body: {0}")]
    Body(#[source] reqwest::Error),

    /// The request could not be built; nothing was sent.
    #[error("invalid request: {0}")]
    Request(#[source] reqwest::Error),

    #[error("invalid JSON in response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid API path: {0}")]
    InvalidPath(#[from] ApiPathError),

    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("could not resolve GUID for {identifier:?}: {reason}")]
    GuidLookup { identifier: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
}

impl ApiError {
    #[must_use]
    pub const fn is_network_error(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Body(_))
    }

    #[must_use]
    pub const fn is_service_unavailable(&self) -> bool {
        matches!(self, Self::ServiceUnavailable { .. })
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    #[must_use]
    pub const fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }

    /// HTTP status carried by the error, if the backend answered at all.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::SessionExpired => Some(401),
            Self::NotFound { .. } => Some(404),
            Self::ServiceUnavailable { .. } => Some(503),
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Response body text for HTTP-status errors.
    #[must_use]
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::ServiceUnavailable { body }
            | Self::NotFound { body, .. }
            | Self::Status { body, .. } => Some(body),
            _ => None,
        }
    }
}
