//! Core domain types for the partner portal client.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod ids;
mod session;

pub use ids::{TraceId, UserId, user_id_namespace};
pub use session::SessionUser;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// HTTP Method
// ============================================================================

/// HTTP verbs the portal backend accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported HTTP method: {0}")]
pub struct HttpMethodParseError(pub String);

impl HttpMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl FromStr for HttpMethod {
    type Err = HttpMethodParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            _ => Err(HttpMethodParseError(s.to_string())),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// API Path
// ============================================================================

/// A backend path relative to the proxy base, e.g. `/api/v1/cases`.
///
/// Absolute and protocol-relative URLs are rejected, as are `.` and `..`
/// segments (plain or percent-encoded), so a request can never be steered
/// away from the configured proxy or onto a sibling route.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApiPath(String);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApiPathError {
    #[error("API path must not be empty")]
    Empty,
    #[error("API path must start with '/': {0}")]
    NotRooted(String),
    #[error("API path must be relative to the proxy base: {0}")]
    NotRelative(String),
    #[error("API path must not contain '.' or '..' segments: {0}")]
    DotSegment(String),
}

impl ApiPath {
    pub fn new(value: impl Into<String>) -> Result<Self, ApiPathError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ApiPathError::Empty);
        }
        if trimmed.contains("://") || trimmed.starts_with("//") {
            return Err(ApiPathError::NotRelative(value));
        }
        if !trimmed.starts_with('/') {
            return Err(ApiPathError::NotRooted(value));
        }
        if has_dot_segment(trimmed) {
            return Err(ApiPathError::DotSegment(value));
        }
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Replace every `{name}` placeholder with `value`, percent-encoding it as
    /// a single path segment. Fails if `value` is `.` or `..`.
    pub fn fill(&self, name: &str, value: &str) -> Result<Self, ApiPathError> {
        let placeholder = format!("{{{name}}}");
        Self::new(self.0.replace(&placeholder, &encode_path_segment(value)))
    }

    #[must_use]
    pub fn has_placeholder(&self, name: &str) -> bool {
        self.0.contains(&format!("{{{name}}}"))
    }
}

impl TryFrom<String> for ApiPath {
    type Error = ApiPathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ApiPath {
    type Error = ApiPathError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ApiPath> for String {
    fn from(value: ApiPath) -> Self {
        value.0
    }
}

impl fmt::Display for ApiPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// True if any segment of the path (query and fragment excluded) resolves to
/// `.` or `..` once `%2E` is decoded.
fn has_dot_segment(path: &str) -> bool {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    path.split('/').any(|segment| {
        let decoded = segment.replace("%2E", ".").replace("%2e", ".");
        decoded == "." || decoded == ".."
    })
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
#[must_use]
pub fn encode_path_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

// ============================================================================
// Request Descriptor
// ============================================================================

/// One logical API call: where, how, what, and whether transient failures
/// may be retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub path: ApiPath,
    pub method: HttpMethod,
    pub body: Option<serde_json::Value>,
    pub retry: bool,
}

impl RequestDescriptor {
    #[must_use]
    pub fn new(method: HttpMethod, path: ApiPath) -> Self {
        Self {
            path,
            method,
            body: None,
            retry: true,
        }
    }

    #[must_use]
    pub fn get(path: ApiPath) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    #[must_use]
    pub fn post(path: ApiPath) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    #[must_use]
    pub fn put(path: ApiPath) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    #[must_use]
    pub fn delete(path: ApiPath) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn without_retry(mut self) -> Self {
        self.retry = false;
        self
    }
}
