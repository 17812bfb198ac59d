//! Trace and user-identification headers.
//!
//! | Header | Source |
//! |--------|--------|
//! | `X-Trace-Id` | one per logical request, same on every retry |
//! | `X-Request-Id` | fresh per attempt |
//! | `X-User-Name` | session display name |
//! | `X-User-Role` | session primary role |
//! | `X-User-Email` | session email |
//! | `X-User-Id` | UUIDv5 of the session email |

use portal_types::{SessionUser, TraceId, UserId};
use reqwest::RequestBuilder;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use uuid::Uuid;

pub const TRACE_ID: &str = "x-trace-id";
pub const REQUEST_ID: &str = "x-request-id";
pub const USER_NAME: &str = "x-user-name";
pub const USER_ROLE: &str = "x-user-role";
pub const USER_EMAIL: &str = "x-user-email";
pub const USER_ID: &str = "x-user-id";

/// Identity headers for `user`. Values that are not valid header values are
/// skipped.
#[must_use]
pub fn identity_headers(user: &SessionUser, namespace: &Uuid) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if let Some(name) = user.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        insert_checked(&mut headers, USER_NAME, name);
    }
    if let Some(role) = user.primary_role() {
        insert_checked(&mut headers, USER_ROLE, role);
    }
    if let Some(email) = user.email() {
        insert_checked(&mut headers, USER_EMAIL, email);
        let id = UserId::from_email(namespace, email);
        insert_checked(&mut headers, USER_ID, &id.to_string());
    }

    headers
}

fn insert_checked(headers: &mut HeaderMap, name: &'static str, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(HeaderName::from_static(name), value);
        }
        Err(_) => {
            tracing::warn!(header = name, "Skipping header with invalid value");
        }
    }
}

/// Attach the per-request trace id and a fresh per-attempt request id.
pub fn add_trace_headers(builder: RequestBuilder, trace_id: &TraceId) -> RequestBuilder {
    builder
        .header(TRACE_ID, trace_id.to_string())
        .header(REQUEST_ID, TraceId::generate().to_string())
}
