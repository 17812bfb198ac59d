use std::fmt;

use uuid::Uuid;

/// Per-request correlation id sent as `X-Trace-Id` / `X-Request-Id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct TraceId(Uuid);

impl TraceId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Stable user identifier derived from an email address.
///
/// RFC 4122 UUIDv5 (SHA-1). The name is the trimmed, lowercased email so the
/// same mailbox always maps to the same id regardless of how it was typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    #[must_use]
    pub fn from_email(namespace: &Uuid, email: &str) -> Self {
        let normalized = email.trim().to_lowercase();
        Self(Uuid::new_v5(namespace, normalized.as_bytes()))
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Namespace for [`UserId`] derivation.
///
/// Scoped to the identity provider when one is configured so two realms never
/// share user ids.
#[must_use]
pub fn user_id_namespace(issuer: Option<&str>) -> Uuid {
    match issuer.map(str::trim).filter(|s| !s.is_empty()) {
        Some(issuer) => Uuid::new_v5(
            &Uuid::NAMESPACE_URL,
            issuer.trim_end_matches('/').as_bytes(),
        ),
        None => Uuid::NAMESPACE_URL,
    }
}
