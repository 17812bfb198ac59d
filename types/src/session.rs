use serde::{Deserialize, Serialize};

/// The signed-in portal user as seen by the session lookup.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionUser {
    pub name: Option<String>,
    pub email: Option<String>,
    /// Explicit primary role. Takes precedence over `roles`.
    #[serde(default)]
    pub role: Option<String>,
    /// Realm roles as issued by the identity provider.
    #[serde(default)]
    pub roles: Vec<String>,
}

// Manual Debug impl to keep email addresses out of logs.
impl std::fmt::Debug for SessionUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionUser")
            .field("name", &self.name)
            .field(
                "email",
                &if self.email.is_some() {
                    "[REDACTED]"
                } else {
                    "None"
                },
            )
            .field("role", &self.role)
            .field("roles", &self.roles)
            .finish()
    }
}

impl SessionUser {
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            email: Some(email.into()),
            role: None,
            roles: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    #[must_use]
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn primary_role(&self) -> Option<&str> {
        self.role
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .or_else(|| {
                self.roles
                    .first()
                    .map(String::as_str)
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
            })
    }

    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref().map(str::trim).filter(|e| !e.is_empty())
    }
}
