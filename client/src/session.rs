//! Session lookup used for identity header injection.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};

use portal_config::SessionConfig;
use portal_types::SessionUser;

/// Session lookup future type alias.
pub type SessionFut<'a> = Pin<Box<dyn Future<Output = Option<SessionUser>> + Send + 'a>>;

/// Source of the signed-in user for outgoing requests.
pub trait SessionSource: Send + Sync {
    /// Current user, or `None` for anonymous requests.
    fn current_user(&self) -> SessionFut<'_>;

    /// Called when the backend rejects the session with 401.
    fn session_expired(&self) {}
}

/// Always anonymous.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSession;

impl SessionSource for NoSession {
    fn current_user(&self) -> SessionFut<'_> {
        Box::pin(async { None })
    }
}

/// A fixed user, e.g. from the `[session]` config table.
///
/// Once the backend reports the session as expired, lookups return `None`.
#[derive(Debug)]
pub struct StaticSession {
    user: SessionUser,
    expired: AtomicBool,
}

impl StaticSession {
    #[must_use]
    pub fn new(user: SessionUser) -> Self {
        Self {
            user,
            expired: AtomicBool::new(false),
        }
    }

    /// Build from config. Returns `None` when neither name nor email is set.
    #[must_use]
    pub fn from_config(config: &SessionConfig) -> Option<Self> {
        let config = config.expanded();
        if config.is_empty() {
            return None;
        }
        Some(Self::new(SessionUser {
            name: config.name,
            email: config.email,
            role: config.role,
            roles: config.roles,
        }))
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expired.load(Ordering::Acquire)
    }
}

impl SessionSource for StaticSession {
    fn current_user(&self) -> SessionFut<'_> {
        let user = (!self.is_expired()).then(|| self.user.clone());
        Box::pin(async move { user })
    }

    fn session_expired(&self) {
        if !self.expired.swap(true, Ordering::AcqRel) {
            tracing::warn!("Session expired; further requests will be sent anonymously");
        }
    }
}
