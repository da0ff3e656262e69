//! Principals, users and sessions.

pub mod password;
pub mod session;
pub mod user;

use uuid::Uuid;

use crate::access::ADMIN_CLEARANCE;

/// How a request authenticated.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AuthKind {
    Null,
    User,
    Session,
}

/// The resolved principal of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub kind: AuthKind,
    pub username: String,
    pub clearance: u8,
    /// Set only for session-authenticated requests.
    pub session_id: Option<Uuid>,
}

impl Principal {
    /// The unauthenticated principal.
    pub fn null() -> Self {
        Self { kind: AuthKind::Null, username: String::new(), clearance: 0, session_id: None }
    }

    pub fn user(username: impl Into<String>, clearance: u8) -> Self {
        Self { kind: AuthKind::User, username: username.into(), clearance, session_id: None }
    }

    pub fn session(username: impl Into<String>, clearance: u8, id: Uuid) -> Self {
        Self {
            kind: AuthKind::Session,
            username: username.into(),
            clearance,
            session_id: Some(id),
        }
    }

    pub fn is_null(&self) -> bool {
        self.kind == AuthKind::Null
    }

    /// Whether this principal may run admin-only commands.
    pub fn is_admin(&self) -> bool {
        !self.is_null() && self.clearance >= ADMIN_CLEARANCE
    }
}
