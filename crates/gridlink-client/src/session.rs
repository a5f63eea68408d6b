//! Single-session authentication state.
//!
//! Holds at most one auth token at a time. Login is rejected while a token
//! is held and logout while none is; the queue reads the slot at dispatch
//! time to decide whether to attach the token header.

use std::sync::Mutex;

use tracing::info;

use crate::error::{ClientError, Result};

/// Opaque server-issued auth token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    /// Wraps a token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The token text as sent in the auth header.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The currently authenticated session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Token attached to every outbound request.
    pub token: AuthToken,
    /// Name the session was opened under.
    pub user_name: String,
}

/// Owner of the one-session-at-a-time slot.
///
/// Components that need the token hold a reference to this manager; nothing
/// else may mutate the slot.
#[derive(Debug, Default)]
pub struct SessionManager {
    current: Mutex<Option<Session>>,
}

impl SessionManager {
    /// Creates a manager with no session.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current token, if logged in.
    pub fn token(&self) -> Option<AuthToken> {
        self.current
            .lock()
            .ok()
            .and_then(|session| session.as_ref().map(|s| s.token.clone()))
    }

    /// The current user name, if logged in.
    pub fn user_name(&self) -> Option<String> {
        self.current
            .lock()
            .ok()
            .and_then(|session| session.as_ref().map(|s| s.user_name.clone()))
    }

    /// Whether a session is currently held.
    pub fn is_logged_in(&self) -> bool {
        self.token().is_some()
    }

    /// Guard run before a login call is enqueued; no network traffic
    /// happens when this rejects.
    pub(crate) fn ensure_logged_out(&self) -> Result<()> {
        if self.is_logged_in() {
            Err(ClientError::session_state("already logged in, logout first"))
        } else {
            Ok(())
        }
    }

    /// Installs a fresh session after a successful login.
    pub(crate) fn store(&self, token: AuthToken, user_name: String) {
        if let Ok(mut current) = self.current.lock() {
            info!(user = %user_name, "logged in");
            *current = Some(Session { token, user_name });
        }
    }

    /// Drops the current session; rejects when none is held.
    pub(crate) fn clear(&self) -> Result<()> {
        let mut current = self
            .current
            .lock()
            .map_err(|_| ClientError::session_state("session state unavailable"))?;
        match current.take() {
            Some(session) => {
                info!(user = %session.user_name, "logged out");
                Ok(())
            }
            None => Err(ClientError::session_state("not logged in")),
        }
    }
}
