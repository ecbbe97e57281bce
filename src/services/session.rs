//! Session manager — owns the current user's identity.
//!
//! DESIGN
//! ======
//! A single context object with an explicit lifecycle: built once at startup
//! (restoring any persisted session synchronously), set on login, cleared on
//! logout, read by the views it is injected into. Nothing else writes the
//! session slot or the token store.
//!
//! ERROR HANDLING
//! ==============
//! Without backend credentials the manager exists but is inert: reads return
//! `None` and auth calls return `SessionError::NotConfigured`. Provider
//! failures are logged and surfaced once; session state is left untouched.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{error, info, warn};

use super::token_store::{StoredSession, TokenStore};
use crate::backend::{AuthProvider, BackendError};

/// The authenticated user as seen by the views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub username: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("backend is not configured")]
    NotConfigured,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

struct ActiveSession {
    user: Session,
    token: String,
}

pub struct SessionManager {
    auth: Option<Arc<dyn AuthProvider>>,
    store: Arc<dyn TokenStore>,
    slot: RwLock<Option<ActiveSession>>,
}

impl SessionManager {
    /// Build the manager and restore a persisted session when a provider is present.
    #[must_use]
    pub fn new(auth: Option<Arc<dyn AuthProvider>>, store: Arc<dyn TokenStore>) -> Self {
        let restored = if auth.is_some() {
            store.load().map(|stored| ActiveSession {
                user: Session { username: stored.username },
                token: stored.session_token,
            })
        } else {
            error!("session manager started without a backend; login is disabled");
            None
        };

        if let Some(active) = &restored {
            info!(username = %active.user.username, "restored persisted session");
        }

        Self { auth, store, slot: RwLock::new(restored) }
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.auth.is_some()
    }

    /// Current user, if logged in.
    #[must_use]
    pub fn current_user(&self) -> Option<Session> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|active| active.user.clone())
    }

    /// Capability check for routes that require a session.
    #[must_use]
    pub fn has_session(&self) -> bool {
        self.slot.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Session token for ACL-scoped backend calls.
    #[must_use]
    pub fn session_token(&self) -> Option<String> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|active| active.token.clone())
    }

    /// Log in with credentials, replacing any current session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConfigured`] without a backend, or the
    /// provider's error on failure. Session state is unchanged on error.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), SessionError> {
        let auth = self.auth.as_ref().ok_or(SessionError::NotConfigured)?;

        let user = match auth.log_in(username, password).await {
            Ok(user) => user,
            Err(e) => {
                error!(error = %e, code = e.error_code(), "error logging in");
                return Err(e.into());
            }
        };

        let stored = StoredSession { username: user.username.clone(), session_token: user.session_token.clone() };
        if let Err(e) = self.store.save(&stored) {
            warn!(error = %e, "failed to persist session");
        }

        info!(username = %user.username, "logged in");
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) =
            Some(ActiveSession { user: Session { username: user.username }, token: user.session_token });
        Ok(())
    }

    /// Log out, invalidating the session with the provider first.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConfigured`] without a backend, or the
    /// provider's error on failure. Session state is unchanged on error.
    pub async fn logout(&self) -> Result<(), SessionError> {
        let auth = self.auth.as_ref().ok_or(SessionError::NotConfigured)?;

        if let Some(token) = self.session_token() {
            if let Err(e) = auth.log_out(&token).await {
                error!(error = %e, code = e.error_code(), "error logging out");
                return Err(e.into());
            }
        }

        if let Err(e) = self.store.clear() {
            warn!(error = %e, "failed to clear persisted session");
        }
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = None;
        info!("logged out");
        Ok(())
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
