//! Client-side routes and the session guard.
//!
//! SYSTEM CONTEXT
//! ==============
//! The app shell asks `resolve` where to go before drawing a screen, so
//! `/chat` is never shown without a session no matter how it was reached.

use crate::services::session::SessionManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    Chat,
}

impl Route {
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Login => "/login",
            Self::Chat => "/chat",
        }
    }
}

/// Apply the session guard to a requested route.
#[must_use]
pub fn guard(requested: Route, has_session: bool) -> Route {
    match requested {
        Route::Chat if !has_session => Route::Login,
        other => other,
    }
}

/// Resolve a requested route against the live session state.
#[must_use]
pub fn resolve(requested: Route, session: &SessionManager) -> Route {
    guard(requested, session.has_session())
}

/// Route to open at startup: straight to chat when a session was restored.
#[must_use]
pub fn initial(session: &SessionManager) -> Route {
    resolve(Route::Chat, session)
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
