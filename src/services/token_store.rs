//! Persisted "current user" record.
//!
//! SYSTEM CONTEXT
//! ==============
//! Hosted SDKs keep the logged-in user in local storage so a restart resumes
//! the session. `TokenStore` plays that role here; the session manager is its
//! only writer.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// What survives a restart: the username and its session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub username: String,
    pub session_token: String,
}

/// Synchronous persistence for the current session.
pub trait TokenStore: Send + Sync {
    /// Read the stored session, if any. Unreadable data counts as none.
    fn load(&self) -> Option<StoredSession>;

    /// Replace the stored session.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the record cannot be written.
    fn save(&self, session: &StoredSession) -> io::Result<()>;

    /// Remove the stored session. Clearing an empty store succeeds.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if an existing record cannot be removed.
    fn clear(&self) -> io::Result<()>;
}

/// JSON file store.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<StoredSession> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "session file unreadable");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "session file corrupt; ignoring");
                None
            }
        }
    }

    fn save(&self, session: &StoredSession) -> io::Result<()> {
        let json = serde_json::to_string_pretty(session)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, json)
    }

    fn clear(&self) -> io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

#[cfg(test)]
#[path = "token_store_test.rs"]
mod tests;
