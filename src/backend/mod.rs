//! Backend — adapter for the hosted Parse-compatible service.
//!
//! DESIGN
//! ======
//! Views never talk to HTTP or WebSocket directly. They hold the three
//! capability traits below behind `Arc<dyn ...>` so tests can swap in
//! scripted fakes. `Backend::connect` wires the concrete clients: REST for
//! auth and data, LiveQuery for creation events.

pub mod live_query;
pub mod rest;
pub mod types;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::{BackendConfig, ConfigError};
pub use types::{AuthenticatedUser, BackendError, MessageRecord, NewMessage};

// =============================================================================
// CAPABILITY TRAITS
// =============================================================================

/// Credential-based login and logout.
#[async_trait::async_trait]
pub trait AuthProvider: Send + Sync {
    /// Exchange credentials for a session.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] on bad credentials or transport failure.
    async fn log_in(&self, username: &str, password: &str) -> Result<AuthenticatedUser, BackendError>;

    /// Invalidate a session token.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] if the provider could not be reached or refused.
    async fn log_out(&self, session_token: &str) -> Result<(), BackendError>;
}

/// The creation-time-ordered message collection.
#[async_trait::async_trait]
pub trait MessageStore: Send + Sync {
    /// Fetch every stored message, ascending by `created_at`.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] if any page request fails.
    async fn list_messages(&self, session_token: Option<&str>) -> Result<Vec<MessageRecord>, BackendError>;

    /// Create a message and return the stored record.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] if the save is rejected or the request fails.
    async fn create_message(
        &self,
        message: &NewMessage,
        session_token: Option<&str>,
    ) -> Result<MessageRecord, BackendError>;
}

/// Standing subscription to message-creation events.
#[async_trait::async_trait]
pub trait LiveQuery: Send + Sync {
    /// Open a subscription scoped to the message query.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] if the connect or subscribe handshake fails.
    async fn subscribe_created(&self, session_token: Option<&str>) -> Result<Subscription, BackendError>;
}

// =============================================================================
// SUBSCRIPTION
// =============================================================================

/// Handle to a live creation-event stream.
///
/// Dropping the handle releases the subscription as well; `unsubscribe`
/// additionally waits for the transport task to finish.
pub struct Subscription {
    events: mpsc::Receiver<MessageRecord>,
    cancel: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Build a subscription from an event receiver, a cancel signal, and the
    /// task that feeds the receiver (if any).
    #[must_use]
    pub fn new(
        events: mpsc::Receiver<MessageRecord>,
        cancel: oneshot::Sender<()>,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Self { events, cancel: Some(cancel), task }
    }

    /// Wait for the next creation event. `None` once the stream has ended.
    pub async fn next(&mut self) -> Option<MessageRecord> {
        self.events.recv().await
    }

    /// Release the subscription and wait for its transport to shut down.
    pub async fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        self.events.close();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

// =============================================================================
// BACKEND
// =============================================================================

/// Concrete backend clients shared by the views.
#[derive(Clone)]
pub struct Backend {
    pub auth: Arc<dyn AuthProvider>,
    pub messages: Arc<dyn MessageStore>,
    pub live: Arc<dyn LiveQuery>,
}

impl Backend {
    /// Build the REST and LiveQuery clients from typed config.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn connect(config: &BackendConfig) -> Result<Self, BackendError> {
        let rest = Arc::new(rest::ParseRestClient::new(config)?);
        let live = Arc::new(live_query::LiveQueryClient::new(config));
        Ok(Self { auth: rest.clone(), messages: rest, live })
    }
}

/// Configure the backend once at startup.
///
/// Non-fatal: returns `None` and logs when configuration is missing or the
/// clients cannot be built, leaving the app running with features disabled.
#[must_use]
pub fn init(config: Result<BackendConfig, ConfigError>) -> Option<Backend> {
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "{}", config_error_summary(&e));
            return None;
        }
    };

    match Backend::connect(&config) {
        Ok(backend) => {
            info!(server = %config.server_url, class = %config.message_class, "backend configured");
            Some(backend)
        }
        Err(e) => {
            error!(error = %e, code = e.error_code(), "backend client build failed");
            None
        }
    }
}

/// Log headline for a config failure; only `Missing` means unset credentials.
fn config_error_summary(e: &ConfigError) -> &'static str {
    match e {
        ConfigError::Missing { .. } => "backend credentials are not set; check PARSE_APP_ID and PARSE_JS_KEY",
        ConfigError::Invalid { .. } => "backend configuration is invalid; backend disabled",
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
