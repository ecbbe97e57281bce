//! Scripted fakes for the backend capability traits.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use time::macros::datetime;
use tokio::sync::{mpsc, oneshot};

use super::token_store::{StoredSession, TokenStore};
use crate::backend::{
    AuthProvider, AuthenticatedUser, Backend, BackendError, LiveQuery, MessageRecord, MessageStore, NewMessage,
    Subscription,
};

/// Build a message created `secs` seconds after a fixed epoch.
#[must_use]
pub fn msg(id: &str, sender: &str, text: &str, secs: i64) -> MessageRecord {
    MessageRecord {
        id: id.to_owned(),
        text: text.to_owned(),
        sender: sender.to_owned(),
        created_at: datetime!(2024-03-01 12:00 UTC) + time::Duration::seconds(secs),
    }
}

// =============================================================================
// AUTH
// =============================================================================

/// Accepts password `pw` for any username and resolves names to lowercase.
#[derive(Default)]
pub struct MockAuth {
    pub fail_logout: AtomicBool,
    pub log_in_calls: AtomicUsize,
    pub logged_out_tokens: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl AuthProvider for MockAuth {
    async fn log_in(&self, username: &str, password: &str) -> Result<AuthenticatedUser, BackendError> {
        self.log_in_calls.fetch_add(1, Ordering::SeqCst);
        if password != "pw" {
            return Err(BackendError::Api { status: 404, code: Some(101), message: "Invalid username/password.".into() });
        }
        let username = username.to_lowercase();
        Ok(AuthenticatedUser {
            object_id: format!("id-{username}"),
            session_token: format!("r:{username}"),
            username,
        })
    }

    async fn log_out(&self, session_token: &str) -> Result<(), BackendError> {
        if self.fail_logout.load(Ordering::SeqCst) {
            return Err(BackendError::Request("connection reset".into()));
        }
        self.logged_out_tokens.lock().unwrap().push(session_token.to_owned());
        Ok(())
    }
}

// =============================================================================
// TOKEN STORE
// =============================================================================

#[derive(Default)]
pub struct MemoryTokenStore {
    pub stored: Mutex<Option<StoredSession>>,
    pub fail_writes: AtomicBool,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn with(username: &str, token: &str) -> Self {
        Self {
            stored: Mutex::new(Some(StoredSession { username: username.into(), session_token: token.into() })),
            fail_writes: AtomicBool::new(false),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<StoredSession> {
        self.stored.lock().unwrap().clone()
    }

    fn save(&self, session: &StoredSession) -> std::io::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(std::io::Error::other("read-only"));
        }
        *self.stored.lock().unwrap() = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> std::io::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(std::io::Error::other("read-only"));
        }
        *self.stored.lock().unwrap() = None;
        Ok(())
    }
}

// =============================================================================
// MESSAGE STORE
// =============================================================================

#[derive(Default)]
pub struct MockStore {
    pub history: Mutex<Vec<MessageRecord>>,
    pub created: Mutex<Vec<NewMessage>>,
    pub fail_list: AtomicBool,
    pub fail_create: AtomicBool,
    pub list_calls: AtomicUsize,
}

impl MockStore {
    #[must_use]
    pub fn with_history(history: Vec<MessageRecord>) -> Self {
        Self { history: Mutex::new(history), ..Self::default() }
    }
}

#[async_trait::async_trait]
impl MessageStore for MockStore {
    async fn list_messages(&self, _session_token: Option<&str>) -> Result<Vec<MessageRecord>, BackendError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(BackendError::Request("offline".into()));
        }
        Ok(self.history.lock().unwrap().clone())
    }

    async fn create_message(
        &self,
        message: &NewMessage,
        _session_token: Option<&str>,
    ) -> Result<MessageRecord, BackendError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(BackendError::Api { status: 400, code: Some(119), message: "denied".into() });
        }
        let mut created = self.created.lock().unwrap();
        created.push(message.clone());
        let n = i64::try_from(created.len()).unwrap_or_default();
        Ok(msg(&format!("new{n}"), &message.sender, &message.text, 1000 + n))
    }
}

// =============================================================================
// LIVE QUERY
// =============================================================================

#[derive(Default)]
pub struct MockLive {
    pub fail_subscribe: AtomicBool,
    pub subscribe_calls: AtomicUsize,
    sender: Mutex<Option<mpsc::Sender<MessageRecord>>>,
    cancel: Mutex<Option<oneshot::Receiver<()>>>,
}

impl MockLive {
    /// Deliver a creation event; `false` if no live subscription is listening.
    pub fn push(&self, message: MessageRecord) -> bool {
        self.sender
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|tx| tx.try_send(message).is_ok())
    }

    /// Whether the most recent subscription has been released.
    pub fn released(&self) -> bool {
        self.cancel
            .lock()
            .unwrap()
            .as_mut()
            .is_some_and(|rx| rx.try_recv().is_ok())
    }
}

#[async_trait::async_trait]
impl LiveQuery for MockLive {
    async fn subscribe_created(&self, _session_token: Option<&str>) -> Result<Subscription, BackendError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(BackendError::LiveQuery { code: 4, message: "bad key".into() });
        }
        let (tx, rx) = mpsc::channel(16);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        *self.sender.lock().unwrap() = Some(tx);
        *self.cancel.lock().unwrap() = Some(cancel_rx);
        Ok(Subscription::new(rx, cancel_tx, None))
    }
}

// =============================================================================
// WIRING
// =============================================================================

pub struct Fakes {
    pub auth: Arc<MockAuth>,
    pub store: Arc<MockStore>,
    pub live: Arc<MockLive>,
}

impl Fakes {
    #[must_use]
    pub fn new(history: Vec<MessageRecord>) -> Self {
        Self {
            auth: Arc::new(MockAuth::default()),
            store: Arc::new(MockStore::with_history(history)),
            live: Arc::new(MockLive::default()),
        }
    }

    #[must_use]
    pub fn backend(&self) -> Backend {
        Backend { auth: self.auth.clone(), messages: self.store.clone(), live: self.live.clone() }
    }
}
