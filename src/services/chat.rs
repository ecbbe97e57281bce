//! Chat room controller — history, live events, and message submission.
//!
//! DESIGN
//! ======
//! `ChatRoom` is the chat view's state machine:
//! `Unmounted → Loading → Live → Unmounted`. Mounting opens the live
//! subscription first and then fetches history, so events that race the
//! fetch are merged rather than lost.
//!
//! Incoming messages are merged by id at their creation-time position. The
//! store does not promise that creation events arrive in order, and a saved
//! message is seen twice (save response and live event).
//!
//! Every async operation is split into a `begin`/`apply` pair carrying a
//! generation ticket. Unmounting bumps the generation, so a response landing
//! after teardown is dropped instead of mutating a dead view.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error, warn};

use super::session::SessionManager;
use crate::backend::{Backend, BackendError, LiveQuery, MessageRecord, MessageStore, NewMessage, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatPhase {
    Unmounted,
    Loading,
    Live,
}

/// Ticket for an in-flight history fetch.
#[derive(Debug)]
pub struct LoadTicket {
    generation: u64,
}

/// Ticket for an in-flight message save.
#[derive(Debug)]
pub struct SubmitTicket {
    generation: u64,
    pub message: NewMessage,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Saved; `inserted` is the new index unless the live event got there first.
    Sent { inserted: Option<usize> },
    /// Save failed; the draft is kept for a manual retry.
    Failed,
    /// The view was torn down before the save finished.
    Stale,
}

pub struct ChatRoom {
    store: Arc<dyn MessageStore>,
    live: Arc<dyn LiveQuery>,
    session: Arc<SessionManager>,
    phase: ChatPhase,
    messages: Vec<MessageRecord>,
    draft: String,
    generation: u64,
    revision: u64,
    subscription: Option<Subscription>,
}

impl ChatRoom {
    #[must_use]
    pub fn new(backend: &Backend, session: Arc<SessionManager>) -> Self {
        Self {
            store: backend.messages.clone(),
            live: backend.live.clone(),
            session,
            phase: ChatPhase::Unmounted,
            messages: Vec::new(),
            draft: String::new(),
            generation: 0,
            revision: 0,
            subscription: None,
        }
    }

    #[must_use]
    pub fn phase(&self) -> ChatPhase {
        self.phase
    }

    #[must_use]
    pub fn messages(&self) -> &[MessageRecord] {
        &self.messages
    }

    /// Count of observable state changes since construction.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    #[must_use]
    pub fn current_username(&self) -> Option<String> {
        self.session.current_user().map(|user| user.username)
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    fn bump(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    // =========================================================================
    // MOUNT / UNMOUNT
    // =========================================================================

    /// Enter `Loading` and open the live subscription.
    ///
    /// A failed subscription is logged; the room still loads history.
    pub async fn begin_mount(&mut self) -> LoadTicket {
        if let Some(previous) = self.subscription.take() {
            previous.unsubscribe().await;
        }
        self.generation = self.generation.wrapping_add(1);
        self.phase = ChatPhase::Loading;
        self.messages.clear();
        self.bump();

        let token = self.session.session_token();
        match self.live.subscribe_created(token.as_deref()).await {
            Ok(subscription) => self.subscription = Some(subscription),
            Err(e) => error!(error = %e, code = e.error_code(), "live subscription failed"),
        }

        LoadTicket { generation: self.generation }
    }

    /// Detached history fetch; apply the result with [`ChatRoom::apply_history`].
    pub fn load_history(&self) -> impl Future<Output = Result<Vec<MessageRecord>, BackendError>> + Send + 'static {
        let store = self.store.clone();
        let token = self.session.session_token();
        async move { store.list_messages(token.as_deref()).await }
    }

    /// Replace the local sequence with fetched history, keeping live events
    /// that arrived while loading. Returns `false` for stale tickets.
    pub fn apply_history(&mut self, ticket: LoadTicket, result: Result<Vec<MessageRecord>, BackendError>) -> bool {
        if ticket.generation != self.generation || self.phase == ChatPhase::Unmounted {
            debug!("discarding history for a torn-down chat view");
            return false;
        }

        match result {
            Ok(history) => {
                let early = std::mem::replace(&mut self.messages, history);
                for msg in early {
                    merge_message(&mut self.messages, msg);
                }
            }
            Err(e) => error!(error = %e, code = e.error_code(), "error fetching messages"),
        }
        self.phase = ChatPhase::Live;
        self.bump();
        true
    }

    /// Release the subscription and invalidate in-flight work.
    pub async fn unmount(&mut self) {
        self.phase = ChatPhase::Unmounted;
        self.generation = self.generation.wrapping_add(1);
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe().await;
        }
    }

    // =========================================================================
    // LIVE EVENTS
    // =========================================================================

    /// Wait for the next creation event. Pends forever without a subscription.
    pub async fn next_live_event(&mut self) -> Option<MessageRecord> {
        let Some(subscription) = self.subscription.as_mut() else {
            return std::future::pending().await;
        };
        let next = subscription.next().await;
        if next.is_none() {
            warn!("live subscription ended; new messages will not appear until reload");
            self.subscription = None;
        }
        next
    }

    /// Merge one creation event. Returns its index, or `None` if it was a
    /// duplicate or the view is unmounted.
    pub fn apply_created(&mut self, msg: MessageRecord) -> Option<usize> {
        if self.phase == ChatPhase::Unmounted {
            return None;
        }
        let inserted = merge_message(&mut self.messages, msg);
        if inserted.is_some() {
            self.bump();
        }
        inserted
    }

    // =========================================================================
    // SUBMISSION
    // =========================================================================

    /// Build a save request from the draft. `None` for blank drafts, without a
    /// session, or while unmounted; the draft is never touched here.
    #[must_use]
    pub fn prepare_submission(&self) -> Option<SubmitTicket> {
        if self.phase == ChatPhase::Unmounted {
            return None;
        }
        let text = self.draft.trim();
        if text.is_empty() {
            return None;
        }
        let Some(sender) = self.current_username() else {
            warn!("refusing to send a message without a session");
            return None;
        };
        Some(SubmitTicket { generation: self.generation, message: NewMessage { text: text.to_owned(), sender } })
    }

    /// Detached save request for a prepared ticket.
    pub fn submit_request(
        &self,
        ticket: &SubmitTicket,
    ) -> impl Future<Output = Result<MessageRecord, BackendError>> + Send + 'static {
        let store = self.store.clone();
        let token = self.session.session_token();
        let message = ticket.message.clone();
        async move { store.create_message(&message, token.as_deref()).await }
    }

    /// Apply a save result: clear the draft on success, keep it on failure.
    pub fn finish_submission(
        &mut self,
        ticket: SubmitTicket,
        result: Result<MessageRecord, BackendError>,
    ) -> SubmitOutcome {
        if ticket.generation != self.generation || self.phase == ChatPhase::Unmounted {
            return SubmitOutcome::Stale;
        }
        match result {
            Ok(record) => {
                self.draft.clear();
                let inserted = merge_message(&mut self.messages, record);
                self.bump();
                SubmitOutcome::Sent { inserted }
            }
            Err(e) => {
                error!(error = %e, code = e.error_code(), "error sending message");
                SubmitOutcome::Failed
            }
        }
    }

}

/// Inline drivers and inspectors for tests; the page runs the split
/// `begin`/`apply` halves itself.
#[cfg(test)]
impl ChatRoom {
    #[must_use]
    pub fn draft(&self) -> &str {
        &self.draft
    }

    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Mount and load history inline.
    pub async fn mount(&mut self) {
        let ticket = self.begin_mount().await;
        let result = self.load_history().await;
        self.apply_history(ticket, result);
    }

    /// Submit the current draft inline. `None` if nothing was sent.
    pub async fn submit(&mut self) -> Option<SubmitOutcome> {
        let ticket = self.prepare_submission()?;
        let result = self.submit_request(&ticket).await;
        Some(self.finish_submission(ticket, result))
    }
}

/// Insert `msg` at its creation-time position unless its id is already present.
///
/// Equal timestamps keep arrival order.
pub(crate) fn merge_message(messages: &mut Vec<MessageRecord>, msg: MessageRecord) -> Option<usize> {
    if messages.iter().any(|m| m.id == msg.id) {
        return None;
    }
    let index = messages.partition_point(|m| m.created_at <= msg.created_at);
    messages.insert(index, msg);
    Some(index)
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
