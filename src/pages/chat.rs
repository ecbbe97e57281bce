//! Chat page — renders the room and turns terminal input into actions.
//!
//! ARCHITECTURE
//! ============
//! One `select!` loop drives the page: terminal lines, live events, and the
//! completions of spawned history/save requests. Results are applied through
//! `ChatRoom`, which drops anything that lands after teardown.

use std::io::Write;

use time::macros::format_description;
use tokio::io::{AsyncBufRead, Lines};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error};

use crate::backend::{BackendError, MessageRecord};
use crate::routes::Route;
use crate::services::chat::{ChatPhase, ChatRoom, SubmitOutcome, SubmitTicket};
use crate::services::session::SessionManager;

pub const DEFAULT_WIDTH: usize = 72;

// =============================================================================
// RENDERING
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Mine,
    Theirs,
}

#[must_use]
pub fn side_of(msg: &MessageRecord, current_username: Option<&str>) -> Side {
    match current_username {
        Some(name) if name == msg.sender => Side::Mine,
        _ => Side::Theirs,
    }
}

/// One line per message: own messages right-aligned, others left-aligned.
#[must_use]
pub fn render_message(msg: &MessageRecord, current_username: Option<&str>, width: usize) -> String {
    let time = msg
        .created_at
        .format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_default();
    let sender = if msg.sender.is_empty() { "(anonymous)" } else { msg.sender.as_str() };
    let line = format!("[{time}] {sender}: {}", msg.text);
    match side_of(msg, current_username) {
        Side::Mine => format!("{line:>width$}"),
        Side::Theirs => line,
    }
}

#[must_use]
pub fn render_header(current_username: Option<&str>) -> String {
    match current_username {
        Some(name) => format!("== Chat App == signed in as {name} (/logout, /quit)"),
        None => "== Chat App == (/quit)".to_owned(),
    }
}

// =============================================================================
// INPUT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Send(String),
    Retry,
    Logout,
    Quit,
}

#[must_use]
pub fn parse_input(line: &str) -> ChatCommand {
    match line.trim() {
        "/quit" | "/exit" => ChatCommand::Quit,
        "/logout" => ChatCommand::Logout,
        "/retry" => ChatCommand::Retry,
        _ => ChatCommand::Send(line.to_owned()),
    }
}

// =============================================================================
// PAGE LOOP
// =============================================================================

type SaveResult = (SubmitTicket, Result<MessageRecord, BackendError>);

fn start_submission(room: &ChatRoom, saves: &mut JoinSet<SaveResult>) {
    let Some(ticket) = room.prepare_submission() else {
        return;
    };
    let request = room.submit_request(&ticket);
    saves.spawn(async move { (ticket, request.await) });
}

/// Apply a finished save. `deferred` is set while a history render is still
/// to come; that render includes the saved message, so it is not echoed here.
fn finish_submission<W: Write>(
    room: &mut ChatRoom,
    joined: Result<SaveResult, JoinError>,
    out: &mut W,
    width: usize,
    deferred: bool,
) -> std::io::Result<()> {
    let (ticket, result) = match joined {
        Ok(done) => done,
        Err(e) => {
            error!(error = %e, "message save task failed");
            return Ok(());
        }
    };
    match room.finish_submission(ticket, result) {
        SubmitOutcome::Sent { inserted: Some(index) } if !deferred => {
            let user = room.current_username();
            writeln!(out, "{}", render_message(&room.messages()[index], user.as_deref(), width))?;
        }
        SubmitOutcome::Failed => writeln!(out, "(message not sent; /retry to resend)")?,
        SubmitOutcome::Sent { .. } | SubmitOutcome::Stale => {}
    }
    Ok(())
}

fn render_all<W: Write>(room: &ChatRoom, out: &mut W, width: usize) -> std::io::Result<()> {
    let user = room.current_username();
    for msg in room.messages() {
        writeln!(out, "{}", render_message(msg, user.as_deref(), width))?;
    }
    debug!(revision = room.revision(), count = room.messages().len(), "chat view rendered");
    Ok(())
}

/// Run the chat page until the user leaves. Returns the next route, or
/// `None` to exit.
///
/// # Errors
///
/// Returns an I/O error if the terminal cannot be read or written.
pub async fn run<R, W>(
    room: &mut ChatRoom,
    session: &SessionManager,
    input: &mut Lines<R>,
    out: &mut W,
    width: usize,
) -> std::io::Result<Option<Route>>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    writeln!(out, "{}", render_header(room.current_username().as_deref()))?;

    let ticket = room.begin_mount().await;
    let history = room.load_history();
    let mut loads = JoinSet::new();
    loads.spawn(async move { (ticket, history.await) });
    let mut saves: JoinSet<SaveResult> = JoinSet::new();

    let next = loop {
        tokio::select! {
            Some(joined) = loads.join_next() => match joined {
                Ok((ticket, result)) => {
                    if room.apply_history(ticket, result) {
                        render_all(room, out, width)?;
                    }
                }
                Err(e) => error!(error = %e, "history task failed"),
            },
            Some(joined) = saves.join_next() => {
                let deferred = room.phase() == ChatPhase::Loading;
                finish_submission(room, joined, out, width, deferred)?;
            }
            event = room.next_live_event() => {
                if let Some(msg) = event {
                    if let Some(index) = room.apply_created(msg) {
                        // While loading, the history render covers early events.
                        if room.phase() == ChatPhase::Live {
                            let user = room.current_username();
                            writeln!(out, "{}", render_message(&room.messages()[index], user.as_deref(), width))?;
                        }
                    }
                }
            }
            line = input.next_line() => {
                let Some(line) = line? else {
                    break None;
                };
                match parse_input(&line) {
                    ChatCommand::Quit => break None,
                    ChatCommand::Logout => match session.logout().await {
                        Ok(()) => break Some(Route::Login),
                        Err(e) => writeln!(out, "Logout failed: {e}")?,
                    },
                    ChatCommand::Retry => start_submission(room, &mut saves),
                    // Blank lines keep a failed draft around for /retry.
                    ChatCommand::Send(text) if text.trim().is_empty() => {}
                    ChatCommand::Send(text) => {
                        room.set_draft(text);
                        start_submission(room, &mut saves);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break None,
        }
    };

    // Messages already handed to the store still complete before teardown.
    let deferred = room.phase() == ChatPhase::Loading;
    while let Some(joined) = saves.join_next().await {
        finish_submission(room, joined, out, width, deferred)?;
    }
    // History never arrived; show what was merged while waiting for it.
    if deferred && !room.messages().is_empty() {
        render_all(room, out, width)?;
    }
    room.unmount().await;
    Ok(next)
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
