//! Login page — username + password against the session manager.

use std::io::Write;

use tokio::io::{AsyncBufRead, Lines};
use tracing::warn;

use crate::routes::Route;
use crate::services::session::SessionManager;

pub const LOGIN_FAILED_NOTICE: &str = "Login failed. Please check your credentials.";

/// Where the password line comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordInput {
    /// The shared line reader; used for piped or scripted input.
    Lines,
    /// The terminal with echo turned off.
    Masked,
}

impl PasswordInput {
    #[must_use]
    pub fn detect(stdin_is_terminal: bool) -> Self {
        if stdin_is_terminal { Self::Masked } else { Self::Lines }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Navigate(Route),
    Notice(&'static str),
}

/// Both fields are required; nothing else is checked.
///
/// # Errors
///
/// Returns the prompt to show for the first empty field.
pub fn validate_credentials(username: &str, password: &str) -> Result<(), &'static str> {
    if username.is_empty() {
        return Err("Username is required.");
    }
    if password.is_empty() {
        return Err("Password is required.");
    }
    Ok(())
}

/// Validate and submit credentials.
pub async fn submit(session: &SessionManager, username: &str, password: &str) -> LoginOutcome {
    if let Err(prompt) = validate_credentials(username, password) {
        return LoginOutcome::Notice(prompt);
    }
    match session.login(username, password).await {
        Ok(()) => LoginOutcome::Navigate(Route::Chat),
        Err(e) => {
            warn!(error = %e, "login failed");
            LoginOutcome::Notice(LOGIN_FAILED_NOTICE)
        }
    }
}

/// Prompt until login succeeds. `None` when input is exhausted.
///
/// # Errors
///
/// Returns an I/O error if the terminal cannot be read or written.
pub async fn run<R, W>(
    session: &SessionManager,
    input: &mut Lines<R>,
    out: &mut W,
    password_input: PasswordInput,
) -> std::io::Result<Option<Route>>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    writeln!(out, "== Chat App Login ==")?;
    loop {
        write!(out, "Username: ")?;
        out.flush()?;
        let Some(username) = input.next_line().await? else {
            return Ok(None);
        };

        let password = match password_input {
            PasswordInput::Lines => {
                write!(out, "Password: ")?;
                out.flush()?;
                input.next_line().await?
            }
            PasswordInput::Masked => read_masked("Password: ").await?,
        };
        let Some(password) = password else {
            return Ok(None);
        };

        match submit(session, &username, &password).await {
            LoginOutcome::Navigate(route) => return Ok(Some(route)),
            LoginOutcome::Notice(notice) => writeln!(out, "{notice}")?,
        }
    }
}

/// Prompt on the controlling terminal without echoing the typed text.
async fn read_masked(prompt: &'static str) -> std::io::Result<Option<String>> {
    match tokio::task::spawn_blocking(move || rpassword::prompt_password(prompt)).await {
        Ok(Ok(password)) => Ok(Some(password)),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
        Ok(Err(e)) => Err(e),
        Err(e) => Err(std::io::Error::other(e)),
    }
}

#[cfg(test)]
#[path = "login_test.rs"]
mod tests;
