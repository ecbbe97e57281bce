//! App shell — drives the route loop over the login and chat pages.

use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, Lines};
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::pages;
use crate::pages::login::PasswordInput;
use crate::routes::{self, Route};
use crate::services::chat::ChatRoom;
use crate::services::session::SessionManager;

pub struct App {
    session: Arc<SessionManager>,
    backend: Option<Backend>,
    width: usize,
    password_input: PasswordInput,
}

impl App {
    #[must_use]
    pub fn new(
        session: Arc<SessionManager>,
        backend: Option<Backend>,
        width: usize,
        password_input: PasswordInput,
    ) -> Self {
        Self { session, backend, width, password_input }
    }

    /// Show pages until one of them asks to exit or input runs out.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the terminal cannot be read or written.
    pub async fn run<R, W>(&self, start: Route, input: &mut Lines<R>, out: &mut W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        if !self.session.is_configured() {
            writeln!(out, "Backend is not configured; check PARSE_APP_ID and PARSE_JS_KEY.")?;
        }

        let mut requested = start;
        loop {
            let route = routes::resolve(requested, &self.session);
            if route != requested {
                debug!(from = requested.path(), to = route.path(), "route redirected");
            }

            let next = match route {
                Route::Login => pages::login::run(&self.session, input, out, self.password_input).await?,
                Route::Chat => {
                    let Some(backend) = &self.backend else {
                        warn!("chat requested without a backend");
                        writeln!(out, "Chat is unavailable: backend is not configured.")?;
                        return Ok(());
                    };
                    let mut room = ChatRoom::new(backend, self.session.clone());
                    pages::chat::run(&mut room, &self.session, input, out, self.width).await?
                }
            };

            match next {
                Some(route) => requested = route,
                None => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
#[path = "app_test.rs"]
mod tests;
