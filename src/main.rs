mod app;
mod backend;
mod config;
mod pages;
mod routes;
mod services;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use backend::{BackendError, NewMessage};
use config::BackendConfig;
use services::session::{SessionError, SessionManager};
use services::token_store::FileTokenStore;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("failed to load env file: {0}")]
    EnvFile(#[from] dotenvy::Error),
    #[error("backend is not configured; set PARSE_APP_ID and PARSE_JS_KEY")]
    NotConfigured,
    #[error("not logged in; run `livechat login` first")]
    NotLoggedIn,
    #[error("message text is empty")]
    EmptyMessage,
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("terminal I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "livechat", about = "Real-time chat client for a Parse-compatible backend")]
struct Cli {
    /// Load environment variables from this file instead of `./.env`.
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Where the logged-in session is kept between runs.
    #[arg(long)]
    session_file: Option<PathBuf>,

    /// Column width used to right-align your own messages.
    #[arg(long, env = "COLUMNS", default_value_t = pages::chat::DEFAULT_WIDTH)]
    width: usize,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive login and chat screens (default).
    Run,
    Login {
        #[arg(long)]
        username: String,
        #[arg(long, env = "LIVECHAT_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Logout,
    Whoami,
    /// Print the full message history.
    History,
    /// Send one message as the logged-in user.
    Send { text: String },
}

struct Context {
    session: Arc<SessionManager>,
    backend: Option<backend::Backend>,
    width: usize,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    match &cli.env_file {
        Some(path) => {
            dotenvy::from_path(path)?;
        }
        None => {
            // A missing ./.env is normal.
            let _ = dotenvy::dotenv();
        }
    }

    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let config = BackendConfig::from_env();
    let session_file = cli.session_file.clone().unwrap_or_else(config::session_file_from_env);

    // Non-fatal: without credentials the app still starts with login disabled.
    let backend = backend::init(config);
    let token_store = Arc::new(FileTokenStore::new(session_file));
    tracing::debug!(path = %token_store.path().display(), "session file");
    let session = Arc::new(SessionManager::new(backend.as_ref().map(|b| b.auth.clone()), token_store));
    let ctx = Context { session, backend, width: cli.width };

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_interactive(ctx).await,
        Command::Login { username, password } => run_login(&ctx, &username, &password).await,
        Command::Logout => run_logout(&ctx).await,
        Command::Whoami => {
            run_whoami(&ctx);
            Ok(())
        }
        Command::History => run_history(&ctx).await,
        Command::Send { text } => run_send(&ctx, &text).await,
    }
}

async fn run_interactive(ctx: Context) -> Result<(), CliError> {
    let start = routes::initial(&ctx.session);
    tracing::info!(route = start.path(), "starting");
    let password_input = pages::login::PasswordInput::detect(std::io::stdin().is_terminal());
    let app = app::App::new(ctx.session, ctx.backend, ctx.width, password_input);
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut out = std::io::stdout();
    app.run(start, &mut input, &mut out).await?;
    Ok(())
}

async fn run_login(ctx: &Context, username: &str, password: &str) -> Result<(), CliError> {
    ctx.session.login(username, password).await?;
    if let Some(user) = ctx.session.current_user() {
        println!("logged in as {}", user.username);
    }
    Ok(())
}

async fn run_logout(ctx: &Context) -> Result<(), CliError> {
    ctx.session.logout().await?;
    println!("logged out");
    Ok(())
}

fn run_whoami(ctx: &Context) {
    match ctx.session.current_user() {
        Some(user) => println!("{}", user.username),
        None => println!("not logged in"),
    }
}

async fn run_history(ctx: &Context) -> Result<(), CliError> {
    let backend = ctx.backend.as_ref().ok_or(CliError::NotConfigured)?;
    let token = ctx.session.session_token();
    let messages = backend.messages.list_messages(token.as_deref()).await?;
    let current = ctx.session.current_user().map(|user| user.username);
    for msg in &messages {
        println!("{}", pages::chat::render_message(msg, current.as_deref(), ctx.width));
    }
    Ok(())
}

async fn run_send(ctx: &Context, text: &str) -> Result<(), CliError> {
    let backend = ctx.backend.as_ref().ok_or(CliError::NotConfigured)?;
    let user = ctx.session.current_user().ok_or(CliError::NotLoggedIn)?;
    let text = text.trim();
    if text.is_empty() {
        return Err(CliError::EmptyMessage);
    }

    let token = ctx.session.session_token();
    let message = NewMessage { text: text.to_owned(), sender: user.username };
    let saved = backend.messages.create_message(&message, token.as_deref()).await?;
    println!("{}", pages::chat::render_message(&saved, Some(&message.sender), ctx.width));
    Ok(())
}
