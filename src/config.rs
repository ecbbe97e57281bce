//! Backend configuration parsed from environment variables.
//!
//! ERROR HANDLING
//! ==============
//! Missing credentials are a non-fatal `ConfigError`: the caller logs it and
//! runs with the backend disabled instead of exiting.

use std::path::PathBuf;

pub const DEFAULT_SERVER_URL: &str = "https://parseapi.back4app.com";
pub const DEFAULT_MESSAGE_CLASS: &str = "Message";
pub const DEFAULT_SESSION_FILE: &str = ".livechat-session.json";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Errors produced while reading backend configuration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    #[error("missing required config: env var {var} not set")]
    Missing { var: &'static str },

    /// A variable is set but cannot be used.
    #[error("invalid config value for {var}: {message}")]
    Invalid { var: &'static str, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub app_id: String,
    pub js_key: String,
    pub server_url: String,
    pub live_query_url: String,
    pub message_class: String,
    pub timeouts: Timeouts,
}

impl BackendConfig {
    /// Build typed backend config from process environment variables.
    ///
    /// Required:
    /// - `PARSE_APP_ID` (or `VITE_PARSE_APP_ID`)
    /// - `PARSE_JS_KEY` (or `VITE_PARSE_JS_KEY`)
    ///
    /// Optional:
    /// - `PARSE_SERVER_URL`: default back4app endpoint
    /// - `PARSE_LIVE_QUERY_URL`: derived from the server URL when absent
    /// - `PARSE_MESSAGE_CLASS`: default `Message`
    /// - `PARSE_REQUEST_TIMEOUT_SECS`: default 30
    /// - `PARSE_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a required value is absent or a value is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`BackendConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| non_empty(&lookup, key);

        let app_id = get("PARSE_APP_ID")
            .or_else(|| get("VITE_PARSE_APP_ID"))
            .ok_or(ConfigError::Missing { var: "PARSE_APP_ID" })?;
        let js_key = get("PARSE_JS_KEY")
            .or_else(|| get("VITE_PARSE_JS_KEY"))
            .ok_or(ConfigError::Missing { var: "PARSE_JS_KEY" })?;

        let server_url = get("PARSE_SERVER_URL")
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_owned())
            .trim_end_matches('/')
            .to_owned();
        let live_query_url = match get("PARSE_LIVE_QUERY_URL") {
            Some(url) => url.trim_end_matches('/').to_owned(),
            None => live_query_url_for(&server_url)?,
        };

        let message_class = get("PARSE_MESSAGE_CLASS").unwrap_or_else(|| DEFAULT_MESSAGE_CLASS.to_owned());

        let timeouts = Timeouts {
            request_secs: parse_secs(get("PARSE_REQUEST_TIMEOUT_SECS"), "PARSE_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?,
            connect_secs: parse_secs(get("PARSE_CONNECT_TIMEOUT_SECS"), "PARSE_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS)?,
        };

        Ok(Self { app_id, js_key, server_url, live_query_url, message_class, timeouts })
    }
}

/// Session file path from `LIVECHAT_SESSION_FILE`, independent of backend
/// credentials so a missing app id does not move the file.
#[must_use]
pub fn session_file_from_env() -> PathBuf {
    session_file_from_lookup(|key| std::env::var(key).ok())
}

pub fn session_file_from_lookup<F>(lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    PathBuf::from(non_empty(&lookup, "LIVECHAT_SESSION_FILE").unwrap_or_else(|| DEFAULT_SESSION_FILE.to_owned()))
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty())
}

fn parse_secs(raw: Option<String>, var: &'static str, default: u64) -> Result<u64, ConfigError> {
    match raw {
        None => Ok(default),
        Some(v) => v
            .parse::<u64>()
            .map_err(|e| ConfigError::Invalid { var, message: format!("{v:?}: {e}") }),
    }
}

/// Derive the LiveQuery WebSocket URL from the REST server URL.
fn live_query_url_for(server_url: &str) -> Result<String, ConfigError> {
    if let Some(rest) = server_url.strip_prefix("http://") {
        return Ok(format!("ws://{rest}"));
    }
    if let Some(rest) = server_url.strip_prefix("https://") {
        return Ok(format!("wss://{rest}"));
    }

    Err(ConfigError::Invalid { var: "PARSE_SERVER_URL", message: format!("expected http(s) URL, got {server_url}") })
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
