//! Backend types — records, wire parsing, and errors.
//!
//! Provider-neutral shapes shared by the REST and LiveQuery clients. Pure
//! parsing lives here so both transports decode objects the same way.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by backend operations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The HTTP or WebSocket request could not be sent.
    #[error("request failed: {0}")]
    Request(String),

    /// The backend answered with a non-success status.
    #[error("backend error (status {status}, code {code:?}): {message}")]
    Api { status: u16, code: Option<i64>, message: String },

    /// The response body could not be decoded.
    #[error("response parse failed: {0}")]
    Parse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// The LiveQuery server rejected a connect or subscribe op.
    #[error("live query error (code {code}): {message}")]
    LiveQuery { code: i64, message: String },

    /// The LiveQuery socket closed before the handshake finished.
    #[error("live query connection closed")]
    Closed,

    /// No answer arrived within the configured timeout.
    #[error("timed out waiting for backend")]
    Timeout,
}

impl BackendError {
    /// Stable tag for log fields.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Request(_) => "E_REQUEST",
            Self::Api { .. } => "E_API",
            Self::Parse(_) => "E_PARSE",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
            Self::LiveQuery { .. } => "E_LIVE_QUERY",
            Self::Closed => "E_CLOSED",
            Self::Timeout => "E_TIMEOUT",
        }
    }
}

// =============================================================================
// RECORDS
// =============================================================================

/// A user authenticated by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub object_id: String,
    pub username: String,
    pub session_token: String,
}

/// A chat message as stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Store-assigned `objectId`.
    pub id: String,
    pub text: String,
    pub sender: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Fields written when creating a message. `createdAt` is assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewMessage {
    pub text: String,
    pub sender: String,
}

// =============================================================================
// PARSING
// =============================================================================

/// Parse a date field in either plain RFC 3339 or `{"__type":"Date","iso":...}` form.
pub(crate) fn parse_date(value: &Value) -> Result<OffsetDateTime, BackendError> {
    let raw = match value {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map
            .get("iso")
            .and_then(Value::as_str)
            .ok_or_else(|| BackendError::Parse("date object without iso field".to_owned()))?,
        other => return Err(BackendError::Parse(format!("unsupported date value: {other}"))),
    };
    OffsetDateTime::parse(raw, &Rfc3339).map_err(|e| BackendError::Parse(format!("bad date {raw:?}: {e}")))
}

/// Decode a message object from a query result or live event.
///
/// A missing `sender` decodes as an empty string; messages saved without a
/// session carry no sender.
pub(crate) fn parse_message_record(value: &Value) -> Result<MessageRecord, BackendError> {
    let id = value
        .get("objectId")
        .and_then(Value::as_str)
        .ok_or_else(|| BackendError::Parse("message missing objectId".to_owned()))?;
    let text = value
        .get("text")
        .and_then(Value::as_str)
        .ok_or_else(|| BackendError::Parse(format!("message {id} missing text")))?;
    let sender = value.get("sender").and_then(Value::as_str).unwrap_or_default();
    let created_at = parse_date(
        value
            .get("createdAt")
            .ok_or_else(|| BackendError::Parse(format!("message {id} missing createdAt")))?,
    )?;

    Ok(MessageRecord { id: id.to_owned(), text: text.to_owned(), sender: sender.to_owned(), created_at })
}

/// Decode a Parse error body (`{"code":101,"error":"..."}`) into a [`BackendError`].
pub(crate) fn parse_api_error(status: u16, body: &str) -> BackendError {
    #[derive(Deserialize)]
    struct ErrorBody {
        code: Option<i64>,
        error: Option<String>,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => BackendError::Api {
            status,
            code: parsed.code,
            message: parsed.error.unwrap_or_else(|| body.to_owned()),
        },
        Err(_) => BackendError::Api { status, code: None, message: body.to_owned() },
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
