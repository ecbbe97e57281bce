//! Parse REST API client.
//!
//! Thin HTTP wrapper over `/login`, `/logout`, and `/classes/{class}`.
//! Response decoding is split into pure functions for testability.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tracing::warn;

use super::types::{AuthenticatedUser, BackendError, MessageRecord, NewMessage, parse_api_error, parse_date, parse_message_record};
use super::{AuthProvider, MessageStore};
use crate::config::BackendConfig;

const APP_ID_HEADER: HeaderName = HeaderName::from_static("x-parse-application-id");
const JS_KEY_HEADER: HeaderName = HeaderName::from_static("x-parse-javascript-key");
const INSTALLATION_ID_HEADER: HeaderName = HeaderName::from_static("x-parse-installation-id");
const SESSION_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-parse-session-token");
const REVOCABLE_SESSION_HEADER: HeaderName = HeaderName::from_static("x-parse-revocable-session");

/// Largest page the hosted service returns for a single query.
const PAGE_LIMIT: usize = 1000;

// =============================================================================
// CLIENT
// =============================================================================

pub struct ParseRestClient {
    http: reqwest::Client,
    server_url: String,
    class_name: String,
    page_limit: usize,
}

impl ParseRestClient {
    /// Build a client with the application headers baked in.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::HttpClientBuild`] if a credential is not a valid
    /// header value or the TLS stack fails to initialize.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let mut headers = HeaderMap::new();
        headers.insert(APP_ID_HEADER, header_value(&config.app_id)?);
        headers.insert(JS_KEY_HEADER, header_value(&config.js_key)?);
        headers.insert(INSTALLATION_ID_HEADER, header_value(&uuid::Uuid::new_v4().to_string())?);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| BackendError::HttpClientBuild(e.to_string()))?;

        Ok(Self {
            http,
            server_url: config.server_url.clone(),
            class_name: config.message_class.clone(),
            page_limit: PAGE_LIMIT,
        })
    }

    #[cfg(test)]
    fn with_page_limit(mut self, page_limit: usize) -> Self {
        self.page_limit = page_limit;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.server_url, path)
    }

    fn class_url(&self) -> String {
        self.url(&format!("/classes/{}", self.class_name))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, BackendError> {
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(parse_api_error(status.as_u16(), &text));
        }

        serde_json::from_str(&text).map_err(|e| BackendError::Parse(e.to_string()))
    }
}

fn header_value(raw: &str) -> Result<HeaderValue, BackendError> {
    HeaderValue::from_str(raw).map_err(|e| BackendError::HttpClientBuild(e.to_string()))
}

fn with_session(request: reqwest::RequestBuilder, session_token: Option<&str>) -> reqwest::RequestBuilder {
    match session_token {
        Some(token) => request.header(SESSION_TOKEN_HEADER, token),
        None => request,
    }
}

// =============================================================================
// TRAIT IMPLS
// =============================================================================

#[async_trait::async_trait]
impl AuthProvider for ParseRestClient {
    async fn log_in(&self, username: &str, password: &str) -> Result<AuthenticatedUser, BackendError> {
        let request = self
            .http
            .post(self.url("/login"))
            .header(REVOCABLE_SESSION_HEADER, "1")
            .json(&serde_json::json!({ "username": username, "password": password }));
        let body = self.send(request).await?;
        parse_login_response(&body)
    }

    async fn log_out(&self, session_token: &str) -> Result<(), BackendError> {
        let request = self
            .http
            .post(self.url("/logout"))
            .header(SESSION_TOKEN_HEADER, session_token)
            .json(&serde_json::json!({}));
        self.send(request).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl MessageStore for ParseRestClient {
    async fn list_messages(&self, session_token: Option<&str>) -> Result<Vec<MessageRecord>, BackendError> {
        let mut messages = Vec::new();
        let mut skip = 0_usize;
        loop {
            let request = self.http.get(self.class_url()).query(&[
                ("order", "createdAt".to_owned()),
                ("limit", self.page_limit.to_string()),
                ("skip", skip.to_string()),
            ]);
            let body = self.send(with_session(request, session_token)).await?;
            let page_len = parse_query_page(&body, &mut messages)?;

            skip = skip.saturating_add(page_len);
            if page_len < self.page_limit {
                return Ok(messages);
            }
        }
    }

    async fn create_message(
        &self,
        message: &NewMessage,
        session_token: Option<&str>,
    ) -> Result<MessageRecord, BackendError> {
        let request = self.http.post(self.class_url()).json(message);
        let body = self.send(with_session(request, session_token)).await?;
        parse_create_response(&body, message)
    }
}

// =============================================================================
// PARSING
// =============================================================================

fn required_str<'a>(body: &'a Value, field: &str) -> Result<&'a str, BackendError> {
    body.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| BackendError::Parse(format!("response missing {field}")))
}

fn parse_login_response(body: &Value) -> Result<AuthenticatedUser, BackendError> {
    Ok(AuthenticatedUser {
        object_id: required_str(body, "objectId")?.to_owned(),
        username: required_str(body, "username")?.to_owned(),
        session_token: required_str(body, "sessionToken")?.to_owned(),
    })
}

/// Append decodable results to `out`, returning the raw page length.
///
/// Malformed rows are skipped with a warning so one bad record does not hide
/// the whole history.
fn parse_query_page(body: &Value, out: &mut Vec<MessageRecord>) -> Result<usize, BackendError> {
    let results = body
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| BackendError::Parse("query response missing results".to_owned()))?;

    for item in results {
        match parse_message_record(item) {
            Ok(msg) => out.push(msg),
            Err(e) => warn!(error = %e, "skipping malformed message record"),
        }
    }
    Ok(results.len())
}

fn parse_create_response(body: &Value, message: &NewMessage) -> Result<MessageRecord, BackendError> {
    let id = required_str(body, "objectId")?;
    let created_at = parse_date(
        body.get("createdAt")
            .ok_or_else(|| BackendError::Parse("response missing createdAt".to_owned()))?,
    )?;
    Ok(MessageRecord {
        id: id.to_owned(),
        text: message.text.clone(),
        sender: message.sender.clone(),
        created_at,
    })
}

#[cfg(test)]
#[path = "rest_test.rs"]
mod tests;
