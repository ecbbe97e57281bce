//! Parse LiveQuery WebSocket client.
//!
//! ARCHITECTURE
//! ============
//! One socket per subscription. The handshake (`connect` → `connected`,
//! `subscribe` → `subscribed`) runs inline so setup failures reach the
//! caller. After that a pump task owns the socket and forwards `create`
//! events over an mpsc channel until the `Subscription` handle cancels it.
//!
//! ERROR HANDLING
//! ==============
//! Post-handshake failures are logged and end the stream; the receiver sees
//! `None`. Nothing reconnects.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

use super::types::{BackendError, MessageRecord, parse_message_record};
use super::{LiveQuery, Subscription};
use crate::config::BackendConfig;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Each socket carries exactly one subscription.
const REQUEST_ID: i64 = 1;
const EVENT_BUFFER: usize = 64;

// =============================================================================
// WIRE OPS
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum ClientOp<'a> {
    #[serde(rename_all = "camelCase")]
    Connect {
        application_id: &'a str,
        javascript_key: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        session_token: Option<&'a str>,
    },
    #[serde(rename_all = "camelCase")]
    Subscribe {
        request_id: i64,
        query: QuerySpec<'a>,
        #[serde(skip_serializing_if = "Option::is_none")]
        session_token: Option<&'a str>,
    },
    #[serde(rename_all = "camelCase")]
    Unsubscribe { request_id: i64 },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuerySpec<'a> {
    class_name: &'a str,
    #[serde(rename = "where")]
    filter: Map<String, Value>,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "lowercase")]
enum ServerOp {
    Connected {},
    #[serde(rename_all = "camelCase")]
    Subscribed { request_id: i64 },
    #[serde(rename_all = "camelCase")]
    Unsubscribed { request_id: i64 },
    #[serde(rename_all = "camelCase")]
    Create { request_id: i64, object: Value },
    Error {
        #[serde(default)]
        code: Option<i64>,
        #[serde(default)]
        error: Option<String>,
    },
    /// `enter`, `update`, `leave`, `delete` and anything newer.
    #[serde(other)]
    Other,
}

fn encode_op(op: &ClientOp<'_>) -> Result<Message, BackendError> {
    let json = serde_json::to_string(op).map_err(|e| BackendError::Parse(e.to_string()))?;
    Ok(Message::text(json))
}

fn decode_op(text: &str) -> Result<ServerOp, BackendError> {
    serde_json::from_str(text).map_err(|e| BackendError::Parse(format!("bad live query op: {e}")))
}

// =============================================================================
// CLIENT
// =============================================================================

pub struct LiveQueryClient {
    url: String,
    application_id: String,
    javascript_key: String,
    class_name: String,
    handshake_timeout: Duration,
}

impl LiveQueryClient {
    #[must_use]
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            url: config.live_query_url.clone(),
            application_id: config.app_id.clone(),
            javascript_key: config.js_key.clone(),
            class_name: config.message_class.clone(),
            handshake_timeout: Duration::from_secs(config.timeouts.connect_secs),
        }
    }

    async fn handshake(&self, session_token: Option<&str>) -> Result<WsStream, BackendError> {
        let (mut stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;

        let connect = ClientOp::Connect {
            application_id: &self.application_id,
            javascript_key: &self.javascript_key,
            session_token,
        };
        send_op(&mut stream, &connect).await?;
        expect_op(&mut stream, |op| matches!(op, ServerOp::Connected {})).await?;

        let subscribe = ClientOp::Subscribe {
            request_id: REQUEST_ID,
            query: QuerySpec { class_name: &self.class_name, filter: Map::new() },
            session_token,
        };
        send_op(&mut stream, &subscribe).await?;
        expect_op(&mut stream, |op| matches!(op, ServerOp::Subscribed { request_id: REQUEST_ID })).await?;

        Ok(stream)
    }
}

#[async_trait::async_trait]
impl LiveQuery for LiveQueryClient {
    async fn subscribe_created(&self, session_token: Option<&str>) -> Result<Subscription, BackendError> {
        let stream = tokio::time::timeout(self.handshake_timeout, self.handshake(session_token))
            .await
            .map_err(|_| BackendError::Timeout)??;
        debug!(url = %self.url, class = %self.class_name, "live query subscribed");

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let task = tokio::spawn(pump(stream, tx, cancel_rx));
        Ok(Subscription::new(rx, cancel_tx, Some(task)))
    }
}

// =============================================================================
// SOCKET HELPERS
// =============================================================================

async fn send_op(stream: &mut WsStream, op: &ClientOp<'_>) -> Result<(), BackendError> {
    stream
        .send(encode_op(op)?)
        .await
        .map_err(|e| BackendError::Request(e.to_string()))
}

/// Read the next text frame as a server op, skipping control frames.
async fn next_op(stream: &mut WsStream) -> Result<ServerOp, BackendError> {
    loop {
        let Some(message) = stream.next().await else {
            return Err(BackendError::Closed);
        };
        match message.map_err(|e| BackendError::Request(e.to_string()))? {
            Message::Text(text) => return decode_op(text.as_str()),
            Message::Close(_) => return Err(BackendError::Closed),
            _ => {}
        }
    }
}

/// Wait for an op matching `accept`; a server `error` op fails the handshake.
async fn expect_op<F>(stream: &mut WsStream, accept: F) -> Result<ServerOp, BackendError>
where
    F: Fn(&ServerOp) -> bool,
{
    loop {
        let op = next_op(stream).await?;
        if let ServerOp::Error { code, error } = op {
            return Err(BackendError::LiveQuery {
                code: code.unwrap_or_default(),
                message: error.unwrap_or_else(|| "unknown live query error".to_owned()),
            });
        }
        if accept(&op) {
            return Ok(op);
        }
    }
}

async fn release(stream: &mut WsStream) {
    let _ = send_op(stream, &ClientOp::Unsubscribe { request_id: REQUEST_ID }).await;
    let _ = stream.close(None).await;
    debug!("live query subscription released");
}

async fn pump(mut stream: WsStream, events: mpsc::Sender<MessageRecord>, mut cancel: oneshot::Receiver<()>) {
    loop {
        tokio::select! {
            _ = &mut cancel => {
                release(&mut stream).await;
                return;
            }
            op = next_op(&mut stream) => match op {
                Ok(ServerOp::Create { request_id: REQUEST_ID, object }) => match parse_message_record(&object) {
                    Ok(msg) => {
                        if events.send(msg).await.is_err() {
                            release(&mut stream).await;
                            return;
                        }
                    }
                    Err(e) => warn!(error = %e, "dropping malformed live message"),
                },
                Ok(ServerOp::Error { code, error }) => {
                    warn!(code = code.unwrap_or_default(), error = error.as_deref().unwrap_or(""), "live query server error");
                }
                Ok(_) => {}
                Err(BackendError::Parse(e)) => warn!(error = %e, "ignoring undecodable live query frame"),
                Err(e) => {
                    warn!(error = %e, code = e.error_code(), "live query stream ended");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "live_query_test.rs"]
mod tests;
