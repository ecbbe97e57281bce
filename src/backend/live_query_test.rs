use super::*;
use crate::config::Timeouts;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::time::timeout;

// =============================================================================
// WIRE OPS
// =============================================================================

#[test]
fn connect_op_uses_parse_field_names() {
    let op = ClientOp::Connect { application_id: "app", javascript_key: "js", session_token: Some("r:tok") };
    let value = serde_json::to_value(&op).unwrap();
    assert_eq!(
        value,
        json!({"op": "connect", "applicationId": "app", "javascriptKey": "js", "sessionToken": "r:tok"})
    );
}

#[test]
fn connect_op_omits_absent_session_token() {
    let op = ClientOp::Connect { application_id: "app", javascript_key: "js", session_token: None };
    let value = serde_json::to_value(&op).unwrap();
    assert!(value.get("sessionToken").is_none());
}

#[test]
fn subscribe_op_scopes_query_to_class() {
    let op = ClientOp::Subscribe {
        request_id: 1,
        query: QuerySpec { class_name: "Message", filter: Map::new() },
        session_token: None,
    };
    let value = serde_json::to_value(&op).unwrap();
    assert_eq!(value, json!({"op": "subscribe", "requestId": 1, "query": {"className": "Message", "where": {}}}));
}

#[test]
fn decode_op_reads_server_ops() {
    assert_eq!(decode_op(r#"{"op":"connected","clientId":"c1"}"#).unwrap(), ServerOp::Connected {});
    assert_eq!(
        decode_op(r#"{"op":"subscribed","clientId":"c1","requestId":1}"#).unwrap(),
        ServerOp::Subscribed { request_id: 1 }
    );
    assert_eq!(
        decode_op(r#"{"op":"error","code":4,"error":"bad key","reconnect":false}"#).unwrap(),
        ServerOp::Error { code: Some(4), error: Some("bad key".into()) }
    );
    assert_eq!(decode_op(r#"{"op":"leave","requestId":1,"object":{}}"#).unwrap(), ServerOp::Other);
}

#[test]
fn decode_op_create_carries_object() {
    let op = decode_op(r#"{"op":"create","requestId":1,"object":{"objectId":"m1"}}"#).unwrap();
    assert_eq!(op, ServerOp::Create { request_id: 1, object: json!({"objectId": "m1"}) });
}

#[test]
fn decode_op_rejects_non_json() {
    assert!(matches!(decode_op("hello"), Err(BackendError::Parse(_))));
}

// =============================================================================
// LOOPBACK SERVER
// =============================================================================

fn config(url: &str) -> BackendConfig {
    BackendConfig {
        app_id: "app".into(),
        js_key: "js".into(),
        server_url: url.replace("ws://", "http://"),
        live_query_url: url.to_owned(),
        message_class: "Message".into(),
        timeouts: Timeouts { request_secs: 2, connect_secs: 2 },
    }
}

async fn recv_json(ws: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        let msg = ws.next().await.expect("client closed").expect("ws error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn send_json(ws: &mut WebSocketStream<TcpStream>, value: Value) {
    ws.send(Message::text(value.to_string())).await.unwrap();
}

#[tokio::test]
async fn subscription_forwards_create_events_and_unsubscribes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = oneshot::channel::<Vec<Value>>();

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        let mut seen = Vec::new();

        let connect = recv_json(&mut ws).await;
        send_json(&mut ws, json!({"op": "connected", "clientId": "c1"})).await;
        seen.push(connect);

        let subscribe = recv_json(&mut ws).await;
        send_json(&mut ws, json!({"op": "subscribed", "clientId": "c1", "requestId": 1})).await;
        seen.push(subscribe);

        send_json(&mut ws, json!({"op": "update", "requestId": 1, "object": {}})).await;
        send_json(
            &mut ws,
            json!({"op": "create", "clientId": "c1", "requestId": 1, "object": {
                "className": "Message",
                "objectId": "m7",
                "text": "live hello",
                "sender": "bob",
                "createdAt": "2024-03-01T12:00:00.000Z"
            }}),
        )
        .await;

        seen.push(recv_json(&mut ws).await);
        let _ = seen_tx.send(seen);
    });

    let client = LiveQueryClient::new(&config(&format!("ws://{addr}")));
    let mut sub = client.subscribe_created(Some("r:tok")).await.unwrap();

    let msg = timeout(Duration::from_secs(2), sub.next()).await.unwrap().unwrap();
    assert_eq!(msg.id, "m7");
    assert_eq!(msg.text, "live hello");
    assert_eq!(msg.sender, "bob");

    sub.unsubscribe().await;

    let seen = timeout(Duration::from_secs(2), seen_rx).await.unwrap().unwrap();
    assert_eq!(seen[0]["op"], "connect");
    assert_eq!(seen[0]["applicationId"], "app");
    assert_eq!(seen[0]["sessionToken"], "r:tok");
    assert_eq!(seen[1]["op"], "subscribe");
    assert_eq!(seen[1]["query"]["className"], "Message");
    assert_eq!(seen[2], json!({"op": "unsubscribe", "requestId": 1}));
}

#[tokio::test]
async fn handshake_error_op_fails_subscribe() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        let _ = recv_json(&mut ws).await;
        send_json(&mut ws, json!({"op": "error", "code": 4, "error": "Key in request is not valid", "reconnect": false}))
            .await;
        let _ = ws.next().await;
    });

    let client = LiveQueryClient::new(&config(&format!("ws://{addr}")));
    let Err(err) = client.subscribe_created(None).await else {
        panic!("subscribe should fail");
    };
    assert!(matches!(err, BackendError::LiveQuery { code: 4, .. }));
}

#[tokio::test]
async fn server_close_ends_event_stream() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        let _ = recv_json(&mut ws).await;
        send_json(&mut ws, json!({"op": "connected"})).await;
        let _ = recv_json(&mut ws).await;
        send_json(&mut ws, json!({"op": "subscribed", "requestId": 1})).await;
        let _ = ws.close(None).await;
    });

    let client = LiveQueryClient::new(&config(&format!("ws://{addr}")));
    let mut sub = client.subscribe_created(None).await.unwrap();
    let next = timeout(Duration::from_secs(2), sub.next()).await.unwrap();
    assert!(next.is_none());
}

#[tokio::test]
async fn unreachable_server_fails_subscribe() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = LiveQueryClient::new(&config(&format!("ws://{addr}")));
    assert!(client.subscribe_created(None).await.is_err());
}
