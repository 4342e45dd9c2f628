//! # Notification Channel Integration Tests
//!
//! Drives a `NotificationClient` against an in-process WebSocket endpoint and
//! checks the handshake, routing, reconnection and shutdown behavior end to end.

use std::sync::Arc;
use std::time::Duration;

use lib_notify::{
    ClientConfig, ConnectionState, CredentialContext, Listener, Notification, NotificationClient, NotifyError,
};
use project_tests::{MockNotifyServer, RefusingServer, StallingServer, WAIT, init_logging, make_token, wait_until};
use serde_json::json;
use tokio::sync::mpsc;

fn config_for(endpoint: String, max_retries: u32, retry_base_delay_ms: u64) -> ClientConfig {
    ClientConfig {
        endpoint,
        max_retries,
        retry_base_delay_ms,
        connect_timeout_ms: 2_000,
        ..Default::default()
    }
}

/// A listener that forwards every delivery, tagged, to the test.
fn forwarder(tag: &'static str, tx: &mpsc::UnboundedSender<(&'static str, Notification)>) -> Listener {
    let tx = tx.clone();
    Arc::new(move |notification: &Notification| {
        let _ = tx.send((tag, notification.clone()));
    })
}

async fn next_delivery(
    rx: &mut mpsc::UnboundedReceiver<(&'static str, Notification)>,
) -> Option<(&'static str, Notification)> {
    tokio::time::timeout(WAIT, rx.recv()).await.ok().flatten()
}

#[tokio::test]
async fn test_handshake_carries_identity_role_and_token() {
    init_logging();
    let mut server = MockNotifyServer::start().await;
    let client = NotificationClient::new(config_for(server.endpoint(), 5, 50));
    let token = make_token(&json!({ "userId": "42", "sub": "alice" }));

    client
        .connect("customer", &CredentialContext::bearer(&token))
        .await
        .expect("connect to mock server");
    assert!(client.is_connected());
    assert_eq!(client.state(), ConnectionState::Open);

    let mut session = server.next_session(WAIT).await.expect("server session");
    assert_eq!(session.path(), "/notifications");
    assert_eq!(session.query_param("token").as_deref(), Some(token.as_str()));

    let handshake = session.next_json().await.expect("subscribe handshake");
    assert_eq!(
        handshake,
        json!({ "type": "subscribe", "userId": "42", "userType": "customer" })
    );

    client.disconnect().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_undecodable_token_sends_null_identity() {
    init_logging();
    let mut server = MockNotifyServer::start().await;
    let client = NotificationClient::new(config_for(server.endpoint(), 5, 50));

    client
        .connect("seller", &CredentialContext::bearer("not-a-jwt"))
        .await
        .expect("connect with opaque token");

    let mut session = server.next_session(WAIT).await.expect("server session");
    let handshake = session.next_json().await.expect("subscribe handshake");
    assert_eq!(
        handshake,
        json!({ "type": "subscribe", "userId": null, "userType": "seller" })
    );
}

#[tokio::test]
async fn test_pushed_frames_reach_matching_listeners() {
    init_logging();
    let mut server = MockNotifyServer::start().await;
    let client = NotificationClient::new(config_for(server.endpoint(), 5, 50));

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.subscribe("*", &forwarder("wildcard", &tx));
    client.subscribe("alert", &forwarder("alert", &tx));
    client.subscribe("order", &forwarder("order", &tx));
    client.subscribe("payment", &forwarder("payment", &tx));

    let token = make_token(&json!({ "sub": "alice" }));
    client.connect("admin", &CredentialContext::bearer(&token)).await.expect("connect");
    let mut session = server.next_session(WAIT).await.expect("server session");
    session.next_json().await.expect("subscribe handshake");

    session
        .push_json(&json!({ "type": "alert", "title": "Low stock", "sku": "A-1" }))
        .await;
    session.push_text("this is not json").await;
    session
        .push_json(&json!({ "message": "ORDER_ERROR: payment declined" }))
        .await;

    let (tag, first) = next_delivery(&mut rx).await.expect("wildcard delivery");
    assert_eq!(tag, "wildcard");
    assert_eq!(first.kind.as_deref(), Some("alert"));
    assert_eq!(first.field("sku"), Some(&json!("A-1")));

    let (tag, _) = next_delivery(&mut rx).await.expect("type delivery");
    assert_eq!(tag, "alert");

    // The malformed frame is dropped; the next one still arrives.
    let (tag, derived) = next_delivery(&mut rx).await.expect("wildcard delivery");
    assert_eq!(tag, "wildcard");
    assert_eq!(derived.service_name.as_deref(), Some("ORDER"));
    assert_eq!(derived.severity.as_deref(), Some("ERROR"));

    let (tag, _) = next_delivery(&mut rx).await.expect("service delivery");
    assert_eq!(tag, "order");

    assert!(
        tokio::time::timeout(Duration::from_millis(200), rx.recv()).await.is_err(),
        "no other listener should fire"
    );
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_frames_with_non_string_fields_are_delivered() {
    init_logging();
    let mut server = MockNotifyServer::start().await;
    let client = NotificationClient::new(config_for(server.endpoint(), 5, 50));

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.subscribe("*", &forwarder("wildcard", &tx));
    client.subscribe("alert", &forwarder("alert", &tx));

    client.connect("customer", &CredentialContext::anonymous()).await.expect("connect");
    let mut session = server.next_session(WAIT).await.expect("server session");
    session.next_json().await.expect("subscribe handshake");

    session.push_text(r#"{"type":"alert","id":42,"title":{"en":"Low stock"}}"#).await;

    let (tag, delivered) = next_delivery(&mut rx).await.expect("wildcard delivery");
    assert_eq!(tag, "wildcard");
    assert_eq!(delivered.field("id"), Some(&json!(42)));
    assert_eq!(delivered.field("title"), Some(&json!({ "en": "Low stock" })));

    let (tag, _) = next_delivery(&mut rx).await.expect("type delivery");
    assert_eq!(tag, "alert");
}

#[tokio::test]
async fn test_client_can_write_on_open_channel() {
    init_logging();
    let mut server = MockNotifyServer::start().await;
    let client = NotificationClient::new(config_for(server.endpoint(), 5, 50));

    client.connect("customer", &CredentialContext::anonymous()).await.expect("connect");
    let mut session = server.next_session(WAIT).await.expect("server session");
    assert_eq!(session.query_param("token"), None);
    session.next_json().await.expect("subscribe handshake");

    let ack = json!({ "type": "ack", "id": "n-17" });
    client.send(&ack).await.expect("send on open channel");
    assert_eq!(session.next_json().await, Some(ack));
}

#[tokio::test]
async fn test_reconnects_after_server_close() {
    init_logging();
    let mut server = MockNotifyServer::start().await;
    let client = NotificationClient::new(config_for(server.endpoint(), 5, 20));

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.subscribe("*", &forwarder("wildcard", &tx));

    let token = make_token(&json!({ "userId": 7 }));
    client.connect("customer", &CredentialContext::bearer(&token)).await.expect("connect");

    let mut first = server.next_session(WAIT).await.expect("first session");
    let handshake = first.next_json().await.expect("first handshake");
    first.close().await;

    let mut second = server.next_session(WAIT).await.expect("client should reconnect");
    assert_eq!(second.query_param("token").as_deref(), Some(token.as_str()));
    assert_eq!(second.next_json().await, Some(handshake));

    assert!(wait_until(|| client.is_connected(), WAIT).await);
    assert_eq!(client.retry_count(), 0);

    // Registrations carried over to the new channel.
    second.push_json(&json!({ "type": "payment", "amount": 12 })).await;
    let (tag, delivered) = next_delivery(&mut rx).await.expect("delivery after reconnect");
    assert_eq!(tag, "wildcard");
    assert_eq!(delivered.kind.as_deref(), Some("payment"));
}

#[tokio::test]
async fn test_retries_stop_after_budget() {
    init_logging();
    let server = RefusingServer::start().await;
    let client = NotificationClient::new(config_for(server.endpoint(), 5, 10));

    let result = client.connect("admin", &CredentialContext::anonymous()).await;
    assert!(result.is_err());

    // One explicit attempt plus five scheduled retries.
    assert!(wait_until(|| server.accepted() >= 6, WAIT).await);
    assert!(wait_until(|| client.state() == ConnectionState::Disconnected, WAIT).await);
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(server.accepted(), 6);
    assert_eq!(client.retry_count(), 5);
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_disconnect_cancels_pending_retry() {
    init_logging();
    let mut server = MockNotifyServer::start().await;
    let client = NotificationClient::new(config_for(server.endpoint(), 5, 300));

    client.connect("customer", &CredentialContext::anonymous()).await.expect("connect");
    let mut session = server.next_session(WAIT).await.expect("server session");
    session.next_json().await.expect("subscribe handshake");
    session.close().await;

    assert!(wait_until(|| client.state() == ConnectionState::Closed, WAIT).await);
    assert_eq!(client.retry_count(), 1);

    client.disconnect().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);

    assert!(server.next_session(Duration::from_millis(700)).await.is_none());
    assert_eq!(server.accepted(), 1);
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_explicit_connect_replaces_live_channel() {
    init_logging();
    let mut server = MockNotifyServer::start().await;
    let client = NotificationClient::new(config_for(server.endpoint(), 5, 50));

    client.connect("customer", &CredentialContext::anonymous()).await.expect("first connect");
    let mut first = server.next_session(WAIT).await.expect("first session");
    first.next_json().await.expect("first handshake");

    client.connect("admin", &CredentialContext::anonymous()).await.expect("second connect");
    let mut second = server.next_session(WAIT).await.expect("second session");
    let handshake = second.next_json().await.expect("second handshake");
    assert_eq!(handshake["userType"], json!("admin"));

    // The first channel was closed by the client, not left dangling.
    assert_eq!(first.next_json().await, None);
    assert!(client.is_connected());
    assert_eq!(server.accepted(), 2);
}

#[tokio::test]
async fn test_disconnect_abandons_hanging_handshake() {
    init_logging();
    let server = StallingServer::start().await;
    let client = NotificationClient::new(ClientConfig {
        endpoint: server.endpoint(),
        retry_base_delay_ms: 20,
        connect_timeout_ms: 10_000,
        ..Default::default()
    });

    let anonymous = CredentialContext::anonymous();
    let (connected, elapsed) = tokio::join!(
        client.connect("customer", &anonymous),
        async {
            assert!(wait_until(|| server.accepted() >= 1, WAIT).await);
            assert_eq!(client.state(), ConnectionState::Connecting);
            let started = tokio::time::Instant::now();
            client.disconnect().await;
            started.elapsed()
        }
    );

    assert!(elapsed < Duration::from_secs(1), "disconnect took {:?}", elapsed);
    assert!(matches!(connected, Err(NotifyError::Cancelled)));
    assert_eq!(client.state(), ConnectionState::Disconnected);

    // Nothing is rescheduled after the abandoned attempt.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.accepted(), 1);
    assert_eq!(client.retry_count(), 0);
}
