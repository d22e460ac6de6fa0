//! Notification hub integration tests.
//!
//! These drive the hub task directly through its [`HubHandle`], without a
//! WebSocket transport: register connections, push messages, and observe
//! what lands in each connection's outbox.

use std::time::Duration;

use assert_matches::assert_matches;
use axum::extract::ws::Message;
use tokio::sync::mpsc;
use uuid::Uuid;

use darkroom_api::ws::{HubHandle, NotificationHub, OUTBOX_CAPACITY};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn recv_message(rx: &mut mpsc::Receiver<Message>) -> Message {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("outbox closed before the expected frame arrived")
}

fn text_of(message: Message) -> String {
    match message {
        Message::Text(text) => text.as_str().to_string(),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

async fn recv_json(rx: &mut mpsc::Receiver<Message>) -> serde_json::Value {
    let text = text_of(recv_message(rx).await);
    serde_json::from_str(&text).expect("frame should be valid JSON")
}

/// Poll hub stats until they match, or panic after a generous deadline.
/// Stats are refreshed by the hub task after it processes each command,
/// so tests wait rather than assert immediately.
async fn wait_for_stats(hub: &HubHandle, connections: usize, owners: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let stats = hub.stats().await;
        if stats.total_connections == connections && stats.distinct_owners == owners {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for stats ({connections} connections, {owners} owners), last saw {stats:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn text(content: String) -> Message {
    Message::Text(content.into())
}

// ---------------------------------------------------------------------------
// Registration and the welcome frame
// ---------------------------------------------------------------------------

#[tokio::test]
async fn welcome_frame_arrives_before_any_notification() {
    let (hub, _task) = NotificationHub::start();
    let conn_id = Uuid::new_v4();

    let mut rx = hub.register(conn_id, Some(7)).await;
    hub.notify_owner(7, text("first notification".to_string()))
        .await;

    let welcome = recv_json(&mut rx).await;
    assert_eq!(welcome["type"], "connection.established");
    assert_eq!(welcome["owner_id"], 7);
    assert_eq!(welcome["payload"]["authenticated"], true);
    assert_eq!(welcome["payload"]["connection_id"], conn_id.to_string());
    assert!(welcome["timestamp"].is_string());

    let next = text_of(recv_message(&mut rx).await);
    assert_eq!(next, "first notification");
}

#[tokio::test]
async fn anonymous_connections_get_an_unauthenticated_welcome() {
    let (hub, _task) = NotificationHub::start();

    let mut rx = hub.register(Uuid::new_v4(), None).await;

    let welcome = recv_json(&mut rx).await;
    assert_eq!(welcome["type"], "connection.established");
    assert!(welcome["owner_id"].is_null());
    assert_eq!(welcome["payload"]["authenticated"], false);

    // An anonymous connection counts toward totals but owns nothing.
    wait_for_stats(&hub, 1, 0).await;
}

// ---------------------------------------------------------------------------
// Owner-targeted delivery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn notify_owner_targets_only_that_owners_connections() {
    let (hub, _task) = NotificationHub::start();

    let mut rx_a = hub.register(Uuid::new_v4(), Some(1)).await;
    let mut rx_b = hub.register(Uuid::new_v4(), Some(2)).await;
    let _ = recv_message(&mut rx_a).await;
    let _ = recv_message(&mut rx_b).await;

    hub.notify_owner(1, text("for owner one".to_string())).await;

    let delivered = text_of(recv_message(&mut rx_a).await);
    assert_eq!(delivered, "for owner one");

    // By the time A has its message the command is fully processed, so
    // B's outbox is deterministically still empty.
    assert_matches!(rx_b.try_recv(), Err(mpsc::error::TryRecvError::Empty));
}

#[tokio::test]
async fn owner_messages_arrive_in_order_on_every_connection() {
    let (hub, _task) = NotificationHub::start();

    let mut rx_a = hub.register(Uuid::new_v4(), Some(9)).await;
    let mut rx_b = hub.register(Uuid::new_v4(), Some(9)).await;
    let _ = recv_message(&mut rx_a).await;
    let _ = recv_message(&mut rx_b).await;
    wait_for_stats(&hub, 2, 1).await;

    for i in 0..3 {
        hub.notify_owner(9, text(format!("msg-{i}"))).await;
    }

    for rx in [&mut rx_a, &mut rx_b] {
        for i in 0..3 {
            let frame = text_of(recv_message(rx).await);
            assert_eq!(frame, format!("msg-{i}"));
        }
    }
}

#[tokio::test]
async fn notify_without_live_connections_is_a_noop() {
    let (hub, _task) = NotificationHub::start();

    hub.notify_owner(42, text("nobody home".to_string())).await;

    // The hub stays healthy and later registrations work normally.
    let mut rx = hub.register(Uuid::new_v4(), Some(42)).await;
    let welcome = recv_json(&mut rx).await;
    assert_eq!(welcome["type"], "connection.established");
    assert_matches!(rx.try_recv(), Err(mpsc::error::TryRecvError::Empty));
}

// ---------------------------------------------------------------------------
// Unregistration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unregister_closes_the_outbox_and_is_idempotent() {
    let (hub, _task) = NotificationHub::start();
    let conn_id = Uuid::new_v4();

    let mut rx = hub.register(conn_id, Some(3)).await;
    let _ = recv_message(&mut rx).await;
    wait_for_stats(&hub, 1, 1).await;

    hub.unregister(conn_id).await;
    hub.unregister(conn_id).await;
    wait_for_stats(&hub, 0, 0).await;

    // Dropping the registration drops the outbox sender.
    assert!(rx.recv().await.is_none());

    // Messages for the departed owner are dropped without incident.
    hub.notify_owner(3, text("too late".to_string())).await;
    wait_for_stats(&hub, 0, 0).await;
}

// ---------------------------------------------------------------------------
// Backpressure and eviction
// ---------------------------------------------------------------------------

#[tokio::test]
async fn slow_connection_is_evicted_when_its_outbox_overflows() {
    let (hub, _task) = NotificationHub::start();

    // A never drains its outbox; B is drained after every push.
    let mut rx_a = hub.register(Uuid::new_v4(), Some(1)).await;
    let mut rx_b = hub.register(Uuid::new_v4(), Some(1)).await;
    let _ = recv_message(&mut rx_b).await;
    wait_for_stats(&hub, 2, 1).await;

    let total = OUTBOX_CAPACITY + 1;
    for i in 0..total {
        hub.notify_owner(1, text(format!("msg-{i}"))).await;
        let frame = text_of(recv_message(&mut rx_b).await);
        assert_eq!(frame, format!("msg-{i}"));
    }

    // A's outbox held the welcome plus OUTBOX_CAPACITY - 1 messages when
    // the next push found it full, so A is gone while B lives on.
    wait_for_stats(&hub, 1, 1).await;

    let welcome = recv_json(&mut rx_a).await;
    assert_eq!(welcome["type"], "connection.established");
    for i in 0..OUTBOX_CAPACITY - 1 {
        let frame = text_of(recv_message(&mut rx_a).await);
        assert_eq!(frame, format!("msg-{i}"));
    }
    assert!(
        rx_a.recv().await.is_none(),
        "an evicted connection's outbox must be closed"
    );
}

// ---------------------------------------------------------------------------
// Broadcast
// ---------------------------------------------------------------------------

#[tokio::test]
async fn broadcast_reaches_every_connection_including_anonymous() {
    let (hub, _task) = NotificationHub::start();

    let mut rx_a = hub.register(Uuid::new_v4(), Some(1)).await;
    let mut rx_b = hub.register(Uuid::new_v4(), Some(2)).await;
    let mut rx_anon = hub.register(Uuid::new_v4(), None).await;
    for rx in [&mut rx_a, &mut rx_b, &mut rx_anon] {
        let _ = recv_message(rx).await;
    }

    hub.broadcast(text("maintenance at midnight".to_string()))
        .await;

    for rx in [&mut rx_a, &mut rx_b, &mut rx_anon] {
        let frame = text_of(recv_message(rx).await);
        assert_eq!(frame, "maintenance at midnight");
    }
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_sends_close_to_every_connection() {
    let (hub, task) = NotificationHub::start();

    let mut rx_a = hub.register(Uuid::new_v4(), Some(1)).await;
    let mut rx_b = hub.register(Uuid::new_v4(), None).await;
    let _ = recv_message(&mut rx_a).await;
    let _ = recv_message(&mut rx_b).await;
    wait_for_stats(&hub, 2, 1).await;

    hub.shutdown().await;
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("hub task should stop after shutdown")
        .expect("hub task should not panic");

    for rx in [&mut rx_a, &mut rx_b] {
        assert_matches!(recv_message(rx).await, Message::Close(_));
        assert!(rx.recv().await.is_none());
    }
    let stats = hub.stats().await;
    assert_eq!(stats.total_connections, 0);
    assert_eq!(stats.distinct_owners, 0);
}
