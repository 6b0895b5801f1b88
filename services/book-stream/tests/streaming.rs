//! Subscriber lifecycle tests
//!
//! Tests include:
//! - Welcome frame on connect
//! - Fan-out order across several subscribers
//! - Disconnect isolation
//! - Lag handling under both policies
//!
//! Replays run with rate limiting off, so on the single-threaded test
//! runtime the whole replay completes before any subscriber task resumes.

use std::sync::Arc;
use std::time::Duration;

use book_stream::client::StreamClient;
use book_stream::config::{LagPolicy, StreamConfig};
use book_stream::distributor::StreamServer;
use book_stream::metrics::StreamMetrics;
use book_stream::synth::alternating_new_orders;
use book_stream::wire::{Control, ServerMessage};
use types::event::FeedEvent;

fn config(channel_capacity: usize, lag_policy: LagPolicy) -> StreamConfig {
    StreamConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        target_rate: 0,
        channel_capacity,
        lag_policy,
        welcome_message: "test feed".to_string(),
        ..StreamConfig::default()
    }
}

async fn bind(config: StreamConfig) -> (StreamServer, Arc<StreamMetrics>) {
    let metrics = Arc::new(StreamMetrics::new());
    let server = StreamServer::bind(config, Arc::clone(&metrics)).await.unwrap();
    (server, metrics)
}

async fn connect_welcomed(server: &StreamServer) -> StreamClient {
    let mut client = StreamClient::connect(server.local_addr()).await.unwrap();
    match client.next_message().await.unwrap() {
        Some(ServerMessage::Control(Control::Welcome { .. })) => client,
        other => panic!("expected welcome, got {:?}", other),
    }
}

async fn collect(client: &mut StreamClient, n: usize) -> Vec<FeedEvent> {
    let mut out = Vec::with_capacity(n);
    while out.len() < n {
        match tokio::time::timeout(Duration::from_secs(10), client.next_event())
            .await
            .unwrap()
            .unwrap()
        {
            Some(event) => out.push(event),
            None => break,
        }
    }
    out
}

/// Feed order as seen by a subscriber. Prices travel as JSON floats, so
/// order is compared by timestamp rather than by full equality.
fn timestamps(events: &[FeedEvent]) -> Vec<i64> {
    events
        .iter()
        .map(|e| match e {
            FeedEvent::Order(o) => o.timestamp,
            FeedEvent::Level(_) => -1,
        })
        .collect()
}

async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

#[tokio::test]
async fn test_welcome_frame_on_connect() {
    let (server, metrics) = bind(config(64, LagPolicy::Disconnect)).await;
    let mut client = StreamClient::connect(server.local_addr()).await.unwrap();

    match client.next_message().await.unwrap() {
        Some(ServerMessage::Control(Control::Welcome { message, timestamp })) => {
            assert_eq!(message, "test feed");
            assert!(timestamp > 0);
        }
        other => panic!("expected welcome, got {:?}", other),
    }
    assert!(eventually(|| metrics.snapshot().bytes_sent > 0).await);
    assert_eq!(metrics.snapshot().clients_connected, 1);

    server.close().await;
    assert_eq!(client.next_message().await.unwrap(), None);
}

#[tokio::test]
async fn test_every_subscriber_gets_every_event_in_order() {
    let (server, metrics) = bind(config(1_024, LagPolicy::Disconnect)).await;
    let mut a = connect_welcomed(&server).await;
    let mut b = connect_welcomed(&server).await;
    assert!(server.wait_for_subscribers(2, Duration::from_secs(5)).await);

    let events = alternating_new_orders("SYN", 500);
    let summary = server.replay(&events, |_| Ok::<(), String>(())).await;
    assert_eq!(summary.events_replayed, 500);

    assert_eq!(timestamps(&collect(&mut a, 500).await), timestamps(&events));
    assert_eq!(timestamps(&collect(&mut b, 500).await), timestamps(&events));
    assert_eq!(metrics.snapshot().messages_sent, 500);
    assert_eq!(metrics.snapshot().errors, 0);

    server.close().await;
    assert_eq!(a.next_event().await.unwrap(), None);
    assert_eq!(b.next_event().await.unwrap(), None);
}

#[tokio::test]
async fn test_disconnect_does_not_affect_others() {
    let (server, metrics) = bind(config(1_024, LagPolicy::Disconnect)).await;
    let mut stays = connect_welcomed(&server).await;
    let leaves = connect_welcomed(&server).await;
    assert!(server.wait_for_subscribers(2, Duration::from_secs(5)).await);

    drop(leaves);
    assert!(eventually(|| metrics.snapshot().clients_connected == 1).await);

    let events = alternating_new_orders("SYN", 200);
    let summary = server.replay(&events, |_| Ok::<(), String>(())).await;
    assert_eq!(summary.events_replayed, 200);
    assert_eq!(timestamps(&collect(&mut stays, 200).await), timestamps(&events));

    // A late subscriber only sees what is published after it joins.
    let mut late = connect_welcomed(&server).await;
    assert!(server.wait_for_subscribers(2, Duration::from_secs(5)).await);
    let more = alternating_new_orders("LATE", 10);
    server.replay(&more, |_| Ok::<(), String>(())).await;
    assert_eq!(timestamps(&collect(&mut late, 10).await), timestamps(&more));
    assert_eq!(timestamps(&collect(&mut stays, 10).await), timestamps(&more));

    server.close().await;
}

#[tokio::test]
async fn test_lagging_subscriber_drops_oldest() {
    let (server, metrics) = bind(config(16, LagPolicy::DropOldest)).await;
    let mut client = connect_welcomed(&server).await;
    assert!(server.wait_for_subscribers(1, Duration::from_secs(5)).await);

    let events = alternating_new_orders("SYN", 1_000);
    server.replay(&events, |_| Ok::<(), String>(())).await;

    let received = collect(&mut client, 16).await;
    assert_eq!(timestamps(&received), timestamps(&events[984..]));
    assert_eq!(metrics.snapshot().messages_dropped, 984);
    assert_eq!(metrics.snapshot().clients_connected, 1);

    server.close().await;
}

#[tokio::test]
async fn test_lagging_subscriber_disconnected() {
    let (server, metrics) = bind(config(16, LagPolicy::Disconnect)).await;
    let mut client = connect_welcomed(&server).await;
    assert!(server.wait_for_subscribers(1, Duration::from_secs(5)).await);

    let events = alternating_new_orders("SYN", 1_000);
    server.replay(&events, |_| Ok::<(), String>(())).await;

    let next = tokio::time::timeout(Duration::from_secs(10), client.next_message())
        .await
        .unwrap();
    assert!(matches!(next, Ok(None) | Err(_)));
    assert!(eventually(|| metrics.snapshot().clients_connected == 0).await);
    assert!(eventually(|| metrics.snapshot().errors == 1).await);
    assert_eq!(metrics.snapshot().messages_dropped, 0);

    server.close().await;
}
