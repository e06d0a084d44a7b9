//! Gateway lifecycle tests
//!
//! These drive whole shards over an in-memory transport while the test plays
//! the server. Timers run on tokio's paused clock, so identify windows and
//! heartbeat intervals elapse instantly and assertions on them are exact.

use concord_common::{ReconnectConfig, Token};
use concord_gateway::protocol::{Intents, PresenceUpdatePayload};
use concord_gateway::{
    GatewayError, ShardEvent, ShardEventKind, ShardManager, ShardManagerConfig, ShardState,
};
use integration_tests::{
    fixtures, helpers::ServerLink, TestConnector, TEST_TOKEN,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Heartbeat interval long enough to never fire during a test.
const QUIET_HEARTBEAT_MS: u64 = 600_000;

fn manager(
    shard_count: u16,
    max_concurrency: u16,
) -> (
    ShardManager,
    mpsc::Receiver<ShardEvent>,
    mpsc::UnboundedReceiver<ServerLink>,
) {
    let (connector, accepts) = TestConnector::new();
    let config = ShardManagerConfig {
        shard_count: Some(shard_count),
        max_concurrency: Some(max_concurrency),
        intents: Intents::unprivileged(),
        presence: None,
        reconnect: ReconnectConfig {
            max_attempts: 5,
            base_delay_ms: 10,
            max_delay_ms: 50,
        },
    };
    let (manager, events) = ShardManager::new(Token::new(TEST_TOKEN), config, connector);
    (manager, events, accepts)
}

/// Drain events until one matches.
async fn wait_for_event<F>(events: &mut mpsc::Receiver<ShardEvent>, mut pred: F) -> ShardEvent
where
    F: FnMut(&ShardEvent) -> bool,
{
    loop {
        let event = events.recv().await.expect("event channel closed");
        if pred(&event) {
            return event;
        }
    }
}

// ============================================================================
// Connect / identify
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_fresh_connection_identifies_and_reaches_ready() {
    let (mut manager, mut events, mut accepts) = manager(1, 1);
    manager.start().await.unwrap();

    let mut link = accepts.recv().await.unwrap();
    link.send(&fixtures::hello(QUIET_HEARTBEAT_MS));

    let identify = link.expect_op(2).await;
    assert_eq!(identify["d"]["token"], TEST_TOKEN);
    assert_eq!(identify["d"]["shard"][0], 0);
    assert_eq!(identify["d"]["shard"][1], 1);
    assert!(identify["d"]["properties"].is_object());

    link.send(&fixtures::ready("sess-1", 1));

    let identified = wait_for_event(&mut events, |e| {
        matches!(e.kind, ShardEventKind::Identified { .. })
    })
    .await;
    assert_eq!(identified.shard_id, 0);
    match identified.kind {
        ShardEventKind::Identified { session_id } => assert_eq!(session_id, "sess-1"),
        other => panic!("unexpected event {other:?}"),
    }

    // READY is also forwarded as a plain dispatch.
    wait_for_event(&mut events, |e| {
        matches!(&e.kind, ShardEventKind::Dispatch { event, .. } if event == "READY")
    })
    .await;

    assert_eq!(manager.shards()[0].state(), ShardState::Ready);
    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_queued_shard_heartbeats_while_awaiting_identify_slot() {
    let (mut manager, _events, mut accepts) = manager(2, 1);
    manager.start().await.unwrap();

    let mut link0 = accepts.recv().await.unwrap();
    let mut link1 = accepts.recv().await.unwrap();
    link0.send(&fixtures::hello(QUIET_HEARTBEAT_MS));
    link1.send(&fixtures::hello(100));

    // Shard 0 takes the bucket's only identify window.
    assert_eq!(link0.expect_op(2).await["d"]["shard"][0], 0);
    link0.send(&fixtures::ready("sess-0", 1));

    // Shard 1 is queued behind that window; its heartbeat timer runs from
    // hello anyway, so everything it sends until the slot frees up must be
    // a heartbeat, never the identify.
    let mut beats = 0;
    let identify = loop {
        let payload = link1.recv().await.unwrap();
        if payload["op"] == 2 {
            break payload;
        }
        assert_eq!(payload["op"], 1);
        beats += 1;
        link1.send(&fixtures::heartbeat_ack());
    };
    assert!(beats >= 10, "only {beats} heartbeats during the identify wait");
    assert_eq!(identify["d"]["shard"][0], 1);

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_dispatches_are_forwarded_with_shard_identity() {
    let (mut manager, mut events, mut accepts) = manager(1, 1);
    manager.start().await.unwrap();

    let mut link = accepts.recv().await.unwrap();
    link.send(&fixtures::hello(QUIET_HEARTBEAT_MS));
    link.expect_op(2).await;
    link.send(&fixtures::ready("sess-1", 1));
    link.send(&fixtures::dispatch(
        "MESSAGE_CREATE",
        2,
        serde_json::json!({"id": "42", "content": "hi"}),
    ));

    let event = wait_for_event(&mut events, |e| {
        matches!(&e.kind, ShardEventKind::Dispatch { event, .. } if event == "MESSAGE_CREATE")
    })
    .await;
    assert_eq!(event.shard_id, 0);
    match event.kind {
        ShardEventKind::Dispatch { sequence, data, .. } => {
            assert_eq!(sequence, 2);
            assert_eq!(data["content"], "hi");
        }
        other => panic!("unexpected event {other:?}"),
    }

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_presence_update_is_sent_on_the_live_connection() {
    let (mut manager, mut events, mut accepts) = manager(1, 1);
    manager.start().await.unwrap();

    let mut link = accepts.recv().await.unwrap();
    link.send(&fixtures::hello(QUIET_HEARTBEAT_MS));
    link.expect_op(2).await;
    link.send(&fixtures::ready("sess-1", 1));
    wait_for_event(&mut events, |e| {
        matches!(e.kind, ShardEventKind::Identified { .. })
    })
    .await;

    let shard = &manager.shards()[0];
    shard
        .update_presence(PresenceUpdatePayload::new("idle"))
        .unwrap();
    let update = link.expect_op(3).await;
    assert_eq!(update["d"]["status"], "idle");

    // Statuses outside the protocol's set are rejected before sending.
    assert!(shard
        .update_presence(PresenceUpdatePayload::new("sleeping"))
        .is_err());

    manager.shutdown().await;
}

// ============================================================================
// Heartbeats
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_acknowledged_heartbeats_keep_the_connection() {
    let (mut manager, _events, mut accepts) = manager(1, 1);
    manager.start().await.unwrap();

    let mut link = accepts.recv().await.unwrap();
    link.send(&fixtures::hello(100));
    link.expect_op(2).await;
    link.send(&fixtures::ready("sess-1", 7));

    for _ in 0..3 {
        let beat = link.expect_op(1).await;
        assert_eq!(beat["d"], 7);
        link.send(&fixtures::heartbeat_ack());
    }

    // Still on the original connection.
    assert!(accepts.try_recv().is_err());
    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_missed_heartbeat_ack_reconnects_with_resume() {
    let (mut manager, mut events, mut accepts) = manager(1, 1);
    manager.start().await.unwrap();

    let mut link = accepts.recv().await.unwrap();
    link.send(&fixtures::hello(100));
    link.expect_op(2).await;
    link.send(&fixtures::ready("sess-1", 1));

    // First heartbeat goes out; the server never acknowledges it, so the
    // next interval treats the connection as zombied.
    let beat = link.expect_op(1).await;
    assert_eq!(beat["d"], 1);

    let mut link2 = accepts.recv().await.unwrap();
    link2.send(&fixtures::hello(QUIET_HEARTBEAT_MS));

    // The session survived, so the shard resumes instead of re-identifying.
    let resume = link2.expect_op(4).await;
    assert_eq!(resume["d"]["token"], TEST_TOKEN);
    assert_eq!(resume["d"]["session_id"], "sess-1");
    assert_eq!(resume["d"]["seq"], 1);

    link2.send(&fixtures::resumed(2));
    wait_for_event(&mut events, |e| {
        matches!(e.kind, ShardEventKind::Resumed)
    })
    .await;
    assert_eq!(manager.shards()[0].state(), ShardState::Ready);

    manager.shutdown().await;
}

// ============================================================================
// Server-directed reconnects
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_reconnect_op_resumes_session() {
    let (mut manager, _events, mut accepts) = manager(1, 1);
    manager.start().await.unwrap();

    let mut link = accepts.recv().await.unwrap();
    link.send(&fixtures::hello(QUIET_HEARTBEAT_MS));
    link.expect_op(2).await;
    link.send(&fixtures::ready("sess-9", 3));
    link.send(&fixtures::reconnect());

    let mut link2 = accepts.recv().await.unwrap();
    link2.send(&fixtures::hello(QUIET_HEARTBEAT_MS));

    let resume = link2.expect_op(4).await;
    assert_eq!(resume["d"]["session_id"], "sess-9");
    assert_eq!(resume["d"]["seq"], 3);

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_fresh_invalid_session_reidentifies_through_throttle() {
    let start = Instant::now();
    let (mut manager, _events, mut accepts) = manager(1, 1);
    manager.start().await.unwrap();

    let mut link = accepts.recv().await.unwrap();
    link.send(&fixtures::hello(QUIET_HEARTBEAT_MS));
    link.expect_op(2).await;
    link.send(&fixtures::ready("sess-1", 1));
    link.send(&fixtures::invalid_session(false));

    let mut link2 = accepts.recv().await.unwrap();
    link2.send(&fixtures::hello(QUIET_HEARTBEAT_MS));

    // Session was invalidated, so a fresh identify goes out, and it has to
    // wait out the identify window consumed by the first one.
    let identify = link2.expect_op(2).await;
    assert_eq!(identify["d"]["token"], TEST_TOKEN);
    assert!(start.elapsed() >= Duration::from_secs(5));

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_resumable_invalid_session_resumes() {
    let (mut manager, _events, mut accepts) = manager(1, 1);
    manager.start().await.unwrap();

    let mut link = accepts.recv().await.unwrap();
    link.send(&fixtures::hello(QUIET_HEARTBEAT_MS));
    link.expect_op(2).await;
    link.send(&fixtures::ready("sess-1", 4));
    link.send(&fixtures::invalid_session(true));

    let mut link2 = accepts.recv().await.unwrap();
    link2.send(&fixtures::hello(QUIET_HEARTBEAT_MS));

    let resume = link2.expect_op(4).await;
    assert_eq!(resume["d"]["seq"], 4);

    manager.shutdown().await;
}

// ============================================================================
// Close code classification
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_disallowed_intents_close_is_fatal() {
    let (mut manager, mut events, mut accepts) = manager(1, 1);
    manager.start().await.unwrap();

    let mut link = accepts.recv().await.unwrap();
    link.send(&fixtures::hello(QUIET_HEARTBEAT_MS));
    link.expect_op(2).await;
    link.close(Some(4014));

    let disconnected = wait_for_event(&mut events, |e| {
        matches!(e.kind, ShardEventKind::Disconnected { .. })
    })
    .await;
    assert!(matches!(
        disconnected.kind,
        ShardEventKind::Disconnected {
            reason: Some(GatewayError::DisallowedIntents)
        }
    ));

    // Fatal closes must not be retried.
    assert!(accepts.try_recv().is_err());
    assert_eq!(manager.shards()[0].state(), ShardState::Disconnected);
    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_unknown_close_code_reidentifies() {
    let (mut manager, _events, mut accepts) = manager(1, 1);
    manager.start().await.unwrap();

    let mut link = accepts.recv().await.unwrap();
    link.send(&fixtures::hello(QUIET_HEARTBEAT_MS));
    link.expect_op(2).await;
    link.send(&fixtures::ready("sess-1", 1));
    link.close(Some(4999));

    let mut link2 = accepts.recv().await.unwrap();
    link2.send(&fixtures::hello(QUIET_HEARTBEAT_MS));

    // Conservative: unknown codes throw the session away.
    let identify = link2.expect_op(2).await;
    assert_eq!(identify["d"]["shard"][0], 0);

    manager.shutdown().await;
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_shutdown_reports_clean_disconnect() {
    let (mut manager, mut events, mut accepts) = manager(1, 1);
    manager.start().await.unwrap();

    let mut link = accepts.recv().await.unwrap();
    link.send(&fixtures::hello(QUIET_HEARTBEAT_MS));
    link.expect_op(2).await;
    link.send(&fixtures::ready("sess-1", 1));

    wait_for_event(&mut events, |e| {
        matches!(e.kind, ShardEventKind::Identified { .. })
    })
    .await;

    manager.shutdown().await;

    let disconnected = wait_for_event(&mut events, |e| {
        matches!(e.kind, ShardEventKind::Disconnected { .. })
    })
    .await;
    assert!(matches!(
        disconnected.kind,
        ShardEventKind::Disconnected { reason: None }
    ));
}

// ============================================================================
// Identify concurrency across shards
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_identify_windows_are_shared_per_concurrency_bucket() {
    let start = Instant::now();
    let (mut manager, _events, mut accepts) = manager(6, 2);
    manager.start().await.unwrap();

    let mut links = Vec::new();
    for _ in 0..6 {
        links.push(accepts.recv().await.unwrap());
    }
    for link in &links {
        link.send(&fixtures::hello(QUIET_HEARTBEAT_MS));
    }

    let mut tasks = Vec::new();
    for mut link in links {
        tasks.push(tokio::spawn(async move {
            let identify = link.expect_op(2).await;
            let shard_id = identify["d"]["shard"][0].as_u64().unwrap();
            // Keep the link alive so the shard does not start reconnecting.
            (shard_id as u16, Instant::now(), link)
        }));
    }

    let mut buckets: [Vec<(u16, Instant)>; 2] = [Vec::new(), Vec::new()];
    let mut kept = Vec::new();
    for task in tasks {
        let (shard_id, at, link) = task.await.unwrap();
        buckets[usize::from(shard_id % 2)].push((shard_id, at));
        kept.push(link);
    }

    for (bucket, expected_ids) in buckets.iter_mut().zip([[0, 2, 4], [1, 3, 5]]) {
        // Shards identify strictly in index order within their bucket,
        // one identify per window.
        bucket.sort_by_key(|(_, at)| *at);
        let ids: Vec<u16> = bucket.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, expected_ids);
        assert!(bucket[1].1 - bucket[0].1 >= Duration::from_secs(5));
        assert!(bucket[2].1 - bucket[1].1 >= Duration::from_secs(5));
    }

    // The two buckets identify in parallel: three waves, not six.
    let elapsed = start.elapsed();
    assert!(
        elapsed >= Duration::from_secs(10) && elapsed < Duration::from_secs(11),
        "elapsed {elapsed:?}"
    );

    manager.shutdown().await;
}
