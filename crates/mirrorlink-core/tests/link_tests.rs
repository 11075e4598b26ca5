//! End-to-end tests for the mirror link task against a scripted radio


use std::sync::Arc;
use std::time::Duration;

use mirrorlink_core::{
    CipherContext, Command, ConnectionState, IdentitySource, LinkHandle, MirrorConfig,
    MirrorError, MirrorLink, TelemetryBatcher, TelemetryScheduler, MIRROR_DEVICE_NAME,
};
use test_utils::{
    discover_mirror, ready_link, wait_for, wait_for_state, MockRadio, RadioCall, MIRROR,
};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_test::assert_ok;

fn start() -> (MockRadio, LinkHandle) {
    let (radio, events) = MockRadio::new();
    let (link, _task) = MirrorLink::spawn(
        radio.clone(),
        events,
        &MirrorConfig::default(),
        CipherContext::default(),
    );
    (radio, link)
}

// ----------------------------------------------------------------------------
// Discovery
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_target_found_only_after_matching_sighting() {
    let (radio, link) = start();
    radio.power_on();
    wait_for_state(&link, ConnectionState::Scanning).await;

    radio.sight(1, "Other");
    let status = wait_for(&link, |s| s.most_recent_advertiser.as_deref() == Some("Other")).await;
    assert!(!status.target_found);
    assert_eq!(status.state, ConnectionState::Scanning);

    radio.sight(MIRROR, MIRROR_DEVICE_NAME);
    let status = wait_for(&link, |s| s.target_found).await;
    assert_eq!(status.state, ConnectionState::Discovered);
    assert_eq!(link.most_recent_advertiser().as_deref(), Some(MIRROR_DEVICE_NAME));
    assert_eq!(radio.calls(), vec![RadioCall::Scan(None), RadioCall::StopScan]);
}

// ----------------------------------------------------------------------------
// Connect
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_connect_without_target_fails_immediately() {
    let (radio, link) = start();
    radio.power_on();
    wait_for_state(&link, ConnectionState::Scanning).await;

    let started = Instant::now();
    assert_eq!(link.connect().await, Err(MirrorError::TargetNotFound));
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(radio.count(|c| matches!(c, RadioCall::Connect(_))), 0);
}

#[tokio::test(start_paused = true)]
async fn test_connect_and_send_identity() {
    let (radio, link) = start();
    ready_link(&radio, &link).await;
    assert!(link.is_connected());

    assert_ok!(link.send_command("Name", "Alice").await);
    assert_eq!(radio.written_plaintexts(), vec!["Name: Alice+"]);
    assert!(radio
        .calls()
        .iter()
        .any(|c| matches!(c, RadioCall::Write { ack: true, .. })));
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout_then_late_success() {
    let (radio, link) = start();
    radio.auto_connect(Some(Duration::from_secs(3)));
    radio.auto_discover();
    discover_mirror(&radio, &link).await;

    let (tx, mut results) = mpsc::unbounded_channel();
    let started = Instant::now();
    link.connect_with(move |ok| {
        let _ = tx.send(ok);
    });

    assert_eq!(results.recv().await, Some(false));
    assert!(started.elapsed() >= Duration::from_millis(1500));
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(link.status().state, ConnectionState::Failed);

    // The link still comes up and is fully usable
    wait_for_state(&link, ConnectionState::Ready).await;
    assert!(link.is_connected());
    assert_ok!(link.send_command("Steps", "1200").await);

    // The callback ran once and was dropped
    assert_eq!(results.recv().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_connect_refused() {
    let (radio, link) = start();
    radio.auto_connect(Some(Duration::from_millis(500)));
    discover_mirror(&radio, &link).await;

    let first = tokio::spawn({
        let link = link.clone();
        async move { link.connect().await }
    });
    wait_for_state(&link, ConnectionState::Connecting).await;
    assert_eq!(link.connect().await, Err(MirrorError::ConnectionInProgress));
    assert_eq!(first.await.unwrap(), Ok(()));
    assert_eq!(radio.count(|c| matches!(c, RadioCall::Connect(_))), 1);
}

// ----------------------------------------------------------------------------
// Disconnect and Send Gating
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_disconnect_twice_cancels_once() {
    let (radio, link) = start();
    ready_link(&radio, &link).await;

    link.disconnect().await.unwrap();
    link.disconnect().await.unwrap();

    let status = link.status();
    assert_eq!(status.state, ConnectionState::Disconnected);
    assert!(!status.connected);
    assert!(status.target_found);
    assert_eq!(radio.count(|c| matches!(c, RadioCall::Cancel(_))), 1);

    assert_eq!(
        link.send_command("Name", "Alice").await,
        Err(MirrorError::NotConnected)
    );
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_while_scanning_still_finds_mirror() {
    let (radio, link) = start();
    radio.auto_connect(None);
    radio.power_on();
    wait_for_state(&link, ConnectionState::Scanning).await;

    link.disconnect().await.unwrap();
    assert_eq!(link.status().state, ConnectionState::Scanning);

    radio.sight(MIRROR, MIRROR_DEVICE_NAME);
    wait_for(&link, |s| s.target_found).await;
    assert_ok!(link.connect().await);

    let calls = radio.calls();
    assert_eq!(
        &calls[..3],
        &[RadioCall::Scan(None), RadioCall::StopScan, RadioCall::Connect(MIRROR)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_slow_radio_teardown_does_not_stall_link() {
    let (radio, link) = start();
    ready_link(&radio, &link).await;
    radio.slow_cancel(Duration::from_secs(5));

    let started = Instant::now();
    link.disconnect().await.unwrap();
    assert_eq!(
        link.send_command("Name", "Alice").await,
        Err(MirrorError::NotConnected)
    );
    assert_eq!(started.elapsed(), Duration::ZERO);

    // The late teardown report leaves the link disconnected with its target
    tokio::time::sleep(Duration::from_secs(6)).await;
    let status = link.status();
    assert_eq!(status.state, ConnectionState::Disconnected);
    assert!(status.target_found);
    assert_eq!(radio.count(|c| matches!(c, RadioCall::Cancel(_))), 1);
}

#[tokio::test(start_paused = true)]
async fn test_send_refused_before_ready() {
    let (radio, link) = start();
    assert_eq!(
        link.send_command("Name", "Alice").await,
        Err(MirrorError::NotConnected)
    );

    radio.auto_connect(None);
    discover_mirror(&radio, &link).await;
    link.connect().await.unwrap();
    wait_for_state(&link, ConnectionState::DiscoveringServices).await;

    assert_eq!(
        link.send_command("Name", "Alice").await,
        Err(MirrorError::BindingIncomplete)
    );
    assert_eq!(radio.count(|c| matches!(c, RadioCall::Write { .. })), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_after_radio_disconnect() {
    let (radio, link) = start();
    ready_link(&radio, &link).await;

    radio.emit(mirrorlink_core::RadioEvent::Disconnected {
        peripheral: MIRROR,
        reason: Some("supervision timeout".into()),
    });
    wait_for_state(&link, ConnectionState::Disconnected).await;

    link.connect().await.unwrap();
    wait_for_state(&link, ConnectionState::Ready).await;
    assert_eq!(radio.count(|c| matches!(c, RadioCall::Scan(_))), 1);
}

// ----------------------------------------------------------------------------
// Telemetry
// ----------------------------------------------------------------------------

fn identity() -> Arc<dyn IdentitySource> {
    Arc::new(|| "Alice".to_string())
}

#[tokio::test(start_paused = true)]
async fn test_telemetry_flush_over_link() {
    let (radio, link) = start();
    ready_link(&radio, &link).await;

    let config = MirrorConfig::default();
    let (sender, batcher) = TelemetryBatcher::new(link.clone(), identity(), &config);
    let mut scheduler = TelemetryScheduler::new(batcher, &config);
    scheduler.set_enabled(true).await;

    sender.push("Steps", "1200");
    sender.push("Heart", "64");
    sender.push("Calories", "310");

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(
        radio.written_plaintexts(),
        vec!["Name: Alice+", "Steps: 1200+", "Heart: 64+", "Calories: 310+"]
    );

    scheduler.set_enabled(false).await;
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(radio.written_plaintexts().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_telemetry_write_failure_does_not_stop_batch() {
    let (radio, link) = start();
    ready_link(&radio, &link).await;
    radio.fail_write(2);

    let config = MirrorConfig::default();
    let (sender, mut batcher) = TelemetryBatcher::new(link.clone(), identity(), &config);
    sender.push("A", "1");
    sender.push("B", "2");
    sender.push("C", "3");

    let report = batcher.flush().await;
    assert_eq!(report.sent, 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, Command::new("B", "2"));
    assert!(matches!(
        report.failed[0].1,
        MirrorError::TransportWriteFailed(_)
    ));
    assert_eq!(radio.count(|c| matches!(c, RadioCall::Write { .. })), 3);
}

#[tokio::test(start_paused = true)]
async fn test_telemetry_while_disconnected_reports_every_entry() {
    let (_radio, link) = start();

    let config = MirrorConfig::default();
    let (sender, mut batcher) = TelemetryBatcher::new(link.clone(), identity(), &config);
    sender.push("TempF", "71");
    sender.push("Humid", "40");

    let report = batcher.flush().await;
    assert_eq!(report.sent, 0);
    assert!(report
        .failed
        .iter()
        .all(|(_, e)| *e == MirrorError::NotConnected));
    assert_eq!(report.failed.len(), 2);
}
