// tests/s1_dampened_update.rs

//! S1: a dampened update neither broadcasts nor commits until the
//! dampening window elapses, then does exactly one of each. Uses
//! virtual time (`tokio::time::{pause, advance}`) rather than real sleeps,
//! per SPEC_FULL §5 AMBIENT test-tooling conventions.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeClusterBus, FakeConfigStore, FakeReaper};
use ha_substrate::core::attrd::{AttrdEngine, AttrdTask, UpdateRequest};
use tokio::sync::mpsc;

#[tokio::test(start_paused = true)]
async fn dampened_update_commits_once_after_window_elapses() {
    let store = Arc::new(FakeConfigStore::new());
    let bus = Arc::new(FakeClusterBus::new());
    let reaper = Arc::new(FakeReaper::default());

    let mut engine = AttrdEngine::new("node1", 0, store.clone(), bus.clone(), reaper.clone());

    engine
        .update(UpdateRequest {
            attribute: "load".to_string(),
            value: Some("3".to_string()),
            dampen: Some("500ms".to_string()),
            // §8 S1's literal scenario updates the node-status section and
            // still expects a broadcast: §4.1 `broadcast` applies to every
            // committed attribute regardless of section.
            section: Some("status".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    // Armed, not yet committed: current_value is set locally but nothing
    // has reached the configuration store or the peer bus.
    assert_eq!(engine.entry("load").unwrap().current_value.as_deref(), Some("3"));
    assert_eq!(store.value_of("load"), None);
    assert_eq!(bus.broadcast_count(), 0);

    let (tx, rx) = mpsc::channel::<AttrdTask>(1);
    tokio::spawn(async move {
        engine.run(rx).await;
    });

    // Well inside the 500ms window: still no commit (value-preserving,
    // no timer churn).
    tokio::time::advance(Duration::from_millis(200)).await;
    tokio::task::yield_now().await;
    assert_eq!(store.value_of("load"), None);

    // Past the window: exactly one commit and one broadcast.
    tokio::time::advance(Duration::from_millis(400)).await;
    tokio::task::yield_now().await;
    assert_eq!(store.value_of("load"), Some("3".to_string()));
    assert_eq!(bus.broadcast_count(), 1);
    assert_eq!(store.update_count(), 1);

    drop(tx);
}
