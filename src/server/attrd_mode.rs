// src/server/attrd_mode.rs

//! Wires the attribute aggregation engine (Component A) to its collaborators
//! and drives it until shutdown, per SPEC_FULL §2 "AMBIENT: process & crate
//! layout".

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::info;

use crate::config::Config;
use crate::core::attrd::{AttrdEngine, AttrdTask};

use super::collaborators::{NoopMembershipReaper, UnconnectedClusterBus, UnconnectedConfigStore};

/// Channel depth for inbound tasks; bounded so a stalled engine applies
/// backpressure to callers rather than growing memory without limit.
const TASK_CHANNEL_CAPACITY: usize = 256;

pub async fn run(config: Config) -> Result<()> {
    info!(node = %config.node_name, "starting attribute aggregator");

    let mut engine = AttrdEngine::new(
        config.node_name.clone(),
        u64::from(config.default_dampen_ms),
        Arc::new(UnconnectedConfigStore),
        Arc::new(UnconnectedClusterBus),
        Arc::new(NoopMembershipReaper),
    );

    // No local IPC transport is wired up yet (§1 out-of-scope); held open so
    // the engine idles rather than observing a closed channel and exiting.
    let (_tx, rx) = mpsc::channel::<AttrdTask>(TASK_CHANNEL_CAPACITY);

    let engine_handle = tokio::spawn(async move {
        engine.run(rx).await;
    });

    tokio::signal::ctrl_c().await?;
    info!("attribute aggregator shutting down");
    engine_handle.abort();
    Ok(())
}
