// src/server/executor_mode.rs

//! Wires the action executor and alert dispatcher (Component B) to its
//! collaborators and drives it until shutdown, per SPEC_FULL §2 "AMBIENT:
//! process & crate layout".

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::info;

use crate::config::Config;
use crate::core::executor::{Executor, ExecutorTask};

use super::collaborators::UnconnectedServiceBus;

const TASK_CHANNEL_CAPACITY: usize = 256;

pub async fn run(config: Config) -> Result<()> {
    info!("starting action executor and alert dispatcher");

    let alerts = config.alert_entries()?;
    let mut executor = Executor::new(
        config.default_provider.clone(),
        env!("CARGO_PKG_VERSION"),
        alerts,
        Arc::new(UnconnectedServiceBus),
        Arc::new(UnconnectedServiceBus),
    );

    // No local IPC transport is wired up yet (§1 out-of-scope); held open so
    // the engine idles rather than observing a closed channel and exiting.
    let (_tx, rx) = mpsc::channel::<ExecutorTask>(TASK_CHANNEL_CAPACITY);

    let engine_handle = tokio::spawn(async move {
        executor.run(rx).await;
    });

    tokio::signal::ctrl_c().await?;
    info!("action executor shutting down");
    engine_handle.abort();
    Ok(())
}
