// src/server/proxy_mode.rs

//! Wires the IPC proxy multiplexer (Component C) to its collaborators, per
//! SPEC_FULL §2 "AMBIENT: process & crate layout". The real remote-IPC
//! listener that feeds tunnel messages into [`ProxyEngine::handle_remote`]
//! is out of scope (§1); this mode constructs the engine and idles, ready
//! for that transport to be wired in.

use std::time::Duration;

use anyhow::Result;
use tracing::info;

use crate::config::Config;
use crate::core::proxy::{AlwaysAck, ProxyEngine};

use super::collaborators::UnconnectedForwarder;

pub async fn run(config: Config) -> Result<()> {
    info!("starting IPC proxy multiplexer");

    let _engine = ProxyEngine::new(
        "controller",
        Duration::from_millis(config.proxy_request_timeout_ms),
        Box::new(UnconnectedForwarder),
        Box::new(AlwaysAck),
    );

    tokio::signal::ctrl_c().await?;
    info!("IPC proxy multiplexer shutting down");
    Ok(())
}
