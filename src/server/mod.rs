// src/server/mod.rs

//! Orchestrates the three daemon modes over one shared library, per
//! SPEC_FULL §2 "AMBIENT: process & crate layout".

use anyhow::Result;

use crate::config::Config;

mod attrd_mode;
mod collaborators;
mod executor_mode;
mod proxy_mode;

/// Which engine this process instance runs. All three share one
/// `tokio::runtime`; there is no thread pool and no cross-thread shared
/// mutable state, per §5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Runs the attribute aggregation engine (Component A).
    Attrd,
    /// Runs the action executor and alert dispatcher (Component B).
    Executor,
    /// Runs the IPC proxy multiplexer (Component C).
    Proxy,
}

impl Mode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "attrd" => Some(Mode::Attrd),
            "executor" | "lrmd" => Some(Mode::Executor),
            "proxy" | "remoted" => Some(Mode::Proxy),
            _ => None,
        }
    }
}

/// The main server startup function, dispatching to the selected mode.
pub async fn run(mode: Mode, config: Config) -> Result<()> {
    match mode {
        Mode::Attrd => attrd_mode::run(config).await,
        Mode::Executor => executor_mode::run(config).await,
        Mode::Proxy => proxy_mode::run(config).await,
    }
}
