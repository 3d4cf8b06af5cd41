// src/core/attrd/messages.rs

//! Request/message shapes for the attribute aggregator's local-IPC (§6.1)
//! and cluster-message (§6.2) surfaces.

use serde::{Deserialize, Serialize};

/// One local-IPC or cluster-message request, tagged by `task`.
#[derive(Debug, Clone)]
pub enum AttrdTask {
    Update(UpdateRequest),
    Refresh,
    PeerRemove { node: String },
    ClearFailure(ClearFailureRequest),
}

/// Fields for an `update` task, per §6.1.
#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    pub attribute: String,
    /// Absent means "delete".
    pub value: Option<String>,
    pub set: Option<String>,
    pub section: Option<String>,
    /// Human-readable duration (§6.4); `None` uses the server default.
    pub dampen: Option<String>,
    pub host: Option<String>,
    pub is_remote: bool,
    pub user: Option<String>,
    /// Echo-suppression sentinel carried on self-originated broadcasts so
    /// the origin does not double-apply its own update (§4.1 `broadcast`).
    pub ignore_locally: bool,
}

/// Fields for a `clear-failure` task, per §4.1/§6.1.
#[derive(Debug, Clone, Default)]
pub struct ClearFailureRequest {
    pub resource: Option<String>,
    pub operation: Option<String>,
    pub interval_ms: Option<u64>,
    pub host: Option<String>,
}

/// The wire envelope broadcast to peers on commit/flush (§4.1 `broadcast`,
/// §6.2). Carries `origin` so peers can tell self-originated messages apart
/// and `ignore_locally` so the origin can skip reapplying its own echo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastEnvelope {
    pub name: String,
    pub value: Option<String>,
    pub set: String,
    pub section: String,
    pub dampen_ms: u64,
    pub user: Option<String>,
    pub origin: String,
    pub ignore_locally: bool,
}
