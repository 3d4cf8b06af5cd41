// src/core/proxy/session.rs

//! The proxy session record, per §3 "Proxy session".

use std::time::Instant;

/// One tunneled IPC conversation between a remote node and a local service.
///
/// Invariant: `session_id` is unique in the owning engine's session table
/// (§3). Destruction always notifies the remote side with a `destroy`
/// event — enforced by [`super::engine::ProxyEngine::destroy`], never by
/// direct removal from the table.
#[derive(Debug, Clone)]
pub struct ProxySession {
    pub session_id: String,
    pub channel: String,
    pub node: String,
    /// `None` when the session targets the controller itself (§3
    /// `is_local_shortcut`): there is no local connection to hold.
    pub local_connection: Option<LocalConnectionHandle>,
    pub is_local_shortcut: bool,
    /// The `msg_id` of the most recent `proxied` request awaiting a
    /// response relay, cleared once that response is relayed (§4.3).
    pub last_request_id: Option<u64>,
    pub created_at: Instant,
}

/// Opaque handle to the local IPC client for a session's target service.
/// The real connection object is owned by the (out-of-scope) IPC transport;
/// the core only needs to know whether it is still alive.
#[derive(Debug, Clone)]
pub struct LocalConnectionHandle {
    pub alive: bool,
}

impl ProxySession {
    pub fn new(session_id: impl Into<String>, channel: impl Into<String>, node: impl Into<String>, controller_channel: &str) -> Self {
        let channel = channel.into();
        let is_local_shortcut = channel == controller_channel;
        Self {
            session_id: session_id.into(),
            channel,
            node: node.into(),
            local_connection: if is_local_shortcut {
                None
            } else {
                Some(LocalConnectionHandle { alive: true })
            },
            is_local_shortcut,
            last_request_id: None,
            created_at: Instant::now(),
        }
    }

    pub fn is_connection_dead(&self) -> bool {
        match &self.local_connection {
            Some(handle) => !handle.alive,
            None => self.is_local_shortcut,
        }
    }
}
