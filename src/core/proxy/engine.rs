// src/core/proxy/engine.rs

//! The IPC proxy multiplexer's session table and tunnel-message handling,
//! per §4.3. Designed to be owned exclusively by a single cooperative-loop
//! task, per §5 — no locking, no shared mutable state across threads.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::core::errors::ProxyError;

use super::message::{TunnelFlags, TunnelMessage, TunnelOp};
use super::session::ProxySession;

/// Forwards tunneled payloads to the real local IPC service a session
/// targets. Kept as a trait per §1's out-of-scope list ("auth/ACL/network
/// transport for remote IPC" is external): production wires this to the
/// real local socket client, tests wire it to an in-memory fake, the same
/// seam used for `ConfigStore`/`ClusterBus` in the other two components.
#[async_trait]
pub trait LocalForwarder: Send + Sync {
    /// Fire-and-forget submission used for `proxied` requests: the eventual
    /// answer arrives later through [`ProxyEngine::relay_local_message`].
    async fn submit(&self, channel: &str, payload: &[u8]) -> Result<(), ProxyError>;

    /// Synchronous forward-and-wait used for non-`proxied` requests, with a
    /// fixed timeout (§4.3: "perform a synchronous forward with a fixed
    /// timeout, relay the reply inline").
    async fn forward_sync(
        &self,
        channel: &str,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, ProxyError>;
}

/// Decides whether a remote graceful-shutdown request is accepted, per
/// §4.3 ("ack or nack depending on local policy, not part of this core")
/// and the recorded open-question resolution in DESIGN.md.
#[async_trait]
pub trait ShutdownPolicy: Send + Sync {
    async fn should_accept(&self) -> bool;
}

/// Default policy: always accept. A real daemon may substitute a policy
/// that checks in-flight work before acking.
pub struct AlwaysAck;

#[async_trait]
impl ShutdownPolicy for AlwaysAck {
    async fn should_accept(&self) -> bool {
        true
    }
}

pub struct ProxyEngine {
    controller_channel: String,
    request_timeout: Duration,
    sessions: HashMap<String, ProxySession>,
    forwarder: Box<dyn LocalForwarder>,
    shutdown_policy: Box<dyn ShutdownPolicy>,
}

impl ProxyEngine {
    pub fn new(
        controller_channel: impl Into<String>,
        request_timeout: Duration,
        forwarder: Box<dyn LocalForwarder>,
        shutdown_policy: Box<dyn ShutdownPolicy>,
    ) -> Self {
        Self {
            controller_channel: controller_channel.into(),
            request_timeout,
            sessions: HashMap::new(),
            forwarder,
            shutdown_policy,
        }
    }

    pub fn session(&self, session_id: &str) -> Option<&ProxySession> {
        self.sessions.get(session_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Handles one inbound tunnel message from the remote side and returns
    /// the reply (if any) to relay back immediately. Asynchronous replies
    /// for `proxied` requests arrive later via
    /// [`ProxyEngine::relay_local_message`], not through this return value.
    pub async fn handle_remote(&mut self, msg: TunnelMessage) -> Option<TunnelMessage> {
        match msg.op {
            TunnelOp::New { channel, node } => {
                self.new_session(msg.session_id, channel, node);
                None
            }
            TunnelOp::Request { payload } => self.request(msg.session_id, msg.msg_id, msg.flags, payload).await,
            TunnelOp::Destroy => {
                self.sessions.remove(&msg.session_id);
                debug!(session = %msg.session_id, "session destroyed by remote");
                None
            }
            TunnelOp::ShutdownAck | TunnelOp::ShutdownNack => None,
            TunnelOp::Response { .. } | TunnelOp::Event { .. } => {
                warn!(session = %msg.session_id, "unexpected op from remote side");
                None
            }
        }
    }

    /// §4.3 `new(channel, node, session_id)`.
    pub fn new_session(&mut self, session_id: String, channel: String, node: String) {
        let session = ProxySession::new(session_id.clone(), channel, node, &self.controller_channel);
        self.sessions.insert(session_id, session);
    }

    /// §4.3 incoming `request`.
    pub async fn request(
        &mut self,
        session_id: String,
        msg_id: Option<u64>,
        flags: TunnelFlags,
        payload: Vec<u8>,
    ) -> Option<TunnelMessage> {
        let Some(session) = self.sessions.get_mut(&session_id) else {
            warn!(session = %session_id, "request for unknown session");
            return Some(TunnelMessage::new(session_id, TunnelOp::Destroy));
        };

        if session.is_local_shortcut {
            warn!(session = %session_id, "request targets controller itself, rejecting and ending session");
            self.sessions.remove(&session_id);
            return Some(TunnelMessage::new(session_id, TunnelOp::Destroy));
        }

        if session.is_connection_dead() {
            warn!(session = %session_id, "local connection dead, ending session");
            self.sessions.remove(&session_id);
            return Some(TunnelMessage::new(session_id, TunnelOp::Destroy));
        }

        if flags.contains(TunnelFlags::PROXIED) {
            session.last_request_id = msg_id;
            if let Err(e) = self.forwarder.submit(&session.channel, &payload).await {
                warn!(session = %session_id, error = %e, "proxied forward failed, synthesizing negative ack");
                session.last_request_id = None;
                let mut reply = TunnelMessage::new(session_id, TunnelOp::Response { payload: negative_ack(&e) });
                if let Some(id) = msg_id {
                    reply = reply.with_msg_id(id);
                }
                return Some(reply);
            }
            None
        } else {
            match self
                .forwarder
                .forward_sync(&session.channel, &payload, self.request_timeout)
                .await
            {
                Ok(Some(reply_payload)) => {
                    let mut reply = TunnelMessage::new(session_id, TunnelOp::Response { payload: reply_payload });
                    if let Some(id) = msg_id {
                        reply = reply.with_msg_id(id);
                    }
                    Some(reply)
                }
                Ok(None) => None,
                Err(e) => {
                    warn!(session = %session_id, error = %e, "synchronous forward failed");
                    let mut reply = TunnelMessage::new(session_id, TunnelOp::Response { payload: negative_ack(&e) });
                    if let Some(id) = msg_id {
                        reply = reply.with_msg_id(id);
                    }
                    Some(reply)
                }
            }
        }
    }

    /// §4.3 "Local service emits a message toward the remote": inspect
    /// buffer flags and relay as `response` (clearing `last_request_id`) or
    /// `event`.
    pub fn relay_local_message(&mut self, session_id: &str, flags: TunnelFlags, payload: Vec<u8>) -> Option<TunnelMessage> {
        let session = self.sessions.get_mut(session_id)?;
        if flags.contains(TunnelFlags::PROXIED_RELAY_RESPONSE) {
            if let Some(id) = session.last_request_id.take() {
                return Some(TunnelMessage::new(session_id, TunnelOp::Response { payload }).with_msg_id(id));
            }
        }
        Some(TunnelMessage::new(session_id, TunnelOp::Event { payload }))
    }

    /// §3: "destroying a session notifies the remote side with a destroy
    /// event."
    pub fn destroy(&mut self, session_id: &str) -> Option<TunnelMessage> {
        self.sessions.remove(session_id)?;
        Some(TunnelMessage::new(session_id, TunnelOp::Destroy))
    }

    /// §4.3 "Remote requests graceful shutdown".
    pub async fn shutdown_request(&self) -> TunnelMessage {
        if self.shutdown_policy.should_accept().await {
            TunnelMessage::new(String::new(), TunnelOp::ShutdownAck)
        } else {
            TunnelMessage::new(String::new(), TunnelOp::ShutdownNack)
        }
    }
}

fn negative_ack(err: &ProxyError) -> Vec<u8> {
    format!("nack: {err}").into_bytes()
}
