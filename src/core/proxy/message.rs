// src/core/proxy/message.rs

//! The tunnel protocol's message taxonomy, per §4.3.

use bitflags::bitflags;

bitflags! {
    /// Bitmask carried on a tunneled message, per §4.3.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TunnelFlags: u8 {
        /// Expect an asynchronous response, correlated by `msg_id`.
        const PROXIED = 0b01;
        /// A local-service buffer carrying this flag is relayed to the
        /// remote side as a `response` rather than an `event`.
        const PROXIED_RELAY_RESPONSE = 0b10;
    }
}

/// One tunneled protocol operation, per §4.3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelOp {
    New { channel: String, node: String },
    Request { payload: Vec<u8> },
    Response { payload: Vec<u8> },
    Event { payload: Vec<u8> },
    Destroy,
    ShutdownAck,
    ShutdownNack,
}

/// One message exchanged over a tunnel, per §4.3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelMessage {
    pub session_id: String,
    pub msg_id: Option<u64>,
    pub flags: TunnelFlags,
    pub op: TunnelOp,
}

impl TunnelMessage {
    pub fn new(session_id: impl Into<String>, op: TunnelOp) -> Self {
        Self {
            session_id: session_id.into(),
            msg_id: None,
            flags: TunnelFlags::empty(),
            op,
        }
    }

    pub fn with_msg_id(mut self, msg_id: u64) -> Self {
        self.msg_id = Some(msg_id);
        self
    }

    pub fn with_flags(mut self, flags: TunnelFlags) -> Self {
        self.flags = flags;
        self
    }
}
