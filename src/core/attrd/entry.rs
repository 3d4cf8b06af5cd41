// src/core/attrd/entry.rs

//! The per-attribute entry and its dampening state, per §3/§4.1.

/// Where an attribute entry's commit currently stands relative to the
/// dampening window. See §4.1's dampening state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DampenState {
    /// No commit scheduled; `current_value == committed_value`.
    Idle,
    /// A dampening timer is armed; a commit will fire on expiry.
    Armed,
    /// A commit (broadcast + configuration-store write) is in flight.
    Committing,
}

/// A single named node attribute on the local node. See §3.
#[derive(Debug, Clone)]
pub struct AttributeEntry {
    pub name: String,
    pub set: String,
    pub section: String,
    pub host_key: Option<String>,
    pub current_value: Option<String>,
    pub committed_value: Option<String>,
    pub dampen_ms: u64,
    pub acting_user: Option<String>,
    pub state: DampenState,
    /// Set when a commit completes successfully while another update had
    /// already arrived and needs its own cycle (§4.1: "a commit in flight
    /// when a new update arrives does not cancel; the new value enters
    /// another dampening cycle on completion").
    pub recommit_pending: bool,
}

/// The node-status section name attributes default into when no section is
/// given, per §3.
pub const DEFAULT_SECTION: &str = "status";

impl AttributeEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            set: String::new(),
            section: DEFAULT_SECTION.to_string(),
            host_key: None,
            current_value: None,
            committed_value: None,
            dampen_ms: 0,
            acting_user: None,
            state: DampenState::Idle,
            recommit_pending: false,
        }
    }

    /// True once `current_value == committed_value`, i.e. no outstanding
    /// commit is required (§3 invariant).
    pub fn is_converged(&self) -> bool {
        self.current_value == self.committed_value
    }
}
