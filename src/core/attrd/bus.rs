// src/core/attrd/bus.rs

//! Trait boundaries for the cluster messaging layer named in §1's
//! out-of-scope list: an opaque broadcast bus providing per-peer and
//! all-peer ordered message delivery (§6.2), plus the cluster-membership
//! reap callback invoked by `peer_remove` (§4.1).

use async_trait::async_trait;

use super::messages::BroadcastEnvelope;

/// Consumed as an opaque broadcast bus providing per-peer and all-peer
/// ordered message delivery and membership-change callbacks, per §6.2.
/// Envelope (de)serialization onto the wire is the transport's concern, not
/// this core's (§1 out-of-scope: "the network transport for remote IPC" and
/// "the cluster messaging layer").
#[async_trait]
pub trait ClusterBus: Send + Sync {
    /// Broadcasts `envelope` to every known peer, preserving submission
    /// order per attribute (§5).
    async fn broadcast(&self, envelope: BroadcastEnvelope) -> Result<(), String>;

    /// Relays `envelope` to exactly one named peer (used when a
    /// `clear_failure` request targets a specific peer, §4.1).
    async fn send_to(&self, node: &str, envelope: BroadcastEnvelope) -> Result<(), String>;

    /// True if `node` is currently a known member of the cluster.
    fn is_known_peer(&self, node: &str) -> bool;
}

/// The cluster-membership callback invoked by `peer_remove` (§4.1) to reap
/// a node after its removal has been broadcast. Membership bookkeeping
/// itself belongs to the policy layer this core sits under (§1); the core
/// only guarantees the callback fires once, after the broadcast.
pub trait MembershipReaper: Send + Sync {
    fn reap(&self, node: &str);
}
