// src/core/attrd/mod.rs

//! Component A: the attribute-aggregation engine. See §4.1.

pub mod bus;
pub mod engine;
pub mod entry;
pub mod messages;

pub use bus::{ClusterBus, MembershipReaper};
pub use engine::AttrdEngine;
pub use entry::{AttributeEntry, DampenState};
pub use messages::{AttrdTask, BroadcastEnvelope, ClearFailureRequest, UpdateRequest};
