// src/server/collaborators.rs

//! Placeholder implementations of the external collaborators named in §1's
//! out-of-scope list (the real CIB, cluster bus, membership reaper, service
//! bus discovery, and local IPC transport). A production deployment wires
//! each daemon mode to the real network-backed client; these stand in so the
//! binary links and the engines can be driven end-to-end in the absence of
//! that transport layer, the same role the teacher's fakes play in tests.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::core::attrd::{BroadcastEnvelope, ClusterBus, MembershipReaper};
use crate::core::collaborators::ConfigStore;
use crate::core::errors::{ConfigStoreError, ProxyError};
use crate::core::executor::ServiceBusDiscovery;
use crate::core::proxy::LocalForwarder;

/// Reports every call as not-yet-connected. Swap for a real client wired to
/// the cluster's configuration store.
pub struct UnconnectedConfigStore;

#[async_trait]
impl ConfigStore for UnconnectedConfigStore {
    async fn update(
        &self,
        _section: &str,
        _host: &str,
        _set: &str,
        name: &str,
        _value: &str,
        _user: Option<&str>,
    ) -> Result<(), ConfigStoreError> {
        warn!(attr = %name, "configuration store is not connected");
        Err(ConfigStoreError::NotConnected)
    }

    async fn delete(
        &self,
        _section: &str,
        _host: &str,
        _set: &str,
        name: &str,
        _user: Option<&str>,
    ) -> Result<(), ConfigStoreError> {
        warn!(attr = %name, "configuration store is not connected");
        Err(ConfigStoreError::NotConnected)
    }

    async fn delete_matching(
        &self,
        _section: &str,
        _host: &str,
        _regex: &str,
        _user: Option<&str>,
    ) -> Result<(), ConfigStoreError> {
        Err(ConfigStoreError::NotConnected)
    }

    async fn delete_xpath(&self, _xpath: &str) -> Result<(), ConfigStoreError> {
        Err(ConfigStoreError::NotConnected)
    }
}

/// Reports every peer as unknown and every send as failed. Swap for a real
/// cluster messaging transport.
pub struct UnconnectedClusterBus;

#[async_trait]
impl ClusterBus for UnconnectedClusterBus {
    async fn broadcast(&self, _envelope: BroadcastEnvelope) -> Result<(), String> {
        Err("cluster bus is not connected".to_string())
    }

    async fn send_to(&self, _node: &str, _envelope: BroadcastEnvelope) -> Result<(), String> {
        Err("cluster bus is not connected".to_string())
    }

    fn is_known_peer(&self, _node: &str) -> bool {
        false
    }
}

pub struct NoopMembershipReaper;

impl MembershipReaper for NoopMembershipReaper {
    fn reap(&self, node: &str) {
        warn!(node, "membership reaper is not connected, ignoring");
    }
}

/// Always reports "not known", forcing `resolve_service_alias` to its
/// script-init fallback (§4.2 step 2, the recorded open-question decision).
pub struct UnconnectedServiceBus;

#[async_trait]
impl ServiceBusDiscovery for UnconnectedServiceBus {
    async fn knows(&self, _agent: &str) -> bool {
        false
    }
}

/// Reports the local connection as dead for every channel. Swap for a real
/// local IPC client.
pub struct UnconnectedForwarder;

#[async_trait]
impl LocalForwarder for UnconnectedForwarder {
    async fn submit(&self, channel: &str, _payload: &[u8]) -> Result<(), ProxyError> {
        Err(ProxyError::ConnectionDead(channel.to_string()))
    }

    async fn forward_sync(
        &self,
        channel: &str,
        _payload: &[u8],
        _timeout: Duration,
    ) -> Result<Option<Vec<u8>>, ProxyError> {
        Err(ProxyError::ConnectionDead(channel.to_string()))
    }
}
