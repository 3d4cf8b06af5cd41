// tests/common/mod.rs

//! Shared fake collaborators for end-to-end scenario tests (§8 S1-S6).
//! Each fake records enough to assert on without pulling in a real
//! transport; they mirror the shapes of `src/server/collaborators.rs` but
//! observe rather than reject.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use ha_substrate::core::attrd::{BroadcastEnvelope, ClusterBus, MembershipReaper};
use ha_substrate::core::collaborators::ConfigStore;
use ha_substrate::core::errors::ConfigStoreError;
use ha_substrate::core::executor::ServiceBusDiscovery;
use ha_substrate::core::proxy::LocalForwarder;
use ha_substrate::core::ProxyError;

/// In-memory configuration store. Keyed by `(section, host, set, name)`;
/// `fail_next` lets a test inject exactly one transient failure.
#[derive(Default)]
pub struct FakeConfigStore {
    pub table: Mutex<HashMap<(String, String, String, String), String>>,
    pub updates: Mutex<Vec<(String, String)>>,
    pub fail_next: Mutex<Option<ConfigStoreError>>,
}

impl FakeConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value_of(&self, name: &str) -> Option<String> {
        self.table
            .lock()
            .unwrap()
            .iter()
            .find(|((_, _, _, n), _)| n == name)
            .map(|(_, v)| v.clone())
    }

    pub fn update_count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }
}

#[async_trait]
impl ConfigStore for FakeConfigStore {
    async fn update(
        &self,
        section: &str,
        host: &str,
        set: &str,
        name: &str,
        value: &str,
        _user: Option<&str>,
    ) -> Result<(), ConfigStoreError> {
        if let Some(err) = self.fail_next.lock().unwrap().take() {
            return Err(err);
        }
        self.updates
            .lock()
            .unwrap()
            .push((name.to_string(), value.to_string()));
        self.table.lock().unwrap().insert(
            (section.to_string(), host.to_string(), set.to_string(), name.to_string()),
            value.to_string(),
        );
        Ok(())
    }

    async fn delete(
        &self,
        section: &str,
        host: &str,
        set: &str,
        name: &str,
        _user: Option<&str>,
    ) -> Result<(), ConfigStoreError> {
        if let Some(err) = self.fail_next.lock().unwrap().take() {
            return Err(err);
        }
        self.table
            .lock()
            .unwrap()
            .remove(&(section.to_string(), host.to_string(), set.to_string(), name.to_string()));
        Ok(())
    }

    async fn delete_matching(
        &self,
        _section: &str,
        _host: &str,
        regex: &str,
        _user: Option<&str>,
    ) -> Result<(), ConfigStoreError> {
        let re = regex::Regex::new(regex).map_err(|e| ConfigStoreError::GenericFailure(e.to_string()))?;
        self.table.lock().unwrap().retain(|(_, _, _, n), _| !re.is_match(n));
        Ok(())
    }

    async fn delete_xpath(&self, _xpath: &str) -> Result<(), ConfigStoreError> {
        Ok(())
    }
}

/// Cluster bus that just records what was sent; nothing is actually
/// delivered anywhere (§1 out-of-scope).
#[derive(Default)]
pub struct FakeClusterBus {
    pub broadcasts: Mutex<Vec<BroadcastEnvelope>>,
    pub known_peers: Mutex<Vec<String>>,
}

impl FakeClusterBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn broadcast_count(&self) -> usize {
        self.broadcasts.lock().unwrap().len()
    }
}

#[async_trait]
impl ClusterBus for FakeClusterBus {
    async fn broadcast(&self, envelope: BroadcastEnvelope) -> Result<(), String> {
        self.broadcasts.lock().unwrap().push(envelope);
        Ok(())
    }

    async fn send_to(&self, _node: &str, envelope: BroadcastEnvelope) -> Result<(), String> {
        self.broadcasts.lock().unwrap().push(envelope);
        Ok(())
    }

    fn is_known_peer(&self, node: &str) -> bool {
        self.known_peers.lock().unwrap().iter().any(|n| n == node)
    }
}

#[derive(Default)]
pub struct FakeReaper {
    pub reaped: Mutex<Vec<String>>,
}

impl MembershipReaper for FakeReaper {
    fn reap(&self, node: &str) {
        self.reaped.lock().unwrap().push(node.to_string());
    }
}

pub struct NeverKnows;

#[async_trait]
impl ServiceBusDiscovery for NeverKnows {
    async fn knows(&self, _agent: &str) -> bool {
        false
    }
}

/// Local forwarder that records every submission and always replies
/// `reply` to synchronous requests.
pub struct RecordingForwarder {
    pub submitted: Mutex<Vec<(String, Vec<u8>)>>,
    pub reply: Option<Vec<u8>>,
}

impl RecordingForwarder {
    pub fn new(reply: Option<Vec<u8>>) -> Self {
        Self {
            submitted: Mutex::new(Vec::new()),
            reply,
        }
    }
}

#[async_trait]
impl LocalForwarder for RecordingForwarder {
    async fn submit(&self, channel: &str, payload: &[u8]) -> Result<(), ProxyError> {
        self.submitted
            .lock()
            .unwrap()
            .push((channel.to_string(), payload.to_vec()));
        Ok(())
    }

    async fn forward_sync(
        &self,
        channel: &str,
        payload: &[u8],
        _timeout: std::time::Duration,
    ) -> Result<Option<Vec<u8>>, ProxyError> {
        self.submitted
            .lock()
            .unwrap()
            .push((channel.to_string(), payload.to_vec()));
        Ok(self.reply.clone())
    }
}
