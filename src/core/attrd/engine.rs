// src/core/attrd/engine.rs

//! The attribute aggregator's coordination engine: the per-attribute table,
//! dampening timers, broadcast, and configuration-store commit, per §4.1.
//! Designed to be owned exclusively by a single cooperative-loop task, per
//! §5 — no locking, no shared mutable state across threads.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tokio::sync::mpsc;
use tokio_util::time::{DelayQueue, delay_queue::Key as DelayKey};
use tracing::{debug, info, warn};

use crate::core::collaborators::ConfigStore;
use crate::core::errors::{AttrdError, ConfigStoreError};
use crate::core::value::expand_value;

use super::bus::{ClusterBus, MembershipReaper};
use super::entry::{AttributeEntry, DampenState};
use super::messages::{AttrdTask, BroadcastEnvelope, ClearFailureRequest, UpdateRequest};

/// Backoff applied before retrying a commit after a transient
/// configuration-store error (§4.1: "re-arm with a short backoff").
const TRANSIENT_RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// The outcome of one asynchronous commit attempt, fed back into the engine
/// loop so that commit completion is handled the same way any other
/// suspension point is (§5): as an event the single-threaded loop reacts to,
/// never as a blocking await inside the mutation path.
struct CommitOutcome {
    attr: String,
    /// The value that was actually submitted for this attempt.
    attempted_value: Option<String>,
    result: Result<(), ConfigStoreError>,
}

pub struct AttrdEngine {
    node_name: String,
    default_dampen_ms: u64,
    entries: HashMap<String, AttributeEntry>,
    dampen_queue: DelayQueue<String>,
    dampen_keys: HashMap<String, DelayKey>,
    store: Arc<dyn ConfigStore>,
    bus: Arc<dyn ClusterBus>,
    reaper: Arc<dyn MembershipReaper>,
    commit_tx: mpsc::UnboundedSender<CommitOutcome>,
    commit_rx: mpsc::UnboundedReceiver<CommitOutcome>,
}

impl AttrdEngine {
    pub fn new(
        node_name: impl Into<String>,
        default_dampen_ms: u64,
        store: Arc<dyn ConfigStore>,
        bus: Arc<dyn ClusterBus>,
        reaper: Arc<dyn MembershipReaper>,
    ) -> Self {
        let (commit_tx, commit_rx) = mpsc::unbounded_channel();
        Self {
            node_name: node_name.into(),
            default_dampen_ms,
            entries: HashMap::new(),
            dampen_queue: DelayQueue::new(),
            dampen_keys: HashMap::new(),
            store,
            bus,
            reaper,
            commit_tx,
            commit_rx,
        }
    }

    /// Test/introspection accessor; not used by the dispatch path.
    pub fn entry(&self, name: &str) -> Option<&AttributeEntry> {
        self.entries.get(name)
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|s| s.as_str())
    }

    /// Drives the engine until `tasks` is closed. Suspension points mirror
    /// §5: dampening timer expiry, commit completion, and task arrival.
    pub async fn run(&mut self, mut tasks: mpsc::Receiver<AttrdTask>) {
        loop {
            tokio::select! {
                maybe_task = tasks.recv() => {
                    match maybe_task {
                        Some(task) => self.handle_task(task).await,
                        None => break,
                    }
                }
                expired = next_expired(&mut self.dampen_queue) => {
                    let attr = expired.into_inner();
                    self.dampen_keys.remove(&attr);
                    self.begin_commit_cycle(&attr).await;
                }
                Some(outcome) = self.commit_rx.recv() => {
                    self.on_commit_outcome(outcome).await;
                }
            }
        }
    }

    pub async fn handle_task(&mut self, task: AttrdTask) {
        match task {
            AttrdTask::Update(req) => {
                if let Err(e) = self.update(req).await {
                    warn!(error = %e, "attribute update rejected");
                }
            }
            AttrdTask::Refresh => self.refresh().await,
            AttrdTask::PeerRemove { node } => self.peer_remove(&node).await,
            AttrdTask::ClearFailure(req) => self.clear_failure(req).await,
        }
    }

    /// §4.1 `update`.
    pub async fn update(&mut self, req: UpdateRequest) -> Result<(), AttrdError> {
        if req.ignore_locally {
            debug!(attr = %req.attribute, "ignoring self-originated echo");
            return Ok(());
        }

        let dampen_ms = match &req.dampen {
            Some(raw) => crate::core::value::parse_duration_ms(raw)
                .map_err(|_| AttrdError::InvalidDuration(raw.clone()))?,
            None => self.default_dampen_ms,
        };

        let entry = self
            .entries
            .entry(req.attribute.clone())
            .or_insert_with(|| AttributeEntry::new(&req.attribute));

        if let Some(set) = req.set {
            entry.set = set;
        }
        if let Some(section) = req.section {
            entry.section = section;
        }
        entry.host_key = req
            .host
            .or_else(|| entry.host_key.clone())
            .or_else(|| Some(self.node_name.clone()));
        if req.user.is_some() {
            entry.acting_user = req.user;
        }

        let resolved_value = match &req.value {
            None => None,
            Some(v) => Some(expand_value(Some(v), entry.current_value.as_deref())),
        };

        // Idempotent in value (§4.1): identical to both current and
        // committed is a full no-op. Identical to only current (still
        // pending the same value) is also a no-op — "prevents timer churn".
        if resolved_value == entry.current_value {
            debug!(attr = %req.attribute, "value-preserving update, no-op");
            return Ok(());
        }

        entry.current_value = resolved_value;
        entry.dampen_ms = dampen_ms;

        if dampen_ms == 0 {
            self.begin_commit_cycle(&req.attribute).await;
        } else {
            self.arm_timer(&req.attribute, dampen_ms);
        }
        Ok(())
    }

    fn arm_timer(&mut self, attr: &str, dampen_ms: u64) {
        let deadline = Duration::from_millis(dampen_ms);
        if let Some(key) = self.dampen_keys.get(attr) {
            self.dampen_queue.reset(key, deadline);
        } else {
            let key = self.dampen_queue.insert(attr.to_string(), deadline);
            self.dampen_keys.insert(attr.to_string(), key);
        }
        if let Some(entry) = self.entries.get_mut(attr) {
            if entry.state != DampenState::Committing {
                entry.state = DampenState::Armed;
            }
        }
        debug!(attr, dampen_ms, "dampen timer armed");
    }

    /// §4.1 `broadcast` + `commit`, fired either on dampen-timer expiry or
    /// immediately when `dampen_ms == 0`.
    async fn begin_commit_cycle(&mut self, attr: &str) {
        let Some(entry) = self.entries.get_mut(attr) else {
            return;
        };

        if entry.state == DampenState::Committing {
            entry.recommit_pending = true;
            return;
        }

        // A fresh cycle supersedes any still-armed timer for this attr.
        if let Some(key) = self.dampen_keys.remove(attr) {
            self.dampen_queue.remove(&key);
        }

        entry.state = DampenState::Committing;
        entry.recommit_pending = false;
        let value = entry.current_value.clone();
        let set = entry.set.clone();
        let section = entry.section.clone();
        let user = entry.acting_user.clone();
        let dampen_ms = entry.dampen_ms;
        let host = entry.host_key.clone().unwrap_or_else(|| self.node_name.clone());

        // §4.1 `broadcast`: every commit is relayed to peers unconditionally,
        // regardless of section.
        let envelope = BroadcastEnvelope {
            name: attr.to_string(),
            value: value.clone(),
            set: set.clone(),
            section: section.clone(),
            dampen_ms,
            user: user.clone(),
            origin: self.node_name.clone(),
            // §4.1: "If dampen_ms <= 0, also commit locally without
            // awaiting echo (message carries an ignore-locally sentinel so
            // the origin does not double-apply)."
            ignore_locally: dampen_ms == 0,
        };

        if let Err(e) = self.bus.broadcast(envelope).await {
            warn!(attr, error = %e, "peer broadcast failed");
        }

        let store = Arc::clone(&self.store);
        let commit_tx = self.commit_tx.clone();
        let attr_owned = attr.to_string();
        let attempted_value = value.clone();
        tokio::spawn(async move {
            let result = match &value {
                Some(v) => store.update(&section, &host, &set, &attr_owned, v, user.as_deref()).await,
                None => store.delete(&section, &host, &set, &attr_owned, user.as_deref()).await,
            };
            let _ = commit_tx.send(CommitOutcome {
                attr: attr_owned,
                attempted_value,
                result,
            });
        });
    }

    async fn on_commit_outcome(&mut self, outcome: CommitOutcome) {
        let CommitOutcome { attr, attempted_value, result } = outcome;
        let Some(entry) = self.entries.get_mut(&attr) else {
            return;
        };

        match result {
            Ok(()) => {
                entry.committed_value = attempted_value;
                entry.state = DampenState::Idle;
                info!(attr = %attr, "attribute committed");
                if entry.recommit_pending {
                    entry.recommit_pending = false;
                    self.begin_commit_cycle(&attr).await;
                }
            }
            Err(e) if e.is_transient() => {
                warn!(attr = %attr, error = %e, "transient commit failure, retrying");
                entry.state = DampenState::Armed;
                entry.recommit_pending = false;
                self.arm_timer_backoff(&attr);
            }
            Err(e) => {
                warn!(attr = %attr, error = %e, "commit failed permanently");
                entry.state = DampenState::Idle;
                entry.recommit_pending = false;
            }
        }
    }

    fn arm_timer_backoff(&mut self, attr: &str) {
        let key = self.dampen_queue.insert(attr.to_string(), TRANSIENT_RETRY_BACKOFF);
        self.dampen_keys.insert(attr.to_string(), key);
    }

    /// §4.1 `refresh`.
    pub async fn refresh(&mut self) {
        let attrs: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.current_value.is_some() || e.committed_value.is_some())
            .map(|(name, _)| name.clone())
            .collect();
        for attr in attrs {
            self.begin_commit_cycle(&attr).await;
        }
    }

    /// §4.1 `peer_remove`.
    pub async fn peer_remove(&mut self, node: &str) {
        let envelope = BroadcastEnvelope {
            name: String::new(),
            value: None,
            set: String::new(),
            section: String::new(),
            dampen_ms: 0,
            user: None,
            origin: self.node_name.clone(),
            ignore_locally: false,
        };
        if let Err(e) = self.bus.send_to(node, envelope).await {
            warn!(node, error = %e, "failed to broadcast peer removal");
        }
        self.reaper.reap(node);
    }

    /// §4.1 `clear_failure`.
    pub async fn clear_failure(&mut self, req: ClearFailureRequest) {
        let pattern = build_failure_regex(
            req.resource.as_deref(),
            req.operation.as_deref(),
            req.interval_ms,
        );

        let target_is_local = req
            .host
            .as_deref()
            .is_none_or(|h| h == self.node_name);

        if target_is_local {
            let matching: Vec<String> = self
                .entries
                .keys()
                .filter(|name| pattern.is_match(name))
                .cloned()
                .collect();
            if matching.is_empty() {
                return;
            }

            // Bulk-delete at the store in one round trip per distinct
            // section rather than looping `update`/`begin_commit_cycle` per
            // attribute, which is what `ConfigStore::delete_matching` exists
            // for (§6.3).
            let mut sections: Vec<String> = matching
                .iter()
                .filter_map(|name| self.entries.get(name).map(|e| e.section.clone()))
                .collect();
            sections.sort();
            sections.dedup();
            for section in &sections {
                if let Err(e) = self
                    .store
                    .delete_matching(section, &self.node_name, pattern.as_str(), None)
                    .await
                {
                    warn!(section, error = %e, "failed to bulk-clear matching attributes");
                }
            }

            for name in matching {
                let Some(entry) = self.entries.get_mut(&name) else {
                    continue;
                };
                entry.current_value = None;
                entry.committed_value = None;
                entry.state = DampenState::Idle;
                entry.recommit_pending = false;
                let envelope = BroadcastEnvelope {
                    name: name.clone(),
                    value: None,
                    set: entry.set.clone(),
                    section: entry.section.clone(),
                    dampen_ms: 0,
                    user: None,
                    origin: self.node_name.clone(),
                    ignore_locally: true,
                };
                if let Err(e) = self.bus.broadcast(envelope).await {
                    warn!(attr = %name, error = %e, "peer broadcast failed for cleared attribute");
                }
            }
            return;
        }

        let host = req.host.clone().expect("checked above");
        if self.bus.is_known_peer(&host) {
            let envelope = BroadcastEnvelope {
                name: pattern.as_str().to_string(),
                value: None,
                set: String::new(),
                section: String::new(),
                dampen_ms: 0,
                user: None,
                origin: self.node_name.clone(),
                ignore_locally: false,
            };
            if let Err(e) = self.bus.send_to(&host, envelope).await {
                warn!(host, error = %e, "failed to relay clear-failure to peer");
            }
        } else {
            // Remote (non-cluster) node: translate to an xpath delete.
            let xpath = format!(
                "//node_state[@uname='{host}']//*[{}]",
                regex_to_xpath_predicate(pattern.as_str())
            );
            if let Err(e) = self.store.delete_xpath(&xpath).await {
                warn!(host, error = %e, "failed to clear remote node failures");
            }
        }
    }
}

fn build_failure_regex(
    resource: Option<&str>,
    operation: Option<&str>,
    interval_ms: Option<u64>,
) -> Regex {
    let rsc_pat = resource
        .map(regex::escape)
        .unwrap_or_else(|| ".+".to_string());
    let base = format!(r"^(fail-count|last-failure)-{rsc_pat}");
    let pattern = match (operation, interval_ms) {
        (Some(op), Some(interval)) => {
            format!(r"{base}#{}_{interval}$", regex::escape(op))
        }
        _ => format!(r"{base}(#.*)?$"),
    };
    Regex::new(&pattern).expect("constructed pattern is always valid")
}

/// Best-effort, human-readable placeholder xpath predicate; the real xpath
/// grammar is owned by the (out-of-scope) configuration store client.
fn regex_to_xpath_predicate(pattern: &str) -> String {
    format!("matches(@name, '{pattern}')")
}

/// Awaits the next expired dampen timer, without busy-spinning when the
/// queue is momentarily empty (`DelayQueue::poll_expired` resolves
/// `Ready(None)` on an empty queue, so an empty queue must simply never
/// resolve here until something is inserted on the next loop iteration).
async fn next_expired(
    queue: &mut DelayQueue<String>,
) -> tokio_util::time::delay_queue::Expired<String> {
    if queue.is_empty() {
        std::future::pending().await
    }
    std::future::poll_fn(|cx| queue.poll_expired(cx))
        .await
        .expect("queue was non-empty")
}
