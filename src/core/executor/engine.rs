// src/core/executor/engine.rs

//! The action executor's coordination engine: submission validation,
//! service-alias resolution, per-resource serialization, recurring-action
//! tracking, cancellation, direct-process execution, and alert dispatch, per
//! §4.2. Designed to be owned exclusively by a single cooperative-loop task,
//! per §5 — no locking, no shared mutable state across threads.

use std::collections::{HashMap, HashSet};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::time::{delay_queue::Key as DelayKey, DelayQueue};
use tracing::{debug, info, warn};

use crate::core::errors::ExecutorError;
use crate::core::identity::OperationIdentity;

use super::action::{ActionCallback, ActionClass, ActionResult, ActionState, ActionStatus, ResourceAction};
use super::alerts::{self, AlertEntry, AlertEvent, AlertSubmission, ResourceProbeInfo};
use super::transport::{
    build_exec_descriptor, default_script_exists, resolve_service_alias, ExecDescriptor,
    ServiceBusDiscovery,
};

/// A request to submit one action, prior to validation and classification.
pub struct SubmitRequest {
    pub rsc_id: String,
    pub operation: String,
    pub interval_ms: u64,
    pub timeout_ms: u64,
    pub class: String,
    pub provider: Option<String>,
    pub agent: String,
    pub parameters: HashMap<String, String>,
    pub synchronous: bool,
    /// Opaque data the submitter wants handed back unchanged on completion.
    pub user_data: Option<String>,
    /// §3 "callback reference": invoked exactly once, on terminal
    /// completion, with `(identity, result)`.
    pub callback: Option<ActionCallback>,
}

impl std::fmt::Debug for SubmitRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmitRequest")
            .field("rsc_id", &self.rsc_id)
            .field("operation", &self.operation)
            .field("interval_ms", &self.interval_ms)
            .field("timeout_ms", &self.timeout_ms)
            .field("class", &self.class)
            .field("provider", &self.provider)
            .field("agent", &self.agent)
            .field("parameters", &self.parameters)
            .field("synchronous", &self.synchronous)
            .field("user_data", &self.user_data)
            .field("callback", &self.callback.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// A request to cancel a tracked recurring action.
#[derive(Debug, Clone)]
pub struct CancelRequest {
    pub identity: OperationIdentity,
}

/// Work handed to the executor loop.
pub enum ExecutorTask {
    Submit(SubmitRequest),
    Cancel(CancelRequest),
    Dispatch(AlertEvent),
}

/// The outcome of one completed child process, fed back into the engine loop
/// so completion is handled as an event the single-threaded loop reacts to,
/// per §5, the same discipline used by the attribute aggregator's commit
/// channel.
struct ActionOutcome {
    identity: OperationIdentity,
    sequence_no: u64,
    result: ActionResult,
}

struct AlertOutcome {
    dispatch_id: u64,
    submission: AlertSubmission,
    ok: bool,
}

/// Tracks how many of one alert-dispatch event's submissions have reported
/// back, so their individual pass/fail results can be folded into a single
/// `alerts::aggregate()` outcome once the last one arrives.
struct DispatchTally {
    expected: usize,
    results: Vec<bool>,
}

/// §4.2 step 1: meta-option governing how many actions may run concurrently
/// against the same resource at once.
const DEFAULT_RESOURCE_CONCURRENCY: usize = 1;

pub struct Executor {
    default_provider: String,
    alert_version: String,
    alerts: Vec<AlertEntry>,
    bus_a: Arc<dyn ServiceBusDiscovery>,
    bus_b: Arc<dyn ServiceBusDiscovery>,

    /// Actions queued or running, keyed by recurring identity. One-shot
    /// (non-recurring) actions are tracked transiently under a synthetic
    /// identity carrying their sequence number so duplicate submission
    /// still has somewhere to land, but they are evicted on completion.
    actions: HashMap<OperationIdentity, ResourceAction>,
    /// FIFO of identities waiting for their resource's concurrency slot.
    pending: Vec<OperationIdentity>,
    /// Identities with an action currently running as a child process.
    in_flight: HashSet<OperationIdentity>,
    /// Per-resource count of in-flight actions, for the concurrency gate.
    resource_in_flight: HashMap<String, usize>,
    /// Per-identity re-arm timer: a recurring action's next submission is
    /// held here for `interval_ms` after the previous completion before it
    /// is pushed back onto `pending`, per §4.2/§9.
    recur_queue: DelayQueue<OperationIdentity>,
    recur_keys: HashMap<OperationIdentity, DelayKey>,
    /// Open alert-dispatch tallies, keyed by dispatch id.
    alert_tallies: HashMap<u64, DispatchTally>,
    next_dispatch_id: u64,

    next_sequence: u64,

    action_tx: mpsc::UnboundedSender<ActionOutcome>,
    action_rx: mpsc::UnboundedReceiver<ActionOutcome>,
    alert_tx: mpsc::UnboundedSender<AlertOutcome>,
    alert_rx: mpsc::UnboundedReceiver<AlertOutcome>,
}

impl Executor {
    pub fn new(
        default_provider: impl Into<String>,
        alert_version: impl Into<String>,
        alerts: Vec<AlertEntry>,
        bus_a: Arc<dyn ServiceBusDiscovery>,
        bus_b: Arc<dyn ServiceBusDiscovery>,
    ) -> Self {
        let (action_tx, action_rx) = mpsc::unbounded_channel();
        let (alert_tx, alert_rx) = mpsc::unbounded_channel();
        Self {
            default_provider: default_provider.into(),
            alert_version: alert_version.into(),
            alerts,
            bus_a,
            bus_b,
            actions: HashMap::new(),
            pending: Vec::new(),
            in_flight: HashSet::new(),
            resource_in_flight: HashMap::new(),
            recur_queue: DelayQueue::new(),
            recur_keys: HashMap::new(),
            alert_tallies: HashMap::new(),
            next_dispatch_id: 0,
            next_sequence: 0,
            action_tx,
            action_rx,
            alert_tx,
            alert_rx,
        }
    }

    /// Test/introspection accessor.
    pub fn tracked(&self, identity: &OperationIdentity) -> Option<&ResourceAction> {
        self.actions.get(identity)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Drives the engine until `tasks` is closed. Suspension points are
    /// task arrival and child-process completion, per §5.
    pub async fn run(&mut self, mut tasks: mpsc::Receiver<ExecutorTask>) {
        loop {
            tokio::select! {
                maybe_task = tasks.recv() => {
                    match maybe_task {
                        Some(task) => self.handle_task(task).await,
                        None => break,
                    }
                }
                Some(outcome) = self.action_rx.recv() => {
                    self.on_action_outcome(outcome).await;
                }
                Some(outcome) = self.alert_rx.recv() => {
                    self.on_alert_outcome(outcome);
                }
                expired = next_expired(&mut self.recur_queue) => {
                    let identity = expired.into_inner();
                    self.recur_keys.remove(&identity);
                    if self.actions.contains_key(&identity) {
                        self.pending.push(identity);
                        self.drain_queue();
                    }
                }
            }
        }
    }

    pub async fn handle_task(&mut self, task: ExecutorTask) {
        match task {
            ExecutorTask::Submit(req) => {
                if let Err(e) = self.submit(req).await {
                    warn!(error = %e, "action submission rejected");
                }
            }
            ExecutorTask::Cancel(req) => self.cancel(&req.identity),
            ExecutorTask::Dispatch(event) => self.dispatch_alerts(event).await,
        }
    }

    /// §4.2 step 1: validate, classify, and enqueue.
    pub async fn submit(&mut self, req: SubmitRequest) -> Result<(), ExecutorError> {
        if req.rsc_id.is_empty() {
            return Err(ExecutorError::EmptyResourceId);
        }
        if req.class.is_empty() {
            return Err(ExecutorError::EmptyClass);
        }
        if req.operation.is_empty() {
            return Err(ExecutorError::EmptyOperation);
        }
        if req.agent.is_empty() {
            return Err(ExecutorError::EmptyAgent);
        }

        let mut class = ActionClass::parse(&req.class, req.provider.as_deref())
            .ok_or_else(|| ExecutorError::UnknownClass(req.class.clone()))?;

        if class.requires_provider() && req.provider.as_deref().unwrap_or("").is_empty() {
            return Err(ExecutorError::MissingProvider(req.class.clone()));
        }

        if class == ActionClass::ServiceAlias {
            class = resolve_service_alias(
                &req.agent,
                &self.default_provider,
                self.bus_a.as_ref(),
                self.bus_b.as_ref(),
                default_script_exists,
            )
            .await;
        }

        let identity = OperationIdentity::new(req.rsc_id.clone(), req.operation.clone(), req.interval_ms);
        self.next_sequence += 1;
        let sequence_no = self.next_sequence;

        // §4.2 property 5: a later submission for an identity already
        // tracked coalesces into the existing slot rather than duplicating
        // it — superseding parameters but keeping queue position.
        if let Some(existing) = self.actions.get_mut(&identity) {
            if existing.state == ActionState::InFlight {
                debug!(%identity, "recurring action already in flight, deferring to next tick");
            }
            existing.timeout_ms = req.timeout_ms;
            existing.parameters = req.parameters;
            existing.sequence_no = sequence_no;
            existing.user_data = req.user_data;
            existing.callback = req.callback;
            existing.callback_fired = false;
            return Ok(());
        }

        let action = ResourceAction {
            rsc_id: req.rsc_id,
            operation: req.operation,
            interval_ms: req.interval_ms,
            timeout_ms: req.timeout_ms,
            class,
            agent: req.agent,
            parameters: req.parameters,
            sequence_no,
            state: ActionState::Pending,
            result: None,
            synchronous: req.synchronous,
            cancel: false,
            submitted_at: Instant::now(),
            user_data: req.user_data,
            callback: req.callback,
            callback_fired: false,
        };

        self.actions.insert(identity.clone(), action);
        self.pending.push(identity.clone());
        self.drain_queue();
        Ok(())
    }

    /// §4.2 property 6: cancellation marks the action for cancellation;
    /// an in-flight child is not killed but its completion is reported as
    /// `Cancelled` rather than its real exit status, and a still-pending
    /// action is dropped outright.
    pub fn cancel(&mut self, identity: &OperationIdentity) {
        let Some(action) = self.actions.get_mut(identity) else {
            return;
        };
        match action.state {
            ActionState::Pending | ActionState::Blocked => {
                self.pending.retain(|id| id != identity);
                self.actions.remove(identity);
            }
            ActionState::InFlight => {
                action.state = ActionState::CancelRequested;
                action.cancel = true;
            }
            ActionState::CancelRequested | ActionState::Completed => {}
        }
    }

    /// §3: the one-in-flight rule serializes by `rsc_id` for direct-process
    /// classes, but by full identity for service-bus classes — two
    /// service-bus operations against the same resource with different
    /// identities may run concurrently.
    fn concurrency_key(action: &ResourceAction) -> String {
        if action.class.is_service_bus() {
            action.identity().to_string()
        } else {
            action.rsc_id.clone()
        }
    }

    /// §4.2 step 1 cont'd: admits as many pending actions as the
    /// per-resource concurrency gate allows. Re-entrant-safe: called after
    /// every submission and every completion, and never recurses.
    fn drain_queue(&mut self) {
        let mut i = 0;
        while i < self.pending.len() {
            let identity = self.pending[i].clone();
            let Some(action) = self.actions.get(&identity) else {
                self.pending.remove(i);
                continue;
            };
            let gate_key = Self::concurrency_key(action);
            let slot = self.resource_in_flight.entry(gate_key).or_insert(0);
            if *slot >= DEFAULT_RESOURCE_CONCURRENCY {
                i += 1;
                continue;
            }
            *slot += 1;
            self.pending.remove(i);
            self.in_flight.insert(identity.clone());
            self.spawn_action(identity);
        }
    }

    fn spawn_action(&mut self, identity: OperationIdentity) {
        let Some(action) = self.actions.get_mut(&identity) else {
            return;
        };
        action.state = ActionState::InFlight;
        let descriptor = build_exec_descriptor(action);
        let timeout_ms = action.timeout_ms;
        let sequence_no = action.sequence_no;
        let cancel = action.cancel;
        let tx = self.action_tx.clone();
        let identity_owned = identity.clone();

        tokio::spawn(async move {
            let result = if cancel {
                ActionResult {
                    status: Some(ActionStatus::Cancelled),
                    ..Default::default()
                }
            } else {
                run_descriptor(&descriptor, timeout_ms).await
            };
            let _ = tx.send(ActionOutcome {
                identity: identity_owned,
                sequence_no,
                result,
            });
        });
    }

    async fn on_action_outcome(&mut self, outcome: ActionOutcome) {
        let ActionOutcome { identity, sequence_no, result } = outcome;

        self.in_flight.remove(&identity);
        let gate_key = self
            .actions
            .get(&identity)
            .map(Self::concurrency_key)
            .unwrap_or_else(|| identity.rsc_id.clone());
        if let Some(slot) = self.resource_in_flight.get_mut(&gate_key) {
            *slot = slot.saturating_sub(1);
        }

        // A stale completion for a superseded submission is dropped; the
        // current submission will be (re)spawned by drain_queue.
        let mut completed = false;
        let mut recurring = false;
        if let Some(action) = self.actions.get_mut(&identity) {
            if action.sequence_no == sequence_no {
                completed = true;
                action.fire_callback(&identity, &result);
                action.result = Some(result.clone());
                action.state = ActionState::Completed;
                recurring = action.is_recurring();
                if recurring {
                    action.state = ActionState::Blocked;
                }
            }
        }

        if completed {
            info!(%identity, status = ?result.status, "action completed");
            self.dispatch_resource_event(&identity, &result);
            if recurring {
                // §4.2/§9: the next submission for a recurring action is
                // held for `interval_ms` after this completion, rather than
                // re-queued back-to-back.
                let deadline = Duration::from_millis(identity.interval_ms);
                if let Some(key) = self.recur_keys.get(&identity) {
                    self.recur_queue.reset(key, deadline);
                } else {
                    let key = self.recur_queue.insert(identity.clone(), deadline);
                    self.recur_keys.insert(identity.clone(), key);
                }
            } else {
                self.actions.remove(&identity);
            }
        }

        self.drain_queue();
    }

    fn dispatch_resource_event(&mut self, identity: &OperationIdentity, result: &ActionResult) {
        let expected_rc = if identity.operation == "monitor" { 0 } else { 0 };
        let event = AlertEvent {
            kind: alerts::AlertKind::RESOURCE,
            attribute_name: None,
            resource_probe: Some(ResourceProbeInfo {
                interval_ms: identity.interval_ms,
                rc: result.exit_code,
                expected_rc,
            }),
            base_params: HashMap::from([
                ("CRM_alert_node".to_string(), identity.rsc_id.clone()),
                ("CRM_alert_task".to_string(), identity.operation.clone()),
                ("CRM_alert_rc".to_string(), result.exit_code.to_string()),
            ]),
        };
        self.spawn_alert_dispatch(event);
    }

    /// §4.2 "Alert dispatch": entry point for events originating outside
    /// the resource-completion path (node/attribute/fencing events).
    pub async fn dispatch_alerts(&mut self, event: AlertEvent) {
        self.spawn_alert_dispatch(event);
    }

    /// Fans a dispatch event out to every matching alert entry, and opens a
    /// tally for its submissions so `on_alert_outcome` can fold their
    /// individual results into one `alerts::AlertOutcome` per event, per
    /// §4.2's alert-dispatch result semantics.
    fn spawn_alert_dispatch(&mut self, event: AlertEvent) {
        let submissions = alerts::build_submissions(&event, &self.alerts, &self.alert_version, format_timestamp);
        if submissions.is_empty() {
            return;
        }

        self.next_dispatch_id += 1;
        let dispatch_id = self.next_dispatch_id;
        self.alert_tallies.insert(
            dispatch_id,
            DispatchTally {
                expected: submissions.len(),
                results: Vec::with_capacity(submissions.len()),
            },
        );

        for submission in submissions {
            let tx = self.alert_tx.clone();
            let timeout_ms = submission.timeout_ms;
            let descriptor = ExecDescriptor {
                exec_path: submission.exec_path.clone(),
                args: vec![submission.exec_path.clone()],
                env: submission.env.clone(),
            };
            tokio::spawn(async move {
                let result = run_descriptor(&descriptor, timeout_ms).await;
                let ok = matches!(result.status, Some(ActionStatus::Done)) && result.exit_code == 0;
                let _ = tx.send(AlertOutcome { dispatch_id, submission, ok });
            });
        }
    }

    /// Folds one submission's result into its dispatch's tally; once every
    /// submission for that dispatch has reported, aggregates the tally into
    /// one `AllOk`/`SomeFailed`/`AllFailed` outcome (§4.2) and logs it.
    fn on_alert_outcome(&mut self, outcome: AlertOutcome) {
        let AlertOutcome { dispatch_id, submission, ok } = outcome;
        if ok {
            debug!(entry = %submission.entry_id, "alert agent dispatched");
        } else {
            warn!(entry = %submission.entry_id, "alert agent failed");
        }

        if let Some(tally) = self.alert_tallies.get_mut(&dispatch_id) {
            tally.results.push(ok);
            if tally.results.len() >= tally.expected {
                let outcome = alerts::aggregate(&tally.results);
                info!(dispatch_id, ?outcome, "alert dispatch completed");
                self.alert_tallies.remove(&dispatch_id);
            }
        }
    }
}

fn format_timestamp(format: &str) -> String {
    Utc::now().format(format).to_string()
}

/// Awaits the next expired recurring-action re-arm timer, without
/// busy-spinning when the queue is momentarily empty (mirrors the
/// attribute aggregator's own dampen-timer guard).
async fn next_expired(
    queue: &mut DelayQueue<OperationIdentity>,
) -> tokio_util::time::delay_queue::Expired<OperationIdentity> {
    if queue.is_empty() {
        std::future::pending().await
    }
    std::future::poll_fn(|cx| queue.poll_expired(cx))
        .await
        .expect("queue was non-empty")
}

/// §4.2 step 4: runs a direct-process descriptor as a child, enforcing the
/// action's timeout, and maps the outcome to an [`ActionStatus`].
async fn run_descriptor(descriptor: &ExecDescriptor, timeout_ms: u64) -> ActionResult {
    let start = Instant::now();
    let mut command = tokio::process::Command::new(&descriptor.exec_path);
    command
        .args(descriptor.args.iter().skip(1))
        .envs(&descriptor.env)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let spawned = match command.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return ActionResult {
                exit_code: -1,
                status: Some(ActionStatus::NotInstalled),
                elapsed_ms: start.elapsed().as_millis() as u64,
                ..Default::default()
            };
        }
        Err(e) => {
            warn!(error = %e, path = %descriptor.exec_path, "could not fork action agent");
            return ActionResult {
                exit_code: -1,
                status: Some(ActionStatus::ErrorHard),
                elapsed_ms: start.elapsed().as_millis() as u64,
                ..Default::default()
            };
        }
    };

    let deadline = Duration::from_millis(timeout_ms.max(1));
    match timeout(deadline, spawned.wait_with_output()).await {
        Ok(Ok(output)) => {
            let exit_code = output.status.code().unwrap_or(-1);
            let status = if exit_code == 0 {
                ActionStatus::Done
            } else {
                ActionStatus::ErrorGeneric
            };
            ActionResult {
                exit_code,
                status: Some(status),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                elapsed_ms: start.elapsed().as_millis() as u64,
            }
        }
        Ok(Err(e)) => {
            warn!(error = %e, path = %descriptor.exec_path, "action agent wait failed");
            ActionResult {
                exit_code: -1,
                status: Some(ActionStatus::ErrorHard),
                elapsed_ms: start.elapsed().as_millis() as u64,
                ..Default::default()
            }
        }
        Err(_) => ActionResult {
            exit_code: -1,
            status: Some(ActionStatus::TimedOut),
            elapsed_ms: start.elapsed().as_millis() as u64,
            ..Default::default()
        },
    }
}
