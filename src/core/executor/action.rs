// src/core/executor/action.rs

//! The resource-action descriptor and its lifecycle, per §3/§4.2.

use std::collections::HashMap;
use std::time::Instant;

use crate::core::identity::OperationIdentity;

/// The agent transport family governing how an action is executed, per §3
/// and §9 ("model classes as a closed sum type... each variant carries only
/// the parameters it needs").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionClass {
    /// LSB/OCF-style script agent, invoked as a direct child process.
    ScriptInit { provider: String },
    /// Legacy heartbeat-style script agent: positional, numbered parameters.
    HeartbeatLegacy,
    /// First system-service bus (e.g. systemd).
    ServiceBusA,
    /// Second system-service bus (e.g. upstart).
    ServiceBusB,
    /// Nagios-style remote probe.
    RemoteProbe,
    /// Generic/unclassified script agent.
    Generic,
    /// Alias resolved at submission time to one of the above (§4.2 step 2).
    ServiceAlias,
    /// An alert agent invoked by the alert dispatcher (§4.2 "Alert
    /// dispatch"). Carries its own executable path directly rather than
    /// deriving one from a provider/agent naming convention, since alert
    /// agents are arbitrary configured executables, not OCF resource agents.
    AlertAgent { exec_path: String },
}

impl ActionClass {
    pub fn requires_provider(&self) -> bool {
        matches!(self, ActionClass::ScriptInit { .. })
    }

    pub fn is_direct_process(&self) -> bool {
        matches!(
            self,
            ActionClass::ScriptInit { .. }
                | ActionClass::HeartbeatLegacy
                | ActionClass::RemoteProbe
                | ActionClass::Generic
                | ActionClass::AlertAgent { .. }
        )
    }

    pub fn is_service_bus(&self) -> bool {
        matches!(self, ActionClass::ServiceBusA | ActionClass::ServiceBusB)
    }

    pub fn parse(s: &str, provider: Option<&str>) -> Option<Self> {
        match s {
            "script-init" => Some(ActionClass::ScriptInit {
                provider: provider.unwrap_or_default().to_string(),
            }),
            "heartbeat-legacy" => Some(ActionClass::HeartbeatLegacy),
            "service-bus-a" => Some(ActionClass::ServiceBusA),
            "service-bus-b" => Some(ActionClass::ServiceBusB),
            "remote-probe" => Some(ActionClass::RemoteProbe),
            "generic" => Some(ActionClass::Generic),
            "service" => Some(ActionClass::ServiceAlias),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ActionState {
    Pending,
    Blocked,
    InFlight,
    CancelRequested,
    Completed,
}

/// Mirrors the upstream `rsc-op-status`/result-code vocabulary (§3); the
/// `Display` impl is what gets logged and, eventually, reported upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum ActionStatus {
    Done,
    Cancelled,
    TimedOut,
    NotInstalled,
    NotConfigured,
    ErrorHard,
    ErrorGeneric,
    Pending,
}

/// Populated on completion, per §3.
#[derive(Debug, Clone, Default)]
pub struct ActionResult {
    pub exit_code: i32,
    pub status: Option<ActionStatus>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed_ms: u64,
}

/// Invoked exactly once, on the action's terminal completion (§9 "Callback
/// lifetime"). Owned by the `ResourceAction` it was submitted with; never
/// shared, never re-armed.
pub type ActionCallback = Box<dyn FnOnce(&OperationIdentity, &ActionResult) + Send>;

/// One invocation of one operation on one resource, per §3.
pub struct ResourceAction {
    pub rsc_id: String,
    pub operation: String,
    pub interval_ms: u64,
    pub timeout_ms: u64,
    pub class: ActionClass,
    pub agent: String,
    /// Keyed by name for most classes, by decimal position
    /// (`"1"`, `"2"`, ...) for `HeartbeatLegacy`.
    pub parameters: HashMap<String, String>,
    pub sequence_no: u64,
    pub state: ActionState,
    pub result: Option<ActionResult>,
    pub synchronous: bool,
    pub cancel: bool,
    pub submitted_at: Instant,
    /// Opaque data handed back to `callback` unchanged; the executor never
    /// inspects it.
    pub user_data: Option<String>,
    /// The submitter's completion hook, per §3's "callback reference" field.
    /// Taken (not borrowed) at call time so the terminal-state flag below
    /// can guarantee it fires at most once even under a stale/duplicate
    /// completion.
    pub callback: Option<ActionCallback>,
    /// Set the first time `callback` is taken and invoked; forbids a second
    /// firing for the same action (§9). Only ever touched through
    /// `fire_callback`; `pub(crate)` purely so in-crate constructors can
    /// initialize it to `false`.
    pub(crate) callback_fired: bool,
}

impl std::fmt::Debug for ResourceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceAction")
            .field("rsc_id", &self.rsc_id)
            .field("operation", &self.operation)
            .field("interval_ms", &self.interval_ms)
            .field("timeout_ms", &self.timeout_ms)
            .field("class", &self.class)
            .field("agent", &self.agent)
            .field("parameters", &self.parameters)
            .field("sequence_no", &self.sequence_no)
            .field("state", &self.state)
            .field("result", &self.result)
            .field("synchronous", &self.synchronous)
            .field("cancel", &self.cancel)
            .field("submitted_at", &self.submitted_at)
            .field("user_data", &self.user_data)
            .field("callback", &self.callback.as_ref().map(|_| "<fn>"))
            .field("callback_fired", &self.callback_fired)
            .finish()
    }
}

impl ResourceAction {
    pub fn identity(&self) -> OperationIdentity {
        OperationIdentity::new(self.rsc_id.clone(), self.operation.clone(), self.interval_ms)
    }

    pub fn is_recurring(&self) -> bool {
        self.interval_ms > 0
    }

    /// Invokes `callback` exactly once, guarded by `callback_fired`. A
    /// second call (e.g. from a stale outcome that still matched the
    /// current `sequence_no`) is a no-op.
    pub fn fire_callback(&mut self, identity: &OperationIdentity, result: &ActionResult) {
        if self.callback_fired {
            return;
        }
        self.callback_fired = true;
        if let Some(callback) = self.callback.take() {
            callback(identity, result);
        }
    }
}
