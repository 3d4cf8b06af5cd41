// src/core/executor/transport.rs

//! Builds the canonical execution descriptor for an action and resolves the
//! `service-alias` class to a concrete transport, per §4.2.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;

use super::action::{ActionClass, ResourceAction};

/// Sentinel `exec_path` used for service-bus classes: only parameters (unit
/// options) matter; there is no real executable path (§4.2 step 4).
pub const SERVICE_BUS_SENTINEL: &str = "<service-bus>";

/// Where on-disk script-init agents live, by provider.
pub fn script_init_path(provider: &str, agent: &str) -> String {
    format!("/usr/lib/ocf/resource.d/{provider}/{agent}")
}

fn heartbeat_legacy_path(agent: &str) -> String {
    format!("/etc/ha.d/resource.d/{agent}")
}

fn remote_probe_path(agent: &str) -> String {
    format!("/usr/lib/nagios/plugins/{agent}")
}

fn generic_path(agent: &str) -> String {
    format!("/usr/lib/heartbeat/{agent}")
}

/// Parameters that are meta-information rather than agent options and are
/// skipped when building `--key value` pairs for a remote-probe (§4.2 step 4).
const META_PARAMETERS: &[&str] = &["crm_feature_set", "CRM_meta_interval", "CRM_meta_timeout"];

/// The canonical action descriptor: what to exec and with what environment,
/// per §4.2 step 4.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecDescriptor {
    pub exec_path: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

/// §4.2 step 3: canonicalize the operation name for legacy script classes.
pub fn canonicalize_operation(class: &ActionClass, operation: &str) -> String {
    if matches!(class, ActionClass::HeartbeatLegacy) && operation == "monitor" {
        "status".to_string()
    } else {
        operation.to_string()
    }
}

/// §4.2 step 4: build the execution descriptor for an already-classified
/// action (i.e. `class` is not `ServiceAlias`).
pub fn build_exec_descriptor(action: &ResourceAction) -> ExecDescriptor {
    let operation = canonicalize_operation(&action.class, &action.operation);

    match &action.class {
        ActionClass::ScriptInit { provider } => {
            let exec_path = script_init_path(provider, &action.agent);
            ExecDescriptor {
                args: vec![exec_path.clone(), operation],
                exec_path,
                env: action.parameters.clone(),
            }
        }
        ActionClass::Generic => {
            let exec_path = generic_path(&action.agent);
            ExecDescriptor {
                args: vec![exec_path.clone(), operation],
                exec_path,
                env: action.parameters.clone(),
            }
        }
        ActionClass::HeartbeatLegacy => {
            let exec_path = heartbeat_legacy_path(&action.agent);
            let mut args = vec![exec_path.clone()];
            let mut i = 1u32;
            while let Some(v) = action.parameters.get(&i.to_string()) {
                args.push(v.clone());
                i += 1;
            }
            args.push(operation);
            ExecDescriptor {
                exec_path,
                args,
                env: HashMap::new(),
            }
        }
        ActionClass::ServiceBusA | ActionClass::ServiceBusB => ExecDescriptor {
            exec_path: SERVICE_BUS_SENTINEL.to_string(),
            args: Vec::new(),
            env: action.parameters.clone(),
        },
        ActionClass::RemoteProbe => {
            let exec_path = remote_probe_path(&action.agent);
            let mut args = vec![exec_path.clone()];
            if action.interval_ms == 0 && operation == "monitor" {
                args.push("--version".to_string());
            } else {
                for (k, v) in &action.parameters {
                    if META_PARAMETERS.contains(&k.as_str()) {
                        continue;
                    }
                    args.push(format!("--{k}"));
                    args.push(v.clone());
                }
            }
            ExecDescriptor {
                exec_path,
                args,
                env: HashMap::new(),
            }
        }
        ActionClass::AlertAgent { exec_path } => ExecDescriptor {
            args: vec![exec_path.clone()],
            exec_path: exec_path.clone(),
            env: action.parameters.clone(),
        },
        ActionClass::ServiceAlias => {
            unreachable!("service-alias must be resolved before building a descriptor")
        }
    }
}

/// Queried during `service-alias` resolution (§4.2 step 2): does a
/// service-bus backend know about `agent`? Kept as a trait so the executor
/// core never talks to D-Bus directly — the real check is a network
/// round-trip, out of this core's scope (§1).
#[async_trait]
pub trait ServiceBusDiscovery: Send + Sync {
    async fn knows(&self, agent: &str) -> bool;
}

/// Resolves `ActionClass::ServiceAlias` to a concrete class by probing, in
/// order, the script-init filesystem path (cheap), then service-bus A, then
/// service-bus B (both network round-trips). Falls back to script-init if
/// nothing matches, per §4.2 step 2 and the recorded open-question decision
/// in DESIGN.md.
pub async fn resolve_service_alias(
    agent: &str,
    default_provider: &str,
    bus_a: &dyn ServiceBusDiscovery,
    bus_b: &dyn ServiceBusDiscovery,
    script_root_exists: impl Fn(&str, &str) -> bool,
) -> ActionClass {
    if script_root_exists(default_provider, agent) {
        return ActionClass::ScriptInit {
            provider: default_provider.to_string(),
        };
    }
    if bus_a.knows(agent).await {
        return ActionClass::ServiceBusA;
    }
    if bus_b.knows(agent).await {
        return ActionClass::ServiceBusB;
    }
    ActionClass::ScriptInit {
        provider: default_provider.to_string(),
    }
}

/// Default filesystem probe used by [`resolve_service_alias`] in
/// production: does `script_init_path(provider, agent)` exist on disk?
pub fn default_script_exists(provider: &str, agent: &str) -> bool {
    Path::new(&script_init_path(provider, agent)).exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;
    use std::time::Instant;

    fn action(class: ActionClass, operation: &str, interval_ms: u64) -> ResourceAction {
        ResourceAction {
            rsc_id: "r".into(),
            operation: operation.into(),
            interval_ms,
            timeout_ms: 1000,
            class,
            agent: "myagent".into(),
            parameters: Map::new(),
            sequence_no: 0,
            state: crate::core::executor::action::ActionState::Pending,
            result: None,
            synchronous: false,
            cancel: false,
            submitted_at: Instant::now(),
            user_data: None,
            callback: None,
            callback_fired: false,
        }
    }

    #[test]
    fn heartbeat_legacy_canonicalizes_monitor_to_status() {
        assert_eq!(
            canonicalize_operation(&ActionClass::HeartbeatLegacy, "monitor"),
            "status"
        );
        assert_eq!(
            canonicalize_operation(&ActionClass::ScriptInit { provider: "heartbeat".into() }, "monitor"),
            "monitor"
        );
    }

    #[test]
    fn script_init_descriptor_has_operation_as_sole_argument() {
        let a = action(
            ActionClass::ScriptInit { provider: "heartbeat".into() },
            "start",
            0,
        );
        let d = build_exec_descriptor(&a);
        assert_eq!(d.exec_path, "/usr/lib/ocf/resource.d/heartbeat/myagent");
        assert_eq!(d.args, vec![d.exec_path.clone(), "start".to_string()]);
    }

    #[test]
    fn heartbeat_legacy_descriptor_is_positional() {
        let mut a = action(ActionClass::HeartbeatLegacy, "monitor", 0);
        a.parameters.insert("1".into(), "ip".into());
        a.parameters.insert("2".into(), "eth0".into());
        let d = build_exec_descriptor(&a);
        assert_eq!(d.args[1], "ip");
        assert_eq!(d.args[2], "eth0");
        assert_eq!(d.args[3], "status");
    }

    #[test]
    fn remote_probe_zero_interval_monitor_is_version_only() {
        let a = action(ActionClass::RemoteProbe, "monitor", 0);
        let d = build_exec_descriptor(&a);
        assert_eq!(d.args[1], "--version");
    }

    #[test]
    fn remote_probe_other_ops_pass_key_value_pairs() {
        let mut a = action(ActionClass::RemoteProbe, "start", 0);
        a.parameters.insert("host".into(), "10.0.0.1".into());
        let d = build_exec_descriptor(&a);
        assert!(d.args.contains(&"--host".to_string()));
        assert!(d.args.contains(&"10.0.0.1".to_string()));
    }

    #[test]
    fn service_bus_descriptor_has_sentinel_path() {
        let a = action(ActionClass::ServiceBusA, "start", 0);
        let d = build_exec_descriptor(&a);
        assert_eq!(d.exec_path, SERVICE_BUS_SENTINEL);
    }

    struct KnowsOnly(bool);

    #[async_trait]
    impl ServiceBusDiscovery for KnowsOnly {
        async fn knows(&self, _agent: &str) -> bool {
            self.0
        }
    }

    #[tokio::test]
    async fn service_alias_prefers_script_init_when_script_exists() {
        let class = resolve_service_alias("foo", "heartbeat", &KnowsOnly(true), &KnowsOnly(true), |_, _| true).await;
        assert_eq!(class, ActionClass::ScriptInit { provider: "heartbeat".into() });
    }

    #[tokio::test]
    async fn service_alias_falls_back_to_bus_a_then_bus_b() {
        let class = resolve_service_alias("foo", "heartbeat", &KnowsOnly(true), &KnowsOnly(false), |_, _| false).await;
        assert_eq!(class, ActionClass::ServiceBusA);

        let class = resolve_service_alias("foo", "heartbeat", &KnowsOnly(false), &KnowsOnly(true), |_, _| false).await;
        assert_eq!(class, ActionClass::ServiceBusB);
    }

    #[tokio::test]
    async fn service_alias_defaults_to_script_init_when_nothing_matches() {
        let class = resolve_service_alias("foo", "heartbeat", &KnowsOnly(false), &KnowsOnly(false), |_, _| false).await;
        assert_eq!(class, ActionClass::ScriptInit { provider: "heartbeat".into() });
    }
}
