// src/core/executor/alerts.rs

//! Alert dispatch: given a cluster event, fan it out to every configured
//! alert agent whose filters match, per §4.2 "Alert dispatch".

use std::collections::HashMap;

use bitflags::bitflags;

bitflags! {
    /// The event-kind bitmask an [`AlertEntry`] subscribes to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AlertKind: u8 {
        const NODE      = 0b0001;
        const ATTRIBUTE = 0b0010;
        const FENCING   = 0b0100;
        const RESOURCE  = 0b1000;
    }
}

/// A read-only configuration record describing one alert agent, per §3.
#[derive(Debug, Clone)]
pub struct AlertEntry {
    pub id: String,
    pub path: String,
    pub timeout_ms: u64,
    pub recipient: String,
    pub kinds: AlertKind,
    /// Empty means "no restriction" (matches every attribute).
    pub attribute_allowlist: Vec<String>,
    pub environment: HashMap<String, String>,
    pub timestamp_format: String,
}

/// Extra detail needed only for resource-operation events, to support the
/// §4.2 suppression rule ("probes that find the resource in its expected
/// state are not noteworthy").
#[derive(Debug, Clone, Copy)]
pub struct ResourceProbeInfo {
    pub interval_ms: u64,
    pub rc: i32,
    pub expected_rc: i32,
}

/// One cluster event to fan out to alert agents.
#[derive(Debug, Clone)]
pub struct AlertEvent {
    pub kind: AlertKind,
    /// Set for `ATTRIBUTE` events; used against an entry's allow-list.
    pub attribute_name: Option<String>,
    /// Set for `RESOURCE` events; enables the zero-interval-monitor
    /// suppression rule.
    pub resource_probe: Option<ResourceProbeInfo>,
    pub base_params: HashMap<String, String>,
}

/// One fully-resolved submission built for a single alert entry, ready to be
/// handed to the action executor (§4.2 step 3: "Submit the per-entry alert
/// action through component B").
#[derive(Debug, Clone)]
pub struct AlertSubmission {
    pub entry_id: String,
    pub exec_path: String,
    pub timeout_ms: u64,
    pub env: HashMap<String, String>,
}

/// Aggregate dispatch outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertOutcome {
    AllOk,
    SomeFailed,
    AllFailed,
}

pub fn aggregate(results: &[bool]) -> AlertOutcome {
    if results.is_empty() || results.iter().all(|ok| *ok) {
        AlertOutcome::AllOk
    } else if results.iter().all(|ok| !*ok) {
        AlertOutcome::AllFailed
    } else {
        AlertOutcome::SomeFailed
    }
}

/// §4.2 step 4: a successful zero-interval monitor matching its expected
/// return code is not noteworthy and is suppressed entirely.
fn is_suppressed(event: &AlertEvent) -> bool {
    match (event.kind, event.resource_probe) {
        (AlertKind::RESOURCE, Some(info)) => info.interval_ms == 0 && info.rc == info.expected_rc,
        _ => false,
    }
}

fn entry_matches(entry: &AlertEntry, event: &AlertEvent) -> bool {
    if !entry.kinds.contains(event.kind) {
        return false;
    }
    if event.kind == AlertKind::ATTRIBUTE && !entry.attribute_allowlist.is_empty() {
        let Some(name) = &event.attribute_name else {
            return false;
        };
        if !entry.attribute_allowlist.iter().any(|a| a == name) {
            return false;
        }
    }
    true
}

/// §4.2 steps 1-3, pure/testable: builds the per-entry environment and
/// exec descriptors for every matching, non-suppressed alert entry.
/// `version` and `now_formatted` come from the caller so this function stays
/// free of process-global clock access.
pub fn build_submissions(
    event: &AlertEvent,
    alerts: &[AlertEntry],
    version: &str,
    format_timestamp: impl Fn(&str) -> String,
) -> Vec<AlertSubmission> {
    if is_suppressed(event) {
        return Vec::new();
    }

    let kind_name = match event.kind {
        AlertKind::NODE => "node",
        AlertKind::ATTRIBUTE => "attribute",
        AlertKind::FENCING => "fencing",
        AlertKind::RESOURCE => "resource",
        _ => "unknown",
    };

    alerts
        .iter()
        .filter(|entry| entry_matches(entry, event))
        .map(|entry| {
            let mut env = event.base_params.clone();
            env.insert("CRM_alert_kind".to_string(), kind_name.to_string());
            env.insert("CRM_alert_version".to_string(), version.to_string());
            env.insert("CRM_alert_recipient".to_string(), entry.recipient.clone());
            env.insert(
                "CRM_alert_timestamp".to_string(),
                format_timestamp(&entry.timestamp_format),
            );
            if let Some(name) = &event.attribute_name {
                env.insert("CRM_alert_attribute_name".to_string(), name.clone());
            }
            for (k, v) in &entry.environment {
                env.insert(k.clone(), v.clone());
            }
            AlertSubmission {
                entry_id: entry.id.clone(),
                exec_path: entry.path.clone(),
                timeout_ms: entry.timeout_ms,
                env,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, kinds: AlertKind, allow: &[&str]) -> AlertEntry {
        AlertEntry {
            id: id.to_string(),
            path: format!("/etc/alerts/{id}.sh"),
            timeout_ms: 30_000,
            recipient: "ops@example.com".to_string(),
            kinds,
            attribute_allowlist: allow.iter().map(|s| s.to_string()).collect(),
            environment: HashMap::new(),
            timestamp_format: "%F %T".to_string(),
        }
    }

    #[test]
    fn s4_attribute_filter_only_fires_matching_or_unrestricted_entries() {
        let a1 = entry("a1", AlertKind::ATTRIBUTE, &["foo"]);
        let a2 = entry("a2", AlertKind::ATTRIBUTE, &[]);
        let event = AlertEvent {
            kind: AlertKind::ATTRIBUTE,
            attribute_name: Some("bar".to_string()),
            resource_probe: None,
            base_params: HashMap::new(),
        };
        let submissions = build_submissions(&event, &[a1, a2], "1.0", |_| "2026-07-31T00:00:00Z".to_string());
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].entry_id, "a2");
        assert_eq!(
            submissions[0].env.get("CRM_alert_kind").map(String::as_str),
            Some("attribute")
        );
        assert_eq!(
            submissions[0].env.get("CRM_alert_attribute_name").map(String::as_str),
            Some("bar")
        );
    }

    #[test]
    fn successful_zero_interval_monitor_is_suppressed() {
        let entries = [entry("a1", AlertKind::RESOURCE, &[])];
        let event = AlertEvent {
            kind: AlertKind::RESOURCE,
            attribute_name: None,
            resource_probe: Some(ResourceProbeInfo {
                interval_ms: 0,
                rc: 0,
                expected_rc: 0,
            }),
            base_params: HashMap::new(),
        };
        let submissions = build_submissions(&event, &entries, "1.0", |_| String::new());
        assert!(submissions.is_empty());
    }

    #[test]
    fn failing_zero_interval_monitor_is_not_suppressed() {
        let entries = [entry("a1", AlertKind::RESOURCE, &[])];
        let event = AlertEvent {
            kind: AlertKind::RESOURCE,
            attribute_name: None,
            resource_probe: Some(ResourceProbeInfo {
                interval_ms: 0,
                rc: 1,
                expected_rc: 0,
            }),
            base_params: HashMap::new(),
        };
        let submissions = build_submissions(&event, &entries, "1.0", |_| String::new());
        assert_eq!(submissions.len(), 1);
    }

    #[test]
    fn aggregate_outcomes() {
        assert_eq!(aggregate(&[true, true]), AlertOutcome::AllOk);
        assert_eq!(aggregate(&[false, false]), AlertOutcome::AllFailed);
        assert_eq!(aggregate(&[true, false]), AlertOutcome::SomeFailed);
        assert_eq!(aggregate(&[]), AlertOutcome::AllOk);
    }
}
