// src/core/identity.rs

//! Canonical identity of a resource action, per §6.5: the triple
//! `(resource, operation, interval)`, round-tripping through the string key
//! `<rsc_id>_<operation>_<interval_ms>` used for recurring-action lookup.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationIdentity {
    pub rsc_id: String,
    pub operation: String,
    pub interval_ms: u64,
}

impl OperationIdentity {
    pub fn new(rsc_id: impl Into<String>, operation: impl Into<String>, interval_ms: u64) -> Self {
        Self {
            rsc_id: rsc_id.into(),
            operation: operation.into(),
            interval_ms,
        }
    }

    /// Parses a key of the form `<rsc_id>_<operation>_<interval_ms>`. The
    /// interval is the last `_`-separated field; everything before the
    /// second-to-last underscore is the resource id, and the field between
    /// is the operation. Resource ids and operations themselves never
    /// contain underscores in this system, so this is unambiguous.
    pub fn parse(key: &str) -> Option<Self> {
        let (head, interval_str) = key.rsplit_once('_')?;
        let interval_ms: u64 = interval_str.parse().ok()?;
        let (rsc_id, operation) = head.rsplit_once('_')?;
        Some(Self::new(rsc_id, operation, interval_ms))
    }
}

impl fmt::Display for OperationIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.rsc_id, self.operation, self.interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_format_and_parse() {
        let id = OperationIdentity::new("webserver", "monitor", 5000);
        let key = id.to_string();
        assert_eq!(key, "webserver_monitor_5000");
        assert_eq!(OperationIdentity::parse(&key), Some(id));
    }

    #[test]
    fn parse_rejects_malformed_keys() {
        assert_eq!(OperationIdentity::parse("no-underscores"), None);
        assert_eq!(OperationIdentity::parse("only_one"), None);
        assert_eq!(OperationIdentity::parse("rsc_op_notanumber"), None);
    }
}
