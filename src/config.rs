// src/config.rs

//! Loading, validating, and resolving the daemon's configuration.

use std::fs;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::executor::{AlertEntry, AlertKind};

/// The default inter-update dampening interval used when a client does not
/// specify `dampen` (§6.4, matching the upstream default of 2000ms).
fn default_dampen_ms() -> u32 {
    2000
}

/// Default configuration-store query timeout, per §6.5/§5 ("commonly 120s").
fn default_cib_query_timeout_ms() -> u64 {
    120_000
}

fn default_proxy_request_timeout_ms() -> u64 {
    5_000
}

/// Default magnitude substituted for `INFINITY`/`-INFINITY` score sentinels,
/// per §6.4.
fn default_infinity_magnitude() -> i64 {
    1_000_000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// On-disk description of one configured alert agent, deserialized into the
/// read-only [`AlertEntry`] runtime record described in §3.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AlertEntryConfig {
    pub id: String,
    pub path: String,
    #[serde(default = "default_alert_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub recipient: String,
    /// Subset of `"node"`, `"attribute"`, `"fencing"`, `"resource"`.
    #[serde(default = "default_alert_kinds")]
    pub kinds: Vec<String>,
    #[serde(default)]
    pub attribute_allowlist: Vec<String>,
    #[serde(default)]
    pub environment: std::collections::HashMap<String, String>,
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
}

fn default_alert_timeout_ms() -> u64 {
    30_000
}

fn default_alert_kinds() -> Vec<String> {
    vec![
        "node".to_string(),
        "attribute".to_string(),
        "fencing".to_string(),
        "resource".to_string(),
    ]
}

fn default_timestamp_format() -> String {
    "%F %T".to_string()
}

impl AlertEntryConfig {
    /// Resolves the on-disk kind names to the runtime bitmask, per §3/§4.2.
    /// Unknown kind names are rejected at load time rather than silently
    /// ignored.
    fn resolve_kinds(&self) -> Result<AlertKind> {
        let mut kinds = AlertKind::empty();
        for name in &self.kinds {
            let kind = match name.as_str() {
                "node" => AlertKind::NODE,
                "attribute" => AlertKind::ATTRIBUTE,
                "fencing" => AlertKind::FENCING,
                "resource" => AlertKind::RESOURCE,
                other => return Err(anyhow!("unknown alert kind '{other}' in entry '{}'", self.id)),
            };
            kinds |= kind;
        }
        Ok(kinds)
    }

    pub fn into_alert_entry(&self) -> Result<AlertEntry> {
        Ok(AlertEntry {
            id: self.id.clone(),
            path: self.path.clone(),
            timeout_ms: self.timeout_ms,
            recipient: self.recipient.clone(),
            kinds: self.resolve_kinds()?,
            attribute_allowlist: self.attribute_allowlist.clone(),
            environment: self.environment.clone(),
            timestamp_format: self.timestamp_format.clone(),
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ScoreConfig {
    #[serde(default = "default_infinity_magnitude")]
    pub infinity_magnitude: i64,
}

impl ScoreConfig {
    fn default_value() -> Self {
        Self {
            infinity_magnitude: default_infinity_magnitude(),
        }
    }
}

/// The daemon's resolved, validated configuration, per SPEC_FULL §2
/// "AMBIENT: configuration surface".
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub node_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_dampen_ms")]
    pub default_dampen_ms: u32,
    #[serde(default = "default_cib_query_timeout_ms")]
    pub cib_query_timeout_ms: u64,
    #[serde(default = "default_proxy_request_timeout_ms")]
    pub proxy_request_timeout_ms: u64,
    #[serde(default = "ScoreConfig::default_value")]
    pub score: ScoreConfig,
    #[serde(default = "default_provider")]
    pub default_provider: String,
    #[serde(default)]
    pub alerts: Vec<AlertEntryConfig>,
}

fn default_provider() -> String {
    "heartbeat".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_name: String::new(),
            log_level: default_log_level(),
            default_dampen_ms: default_dampen_ms(),
            cib_query_timeout_ms: default_cib_query_timeout_ms(),
            proxy_request_timeout_ms: default_proxy_request_timeout_ms(),
            score: ScoreConfig::default_value(),
            default_provider: default_provider(),
            alerts: Vec::new(),
        }
    }
}

impl Config {
    /// Reads and parses a TOML config file, then validates it.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for logical consistency.
    fn validate(&self) -> Result<()> {
        if self.node_name.trim().is_empty() {
            return Err(anyhow!("node_name cannot be empty"));
        }
        if self.cib_query_timeout_ms == 0 {
            return Err(anyhow!("cib_query_timeout_ms cannot be 0"));
        }
        if self.proxy_request_timeout_ms == 0 {
            return Err(anyhow!("proxy_request_timeout_ms cannot be 0"));
        }
        if self.score.infinity_magnitude <= 0 {
            return Err(anyhow!("score.infinity_magnitude must be positive"));
        }
        for entry in &self.alerts {
            if entry.path.trim().is_empty() {
                return Err(anyhow!("alert entry '{}' has an empty path", entry.id));
            }
            entry.resolve_kinds()?;
        }
        Ok(())
    }

    pub fn alert_entries(&self) -> Result<Vec<AlertEntry>> {
        self.alerts.iter().map(AlertEntryConfig::into_alert_entry).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn from_file_reads_and_validates_a_real_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            node_name = "node1"
            default_dampen_ms = 1500

            [[alerts]]
            id = "a1"
            path = "/etc/alerts/a1.sh"
            kinds = ["node", "resource"]
            "#
        )
        .unwrap();

        let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.node_name, "node1");
        assert_eq!(config.default_dampen_ms, 1500);
        assert_eq!(config.alerts.len(), 1);
        assert_eq!(config.alerts[0].id, "a1");
    }

    #[test]
    fn from_file_rejects_an_invalid_config_on_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        // No `node_name`: parses fine, fails `validate()`.
        writeln!(file, r#"log_level = "debug""#).unwrap();
        let err = Config::from_file(file.path().to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("node_name"));
    }

    #[test]
    fn from_file_surfaces_a_missing_path_as_an_error() {
        let err = Config::from_file("/nonexistent/path/to/config.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn default_config_is_invalid_without_a_node_name() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn valid_config_with_alert_kinds_resolves() {
        let mut config = Config {
            node_name: "node1".to_string(),
            ..Config::default()
        };
        config.alerts.push(AlertEntryConfig {
            id: "a1".to_string(),
            path: "/etc/alerts/a1.sh".to_string(),
            timeout_ms: default_alert_timeout_ms(),
            recipient: String::new(),
            kinds: vec!["node".to_string(), "resource".to_string()],
            attribute_allowlist: Vec::new(),
            environment: std::collections::HashMap::new(),
            timestamp_format: default_timestamp_format(),
        });
        assert!(config.validate().is_ok());
        let entries = config.alert_entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].kinds.contains(AlertKind::NODE));
        assert!(entries[0].kinds.contains(AlertKind::RESOURCE));
        assert!(!entries[0].kinds.contains(AlertKind::FENCING));
    }

    #[test]
    fn unknown_alert_kind_is_rejected() {
        let mut config = Config {
            node_name: "node1".to_string(),
            ..Config::default()
        };
        config.alerts.push(AlertEntryConfig {
            id: "a1".to_string(),
            path: "/etc/alerts/a1.sh".to_string(),
            timeout_ms: default_alert_timeout_ms(),
            recipient: String::new(),
            kinds: vec!["bogus".to_string()],
            attribute_allowlist: Vec::new(),
            environment: std::collections::HashMap::new(),
            timestamp_format: default_timestamp_format(),
        });
        assert!(config.validate().is_err());
    }
}
