//! Agent configuration.
//!
//! Loaded from a JSON file; every field has a default, unknown fields are
//! rejected. Command-line flags override file values in `main`.

use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use serde::{Deserialize, Serialize};
use sonic_orch_common::OrchError;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = OrchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(OrchError::InvalidConfig(format!(
                "unknown log format '{other}' (expected text or json)"
            ))),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => f.write_str("text"),
            LogFormat::Json => f.write_str("json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    /// Program routes through the standalone RIB backend (best effort per
    /// prefix) instead of the legacy one (all or nothing).
    pub standalone_rib: bool,
    /// Adopt objects left in hardware by a previous instance.
    pub warm_boot: bool,
    /// Default `EnvFilter` directive.
    pub log_level: String,
    pub log_format: LogFormat,
    /// Capacity of the control-plane and link-event channels.
    pub channel_capacity: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            standalone_rib: false,
            warm_boot: false,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            channel_capacity: 1024,
        }
    }
}

impl AgentConfig {
    /// Reads and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, OrchError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            OrchError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, OrchError> {
        let config: AgentConfig = serde_json::from_str(text)
            .map_err(|e| OrchError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Audit record for putting this configuration into effect.
    pub fn audit_record(&self) -> AuditRecord {
        AuditRecord::new(AuditCategory::ConfigurationChange, "AgentConfig", "apply_config")
            .with_outcome(AuditOutcome::Success)
            .with_details(serde_json::to_value(self).unwrap_or_default())
    }

    pub fn validate(&self) -> Result<(), OrchError> {
        if self.channel_capacity == 0 {
            return Err(OrchError::InvalidConfig(
                "channel_capacity must be at least 1".to_string(),
            ));
        }
        if self.log_level.trim().is_empty() {
            return Err(OrchError::InvalidConfig("log_level is empty".to_string()));
        }
        Ok(())
    }
}
