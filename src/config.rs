//! Agent configuration, loaded from TOML.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Result type for configuration loading.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Tunables for the deliberation loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    /// Weight of goal priority in an option's score.
    pub priority_weight: f64,
    /// Weight of plan cost in an option's score.
    pub cost_weight: f64,
    /// Heartbeat period of the daemon, in milliseconds.
    pub heartbeat_ms: u64,
    /// Slots compared when deciding whether a reported event matches a step.
    pub case_roles: Vec<String>,
    /// Proactive operation kinds run on every heartbeat, in order.
    pub proactivity: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            priority_weight: 1.0,
            cost_weight: 1.0,
            heartbeat_ms: 250,
            case_roles: [
                "AGENT",
                "THEME",
                "BENEFICIARY",
                "INSTRUMENT",
                "SOURCE",
                "DESTINATION",
                "LOCATION",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            proactivity: vec!["update-evergreens".into(), "process-agenda".into()],
        }
    }
}

impl AgentConfig {
    /// Parse and validate a config from TOML text. Missing keys take defaults.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io { source })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !self.priority_weight.is_finite() {
            return Err(ConfigError::InvalidValue {
                key: "priority_weight",
                message: format!("{} is not finite", self.priority_weight),
            });
        }
        if !self.cost_weight.is_finite() {
            return Err(ConfigError::InvalidValue {
                key: "cost_weight",
                message: format!("{} is not finite", self.cost_weight),
            });
        }
        if self.heartbeat_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "heartbeat_ms",
                message: "must be positive".into(),
            });
        }
        Ok(())
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_to_missing_keys() {
        let config = AgentConfig::from_toml_str("cost_weight = 2.0").unwrap();
        assert_eq!(config.cost_weight, 2.0);
        assert_eq!(config.priority_weight, 1.0);
        assert_eq!(config.heartbeat(), Duration::from_millis(250));
        assert_eq!(config.proactivity[0], "update-evergreens");
        assert!(config.case_roles.iter().any(|r| r == "THEME"));
    }

    #[test]
    fn zero_heartbeat_is_rejected() {
        let err = AgentConfig::from_toml_str("heartbeat_ms = 0").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "heartbeat_ms",
                ..
            }
        ));
    }

    #[test]
    fn non_finite_weight_is_rejected() {
        let config = AgentConfig {
            priority_weight: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_keys_are_parse_errors() {
        let err = AgentConfig::from_toml_str("heartbeat = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "priority_weight = 0.5\nheartbeat_ms = 10").unwrap();
        let config = AgentConfig::load(file.path()).unwrap();
        assert_eq!(config.priority_weight, 0.5);
        assert_eq!(config.heartbeat_ms, 10);

        let missing = file.path().with_extension("missing");
        assert!(matches!(
            AgentConfig::load(&missing),
            Err(ConfigError::Io { .. })
        ));
    }
}
