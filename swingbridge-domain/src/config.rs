use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::peripheral::NameMatcher;
use crate::profile::DeviceModel;

pub const MLM2PRO_NAME_PREFIXES: [&str; 2] = ["MLM2-", "BlueZ "];

/// Shortest heartbeat tick a session will run with.
pub const MIN_HEARTBEAT_TICK: Duration = Duration::from_millis(100);

/// Which launch monitor to look for and how to recognise it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSelection {
    pub model: DeviceModel,
    /// Exact advertised name, required for the R10 and optional for the
    /// MLM2PRO (which falls back to its name prefixes).
    #[serde(default)]
    pub name: Option<String>,
}

impl DeviceSelection {
    pub fn mlm2pro() -> Self {
        Self {
            model: DeviceModel::Mlm2Pro,
            name: None,
        }
    }

    pub fn r10(name: impl Into<String>) -> Self {
        Self {
            model: DeviceModel::R10,
            name: Some(name.into()),
        }
    }

    pub fn matcher(&self) -> NameMatcher {
        match (&self.name, self.model) {
            (Some(name), _) => NameMatcher::Exact(name.clone()),
            (None, DeviceModel::Mlm2Pro) => {
                NameMatcher::Prefixes(MLM2PRO_NAME_PREFIXES.iter().map(|p| p.to_string()).collect())
            }
            // an R10 without a configured name matches nothing
            (None, DeviceModel::R10) => NameMatcher::Prefixes(Vec::new()),
        }
    }
}

/// Timing and retry policy of a device session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub scan_timeout_secs: u64,
    pub subscribe_attempts: u32,
    pub subscribe_backoff_ms: u64,
    pub heartbeat_tick_ms: u64,
    pub heartbeat_deadline_secs: u64,
    pub max_missed_heartbeats: u32,
    /// Time allowed between the first auth/handshake write and `Ready`.
    pub bring_up_timeout_secs: u64,
    pub environment: ShotEnvironment,
}

impl Default for SessionConfig {
    fn default() -> SessionConfig {
        SessionConfig {
            scan_timeout_secs: 40,
            subscribe_attempts: 3,
            subscribe_backoff_ms: 1000,
            heartbeat_tick_ms: 2000,
            heartbeat_deadline_secs: 20,
            max_missed_heartbeats: 3,
            bring_up_timeout_secs: 10,
            environment: ShotEnvironment::default(),
        }
    }
}

impl SessionConfig {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    pub fn subscribe_backoff(&self) -> Duration {
        Duration::from_millis(self.subscribe_backoff_ms)
    }

    pub fn heartbeat_tick(&self) -> Duration {
        Duration::from_millis(self.heartbeat_tick_ms).max(MIN_HEARTBEAT_TICK)
    }

    pub fn heartbeat_deadline(&self) -> Duration {
        Duration::from_secs(self.heartbeat_deadline_secs)
    }

    pub fn bring_up_timeout(&self) -> Duration {
        Duration::from_secs(self.bring_up_timeout_secs)
    }

    /// Rejects settings a session cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("scan_timeout_secs", self.scan_timeout_secs),
            ("subscribe_attempts", u64::from(self.subscribe_attempts)),
            ("heartbeat_tick_ms", self.heartbeat_tick_ms),
            ("heartbeat_deadline_secs", self.heartbeat_deadline_secs),
            ("max_missed_heartbeats", u64::from(self.max_missed_heartbeats)),
            ("bring_up_timeout_secs", self.bring_up_timeout_secs),
        ];
        match required.iter().find(|(_, value)| *value == 0) {
            Some((name, _)) => Err(ConfigError::Zero(*name)),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Conditions sent to the device so its ball flight model matches the range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShotEnvironment {
    pub altitude_m: i32,
    pub temperature_c: i32,
    pub humidity: f32,
    pub air_density: f32,
    pub tee_range_m: f32,
}

impl Default for ShotEnvironment {
    fn default() -> ShotEnvironment {
        ShotEnvironment {
            altitude_m: 0,
            temperature_c: 20,
            humidity: 0.5,
            air_density: 1.225,
            tee_range_m: 2.13,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn partial_config_uses_defaults() {
        let config: SessionConfig = serde_json::from_str(r#"{"scan_timeout_secs": 5}"#).unwrap();
        assert_eq!(config.scan_timeout(), Duration::from_secs(5));
        assert_eq!(config.subscribe_attempts, 3);
        assert_eq!(config.subscribe_backoff(), Duration::from_secs(1));
        assert_eq!(config.heartbeat_tick(), Duration::from_secs(2));
        assert_eq!(config.environment, ShotEnvironment::default());
    }

    #[test]
    fn zero_settings_are_rejected() {
        assert_eq!(SessionConfig::default().validate(), Ok(()));
        let config: SessionConfig = serde_json::from_str(r#"{"heartbeat_tick_ms": 0}"#).unwrap();
        assert_eq!(config.validate(), Err(ConfigError::Zero("heartbeat_tick_ms")));
        assert_eq!(config.heartbeat_tick(), MIN_HEARTBEAT_TICK);
        let config = SessionConfig {
            subscribe_attempts: 0,
            ..SessionConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::Zero("subscribe_attempts")));
    }

    #[test]
    fn selection_matchers() {
        assert!(DeviceSelection::mlm2pro().matcher().matches("MLM2-00042"));
        assert!(DeviceSelection::r10("Approach R10").matcher().matches("Approach R10"));
        let unnamed = DeviceSelection {
            model: DeviceModel::R10,
            name: None,
        };
        assert!(!unnamed.matcher().matches("Approach R10"));
    }

    #[test]
    fn selection_from_json() {
        let selection: DeviceSelection =
            serde_json::from_str(r#"{"model": "R10", "name": "Approach R10"}"#).unwrap();
        assert_eq!(selection, DeviceSelection::r10("Approach R10"));
    }
}
