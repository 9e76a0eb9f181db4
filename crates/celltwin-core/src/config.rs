//! Twin and bus configuration
//!
//! Both sections deserialize with every field optional so a partial config
//! file falls back to the defaults below.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the twin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwinConfig {
    /// Seconds without events before the cell counts as blocked
    pub blocked_threshold: f64,

    /// How often the inactivity watchdog runs, in milliseconds
    pub watchdog_interval_ms: u64,
}

impl Default for TwinConfig {
    fn default() -> Self {
        Self {
            blocked_threshold: 5.0,
            watchdog_interval_ms: 1000,
        }
    }
}

impl TwinConfig {
    /// Check that the inactivity threshold is a finite, positive duration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.blocked_threshold.is_finite() && self.blocked_threshold > 0.0) {
            return Err(ConfigError::InvalidBlockedThreshold(self.blocked_threshold));
        }
        Ok(())
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms.max(1))
    }
}

/// What the bus does when a subscriber fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPolicy {
    /// Stop dispatching and surface the failure from `run()`
    #[default]
    FailFast,
    /// Log the failure and keep delivering to the remaining subscribers
    Isolate,
}

/// Configuration for the event bus
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub dispatch_policy: DispatchPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let cfg: TwinConfig = serde_json::from_str(r#"{"blocked_threshold": 2.5}"#).unwrap();
        assert_eq!(cfg.blocked_threshold, 2.5);
        assert_eq!(cfg.watchdog_interval(), Duration::from_secs(1));

        let bus: BusConfig = serde_json::from_str(r#"{"dispatch_policy": "isolate"}"#).unwrap();
        assert_eq!(bus.dispatch_policy, DispatchPolicy::Isolate);
        assert_eq!(BusConfig::default().dispatch_policy, DispatchPolicy::FailFast);
    }

    #[test]
    fn test_blocked_threshold_validation() {
        assert!(TwinConfig::default().validate().is_ok());

        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let cfg = TwinConfig {
                blocked_threshold: bad,
                ..TwinConfig::default()
            };
            assert!(
                matches!(cfg.validate(), Err(ConfigError::InvalidBlockedThreshold(_))),
                "{bad} accepted"
            );
        }
    }
}
