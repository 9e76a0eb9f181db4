//! Application configuration loaded from YAML
//!
//! ```yaml
//! simulation:
//!   part_interarrival: [0.5, 1.5]
//!   sensor_delay: [0.1, 0.3]
//!   actuator_delay: [0.1, 0.2]
//!   ok_probability: 0.8
//! twin:
//!   blocked_threshold: 5.0
//! bus:
//!   dispatch_policy: fail_fast
//! api:
//!   bind: 127.0.0.1:8000
//! monitor:
//!   interval_ms: 2000
//! ```
//!
//! Every section and field is optional.

use celltwin_core::{BusConfig, TwinConfig};
use celltwin_sim::SimulationConfig;
use celltwin_supervisor::SupervisorConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub simulation: SimulationConfig,
    pub twin: TwinConfig,
    pub bus: BusConfig,
    pub api: ApiConfig,
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Address the HTTP server listens on
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Period of the snapshot log in `monitor` mode
    pub interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { interval_ms: 2000 }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

impl AppConfig {
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        // an empty document is an empty config, not an error
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_yaml(&text)?)
    }

    /// Supervisor settings, with the snapshot monitor on or off
    pub fn supervisor_config(&self, with_monitor: bool) -> SupervisorConfig {
        SupervisorConfig {
            twin: self.twin.clone(),
            bus: self.bus.clone(),
            simulation: self.simulation.clone(),
            monitor_interval: with_monitor.then(|| self.monitor.interval()),
        }
    }
}

/// Load `path`, falling back to defaults when it is missing or unreadable.
pub fn load_config(path: &Path) -> AppConfig {
    if !path.exists() {
        warn!(path = %path.display(), "config file not found, using defaults");
        return AppConfig::default();
    }
    match AppConfig::from_path(path) {
        Ok(config) => {
            info!(path = %path.display(), "loaded config");
            config
        }
        Err(err) => {
            warn!(
                path = %path.display(),
                error = %format!("{err:#}"),
                "failed to parse config file, using defaults"
            );
            AppConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use celltwin_core::DispatchPolicy;

    #[test]
    fn test_full_config() {
        let yaml = r"
simulation:
  part_interarrival: [1.0, 2.0]
  sensor_delay: [0.2, 0.4]
  actuator_delay: [0.0, 0.1]
  ok_probability: 0.5
  seed: 7
twin:
  blocked_threshold: 3.5
  watchdog_interval_ms: 250
bus:
  dispatch_policy: isolate
api:
  bind: 0.0.0.0:9000
monitor:
  interval_ms: 500
";
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.simulation.part_interarrival, (1.0, 2.0));
        assert_eq!(config.simulation.ok_probability, 0.5);
        assert_eq!(config.simulation.seed, Some(7));
        assert_eq!(config.twin.blocked_threshold, 3.5);
        assert_eq!(config.bus.dispatch_policy, DispatchPolicy::Isolate);
        assert_eq!(config.api.bind, "0.0.0.0:9000");

        let supervisor = config.supervisor_config(true);
        assert_eq!(supervisor.monitor_interval, Some(Duration::from_millis(500)));
        assert_eq!(supervisor.twin.watchdog_interval_ms, 250);
        assert!(config.supervisor_config(false).monitor_interval.is_none());
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = AppConfig::from_yaml("twin:\n  blocked_threshold: 1.0\n").unwrap();
        assert_eq!(config.twin.blocked_threshold, 1.0);
        assert_eq!(config.twin.watchdog_interval_ms, 1000);
        assert_eq!(config.simulation, SimulationConfig::default());
        assert_eq!(config.api, ApiConfig::default());
        assert_eq!(config.monitor.interval(), Duration::from_secs(2));

        assert_eq!(AppConfig::from_yaml("").unwrap(), AppConfig::default());
    }

    #[test]
    fn test_bad_input_falls_back_to_defaults() {
        assert!(AppConfig::from_yaml("twin: [not, a, map]").is_err());
        assert!(AppConfig::from_yaml("bus:\n  dispatch_policy: retry\n").is_err());

        let missing = Path::new("does/not/exist/config.yaml");
        assert_eq!(load_config(missing), AppConfig::default());
    }
}
