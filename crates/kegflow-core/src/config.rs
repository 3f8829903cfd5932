//! Flow configuration, loadable from YAML.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Settings shared by flows and the controller that drives them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Idle threshold for new flows, in ms; 0 disables idle detection
    pub max_idle_ms: u64,
    /// How often the idle sweeper runs, in ms
    pub sweep_interval_ms: u64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            max_idle_ms: 10_000,
            sweep_interval_ms: 1_000,
        }
    }
}

impl FlowConfig {
    /// Parse a YAML document; missing fields take their defaults
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read and parse a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Idle threshold as a duration
    pub fn max_idle(&self) -> Duration {
        Duration::from_millis(self.max_idle_ms)
    }

    /// Sweep interval as a duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}
