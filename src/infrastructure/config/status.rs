//! Status file configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct StatusConfig {
    /// Where the JSON status report is written.
    #[serde(default = "default_path")]
    pub path: PathBuf,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_path() -> PathBuf {
    PathBuf::from("status.json")
}

fn default_interval_secs() -> u64 {
    10
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            interval_secs: default_interval_secs(),
        }
    }
}

impl StatusConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}
