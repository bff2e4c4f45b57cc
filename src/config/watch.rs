use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Watch worker behaviour
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WatchConfig {
    /// Upper bound of the initial snapshot read. Independent of the watch's
    /// own cancellation scope.
    #[serde(default = "default_snapshot_timeout")]
    pub snapshot_timeout_in_ms: u64,

    /// Deliver the initial snapshot through `Listener::observed` before
    /// streaming changes. When disabled the snapshot only anchors the start
    /// revision of the change stream.
    #[serde(default = "default_deliver_snapshot")]
    pub deliver_snapshot: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            snapshot_timeout_in_ms: default_snapshot_timeout(),
            deliver_snapshot: default_deliver_snapshot(),
        }
    }
}

impl WatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.snapshot_timeout_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "watch.snapshot_timeout_in_ms must be > 0".into(),
            )));
        }
        Ok(())
    }

    pub fn snapshot_timeout(&self) -> Duration {
        Duration::from_millis(self.snapshot_timeout_in_ms)
    }
}

fn default_snapshot_timeout() -> u64 {
    3000
}
fn default_deliver_snapshot() -> bool {
    true
}
