//! Locker configuration.
//!
//! ```json
//! { "deadlock_prevention": true, "probe_interval_ms": 250 }
//! ```
//!
//! Both fields are optional; missing fields take their defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LockerError;

/// Default time a deadlock-preventing acquisition spins on the lock before
/// it consults the wait-for graph.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LockerConfig {
    /// Check the wait-for graph before blocking and fail with a deadlock
    /// error instead of waiting forever.
    pub deadlock_prevention: bool,
    pub probe_interval_ms: u64,
}

impl Default for LockerConfig {
    fn default() -> Self {
        LockerConfig {
            deadlock_prevention: false,
            probe_interval_ms: DEFAULT_PROBE_INTERVAL.as_millis() as u64,
        }
    }
}

impl LockerConfig {
    pub fn from_json(json: &str) -> Result<Self, LockerError> {
        let config: LockerConfig = serde_json::from_str(json)
            .map_err(|e| LockerError::InvalidArgument(format!("locker config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_deadlock_prevention(mut self, enabled: bool) -> Self {
        self.deadlock_prevention = enabled;
        self
    }

    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn validate(&self) -> Result<(), LockerError> {
        if self.probe_interval_ms == 0 {
            return Err(LockerError::InvalidArgument(
                "probe_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
