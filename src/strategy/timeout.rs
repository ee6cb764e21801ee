use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::LockStrategy;
use crate::lock::{KeyLock, LockError};

/// Waits at most `timeout`, then gives up with [`LockError::Timeout`].
#[derive(Debug, Clone, Copy)]
pub struct TimeoutBounded {
    timeout: Duration,
}

impl TimeoutBounded {
    pub fn new(timeout: Duration) -> Self {
        TimeoutBounded { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl<K> LockStrategy<K> for TimeoutBounded {
    fn acquire(&self, lock: &Arc<KeyLock<K>>) -> Result<(), LockError> {
        if lock.try_acquire(self.timeout)? {
            Ok(())
        } else {
            debug!(timeout = ?self.timeout, "key lock wait timed out");
            Err(LockError::Timeout(self.timeout))
        }
    }
}
