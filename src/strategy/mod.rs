//! Acquisition policies that wrap protected work.
//!
//! Every strategy runs the work exactly once, between a successful
//! acquisition and a release that happens on every exit path (including
//! unwinding). They differ only in how they acquire.

mod blocking;
mod deadlock;
mod timeout;

use std::sync::Arc;

use tracing::error;

use crate::error::LockerError;
use crate::lock::{KeyLock, LockError};

pub use blocking::Blocking;
pub use deadlock::DeadlockPreventing;
pub use timeout::TimeoutBounded;

pub trait LockStrategy<K> {
    /// Acquire `lock` for the calling context.
    ///
    /// On error the lock is not held and must not be released.
    fn acquire(&self, lock: &Arc<KeyLock<K>>) -> Result<(), LockError>;

    /// Acquire `lock`, run `work`, release.
    ///
    /// Work's own error comes back as [`LockerError::TaskFailure`].
    fn execute<R, E, F>(&self, lock: &Arc<KeyLock<K>>, work: F) -> Result<R, LockerError<E>>
    where
        F: FnOnce() -> Result<R, E>,
    {
        self.acquire(lock)?;
        let _hold = HoldGuard { lock };
        work().map_err(LockerError::TaskFailure)
    }
}

/// Releases one hold on drop.
struct HoldGuard<'a, K> {
    lock: &'a KeyLock<K>,
}

impl<K> Drop for HoldGuard<'_, K> {
    fn drop(&mut self) {
        if let Err(e) = self.lock.release() {
            error!(error = %e, "failed to release key lock");
        }
    }
}
