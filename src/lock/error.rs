use std::sync::PoisonError;
use std::time::Duration;

use thiserror::Error;

use super::DeadlockChain;

/// Error type for key lock operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// A bounded acquisition did not succeed within the requested duration.
    #[error("lock timeout after {0:?}")]
    Timeout(Duration),
    /// Waiting for the lock would close a cycle in the wait-for graph.
    #[error("deadlock detected: {0}")]
    Deadlock(DeadlockChain),
    /// The waiting context was interrupted before it was granted the lock.
    #[error("interrupted while waiting for lock")]
    Interrupted,
    /// `release` was called by a context that does not own the lock.
    #[error("lock released by a context that does not own it")]
    NotOwner,
    /// An internal mutex was poisoned (a thread panicked while holding it).
    #[error("lock poisoned: {0}")]
    Poisoned(String),
}

impl<T> From<PoisonError<T>> for LockError {
    fn from(e: PoisonError<T>) -> Self {
        LockError::Poisoned(e.to_string())
    }
}
