use std::convert::Infallible;
use std::time::Duration;

use thiserror::Error;

use crate::lock::{DeadlockChain, LockError};

/// Error returned by [`EntityLocker`](crate::EntityLocker) entry points.
///
/// `E` is the error type of the protected work. Work that cannot fail uses
/// the default, [`Infallible`].
#[derive(Debug, Error)]
pub enum LockerError<E = Infallible> {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("lock timeout after {0:?}")]
    LockTimeout(Duration),
    #[error("deadlock detected: {0}")]
    Deadlock(DeadlockChain),
    #[error("interrupted while waiting for lock")]
    InterruptedWait,
    #[error("lock poisoned: {0}")]
    Poisoned(String),
    /// The protected work ran and returned an error, kept as-is.
    #[error("protected task failed: {0}")]
    TaskFailure(#[source] E),
}

impl<E> LockerError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, LockerError::LockTimeout(_))
    }

    pub fn is_deadlock(&self) -> bool {
        matches!(self, LockerError::Deadlock(_))
    }

    /// The work's own error, if that is what failed.
    pub fn task_error(&self) -> Option<&E> {
        match self {
            LockerError::TaskFailure(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_task_error(self) -> Option<E> {
        match self {
            LockerError::TaskFailure(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> From<LockError> for LockerError<E> {
    fn from(e: LockError) -> Self {
        match e {
            LockError::Timeout(d) => LockerError::LockTimeout(d),
            LockError::Deadlock(chain) => LockerError::Deadlock(chain),
            LockError::Interrupted => LockerError::InterruptedWait,
            LockError::Poisoned(msg) => LockerError::Poisoned(msg),
            // Only reachable if lock bookkeeping is corrupted.
            LockError::NotOwner => {
                LockerError::Poisoned("key lock released by a non-owner".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::fmt;

    #[derive(Debug, PartialEq)]
    struct Overdrawn(u32);

    impl fmt::Display for Overdrawn {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "overdrawn by {}", self.0)
        }
    }

    impl std::error::Error for Overdrawn {}

    #[test]
    fn task_failure_keeps_original_error() {
        let err: LockerError<Overdrawn> = LockerError::TaskFailure(Overdrawn(5));
        assert_eq!(err.task_error(), Some(&Overdrawn(5)));
        assert_eq!(err.to_string(), "protected task failed: overdrawn by 5");
        assert_eq!(err.source().unwrap().to_string(), "overdrawn by 5");
        assert_eq!(err.into_task_error(), Some(Overdrawn(5)));
    }

    #[test]
    fn lock_errors_map_to_locker_errors() {
        let timeout: LockerError = LockError::Timeout(Duration::from_millis(500)).into();
        assert!(timeout.is_timeout());
        assert!(matches!(timeout, LockerError::LockTimeout(d) if d == Duration::from_millis(500)));

        let interrupted: LockerError = LockError::Interrupted.into();
        assert!(matches!(interrupted, LockerError::InterruptedWait));
        assert!(interrupted.task_error().is_none());
    }
}
