use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::trace;

use super::LockError;
use crate::context::ContextId;

#[derive(Default)]
struct Ownership {
    owner: Option<ContextId>,
    holds: usize,
    waiting: HashSet<ContextId>,
    interrupted: HashSet<ContextId>,
}

/// Reentrant lock scoped to one entity key.
///
/// Built from a plain `Mutex` + `Condvar` pair guarding the owner and hold
/// count, so the current owner can be inspected (the wait-for graph needs it).
/// The lock also carries the registry reference count that decides when it
/// is retired.
pub struct KeyLock<K> {
    key: K,
    state: Mutex<Ownership>,
    wake: Condvar,
    references: AtomicUsize,
}

impl<K> KeyLock<K> {
    pub fn new(key: K) -> Self {
        KeyLock {
            key,
            state: Mutex::new(Ownership::default()),
            wake: Condvar::new(),
            references: AtomicUsize::new(0),
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    /// Acquire the lock, blocking until it becomes available.
    ///
    /// Returns immediately if the calling context already owns the lock.
    pub fn acquire(&self) -> Result<(), LockError> {
        self.acquire_within(None).map(|_| ())
    }

    /// Try to acquire the lock, waiting at most `timeout`.
    ///
    /// Returns `Ok(false)` if the wait expired; the lock is then not held by
    /// the caller and must not be released.
    pub fn try_acquire(&self, timeout: Duration) -> Result<bool, LockError> {
        self.acquire_within(Some(timeout))
    }

    fn acquire_within(&self, timeout: Option<Duration>) -> Result<bool, LockError> {
        let me = ContextId::current();
        let mut state = self.state.lock()?;

        if state.owner.as_ref() == Some(&me) {
            state.holds += 1;
            trace!(holds = state.holds, "reentrant key lock acquisition");
            return Ok(true);
        }

        // An overflowing deadline is as good as no deadline.
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        state.waiting.insert(me.clone());

        let granted = loop {
            if state.interrupted.remove(&me) {
                state.waiting.remove(&me);
                if state.owner.is_none() {
                    // Pass on a wake-up this waiter may have consumed.
                    self.wake.notify_one();
                }
                return Err(LockError::Interrupted);
            }
            if state.owner.is_none() {
                break true;
            }
            match deadline {
                None => state = self.wake.wait(state)?,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break false;
                    }
                    state = self.wake.wait_timeout(state, deadline - now)?.0;
                }
            }
        };

        state.waiting.remove(&me);
        if granted {
            state.owner = Some(me);
            state.holds = 1;
        }
        Ok(granted)
    }

    /// Release one hold on the lock.
    ///
    /// The lock becomes free when the hold count drops to zero, and one
    /// waiter is woken.
    pub fn release(&self) -> Result<(), LockError> {
        let me = ContextId::current();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.owner.as_ref() != Some(&me) {
            return Err(LockError::NotOwner);
        }
        state.holds -= 1;
        if state.holds == 0 {
            state.owner = None;
            self.wake.notify_one();
        }
        Ok(())
    }

    /// Snapshot of the context currently holding the lock.
    pub fn owner(&self) -> Option<ContextId> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .owner
            .clone()
    }

    pub fn hold_count(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).holds
    }

    pub fn is_locked(&self) -> bool {
        self.owner().is_some()
    }

    pub fn is_held_by_current(&self) -> bool {
        self.owner().is_some_and(|owner| owner.is_current())
    }

    /// Wake `context` out of a blocked `acquire`/`try_acquire` on this lock
    /// with [`LockError::Interrupted`].
    ///
    /// Returns `false` if the context is not waiting here.
    pub fn interrupt(&self, context: &ContextId) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.waiting.contains(context) {
            return false;
        }
        state.interrupted.insert(context.clone());
        self.wake.notify_all();
        true
    }

    /// Number of registry references (holders and waiters) to this lock.
    pub fn references(&self) -> usize {
        self.references.load(Ordering::Acquire)
    }

    pub(crate) fn retain(&self) -> usize {
        self.references.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Drop one reference and return the remaining count.
    pub(crate) fn unretain(&self) -> usize {
        self.references.fetch_sub(1, Ordering::AcqRel) - 1
    }
}
