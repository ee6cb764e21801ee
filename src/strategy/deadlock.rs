use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::LockStrategy;
use crate::context::ContextId;
use crate::lock::{CycleCheck, KeyLock, LockError, WaitForGraph};

/// Probes the lock briefly, and if it is busy checks the wait-for graph
/// before committing to a long wait.
///
/// If waiting would close a cycle the acquisition fails at once with
/// [`LockError::Deadlock`]. Otherwise the context waits, without bound or
/// for the rest of `timeout` when one is set.
pub struct DeadlockPreventing<'g, K> {
    graph: &'g WaitForGraph<K>,
    probe_interval: Duration,
    timeout: Option<Duration>,
}

impl<'g, K> DeadlockPreventing<'g, K> {
    pub fn new(graph: &'g WaitForGraph<K>, probe_interval: Duration) -> Self {
        DeadlockPreventing {
            graph,
            probe_interval,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Removes the waiter's graph entry on every exit path.
struct Registration<'a, K> {
    graph: &'a WaitForGraph<K>,
    waiter: &'a ContextId,
}

impl<K> Drop for Registration<'_, K> {
    fn drop(&mut self) {
        self.graph.unregister(self.waiter);
    }
}

impl<K: fmt::Debug> LockStrategy<K> for DeadlockPreventing<'_, K> {
    fn acquire(&self, lock: &Arc<KeyLock<K>>) -> Result<(), LockError> {
        let started = Instant::now();
        let probe = self
            .timeout
            .map_or(self.probe_interval, |t| t.min(self.probe_interval));
        if lock.try_acquire(probe)? {
            return Ok(());
        }
        debug!(key = ?lock.key(), ?probe, "key lock busy, checking wait-for graph");

        let me = ContextId::current();
        let _registration = Registration {
            graph: self.graph,
            waiter: &me,
        };
        if let CycleCheck::Cycle(chain) = self.graph.check_and_register(&me, lock)? {
            warn!(%chain, "deadlock detected, abandoning lock acquisition");
            return Err(LockError::Deadlock(chain));
        }

        match self.timeout {
            None => lock.acquire(),
            Some(timeout) => {
                let remaining = timeout.saturating_sub(started.elapsed());
                if lock.try_acquire(remaining)? {
                    Ok(())
                } else {
                    debug!(?timeout, "key lock wait timed out");
                    Err(LockError::Timeout(timeout))
                }
            }
        }
    }
}
