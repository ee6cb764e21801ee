use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use super::{KeyLock, LockError};
use crate::context::ContextId;

/// One step of a wait-for chain: `waiter` is blocked on the lock for `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitEdge {
    pub waiter: ContextId,
    pub key: String,
}

impl WaitEdge {
    fn new<K: fmt::Debug>(waiter: ContextId, key: &K) -> Self {
        WaitEdge {
            waiter,
            key: format!("{:?}", key),
        }
    }
}

/// A closed cycle of contexts each waiting on a lock held by the next one.
///
/// The lock wanted by the last edge is held by the waiter of the first edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadlockChain {
    edges: Vec<WaitEdge>,
}

impl DeadlockChain {
    pub fn edges(&self) -> &[WaitEdge] {
        &self.edges
    }

    /// Number of contexts taking part in the cycle.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn contexts(&self) -> impl Iterator<Item = &ContextId> {
        self.edges.iter().map(|edge| &edge.waiter)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.edges.iter().map(|edge| edge.key.as_str())
    }
}

impl fmt::Display for DeadlockChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(first) = self.edges.first() else {
            return write!(f, "empty wait-for chain");
        };
        write!(f, "{} wants {}", first.waiter, first.key)?;
        for edge in &self.edges[1..] {
            write!(f, " held by {}, which wants {}", edge.waiter, edge.key)?;
        }
        write!(f, " held by {}", first.waiter)
    }
}

/// Outcome of a wait-for graph check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleCheck {
    NoCycle,
    Cycle(DeadlockChain),
}

/// Table of the lock each blocked context is waiting for.
///
/// All checks run under one mutex, so the chain being walked cannot change
/// mid-walk.
pub struct WaitForGraph<K> {
    desired: Mutex<HashMap<ContextId, Arc<KeyLock<K>>>>,
}

impl<K> WaitForGraph<K> {
    pub fn new() -> Self {
        WaitForGraph {
            desired: Mutex::new(HashMap::new()),
        }
    }

    /// Record that `waiter` wants `lock`, then follow the chain of owners
    /// and desired locks to see whether it leads back to `waiter`.
    ///
    /// The entry stays registered on both outcomes; callers remove it with
    /// [`unregister`](Self::unregister).
    pub fn check_and_register(
        &self,
        waiter: &ContextId,
        lock: &Arc<KeyLock<K>>,
    ) -> Result<CycleCheck, LockError>
    where
        K: fmt::Debug,
    {
        let mut desired = self.desired.lock()?;
        desired.insert(waiter.clone(), Arc::clone(lock));

        // Released in the meantime: the caller simply retries.
        let Some(mut current) = lock.owner() else {
            return Ok(CycleCheck::NoCycle);
        };

        let mut edges = vec![WaitEdge::new(waiter.clone(), lock.key())];
        let mut visited = HashSet::new();

        loop {
            // A cycle that does not pass through `waiter` is not ours to break.
            if !visited.insert(current.clone()) {
                return Ok(CycleCheck::NoCycle);
            }
            let Some(next) = desired.get(&current) else {
                return Ok(CycleCheck::NoCycle);
            };
            let next_owner = match next.owner() {
                Some(owner) if owner != current => owner,
                _ => return Ok(CycleCheck::NoCycle),
            };
            edges.push(WaitEdge::new(current, next.key()));
            if next_owner == *waiter {
                debug!(length = edges.len(), "wait-for cycle found");
                return Ok(CycleCheck::Cycle(DeadlockChain { edges }));
            }
            current = next_owner;
        }
    }

    pub fn unregister(&self, waiter: &ContextId) {
        self.desired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(waiter);
    }

    pub fn is_waiting(&self, waiter: &ContextId) -> bool {
        self.desired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(waiter)
    }

    /// Number of contexts currently registered as waiting.
    pub fn len(&self) -> usize {
        self.desired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K> Default for WaitForGraph<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> fmt::Debug for WaitForGraph<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitForGraph")
            .field("waiting", &self.len())
            .finish()
    }
}
