use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::ops::Deref;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use super::{KeyLock, LockError};
use crate::context::ContextId;

/// Map of live key locks.
///
/// Locks are created on the first reference to a key and retired when the
/// last reference is released. The read side of the map lock is the fast
/// path for keys that already have a lock; creation and retirement go
/// through the write side.
pub struct LockRegistry<K: Eq + Hash> {
    locks: RwLock<HashMap<K, Arc<KeyLock<K>>>>,
}

impl<K: Eq + Hash + Clone> LockRegistry<K> {
    pub fn new() -> Self {
        LockRegistry {
            locks: RwLock::new(HashMap::new()),
        }
    }

    /// Get (or create) the lock for `key` and take a reference to it.
    ///
    /// The reference is released when the returned handle is dropped.
    pub fn acquire_reference(&self, key: &K) -> Result<LockRef<'_, K>, LockError> {
        {
            let locks = self.locks.read()?;
            if let Some(lock) = locks.get(key) {
                // Retirement needs the write side, so the entry cannot vanish
                // while we hold the read side, even if its count is zero.
                lock.retain();
                return Ok(LockRef {
                    registry: self,
                    lock: Arc::clone(lock),
                });
            }
        }

        let mut locks = self.locks.write()?;
        let lock = locks.entry(key.clone()).or_insert_with(|| {
            debug!("creating key lock");
            Arc::new(KeyLock::new(key.clone()))
        });
        lock.retain();
        Ok(LockRef {
            registry: self,
            lock: Arc::clone(lock),
        })
    }

    fn release_reference(&self, lock: &Arc<KeyLock<K>>) {
        if lock.unretain() > 0 {
            return;
        }

        let mut locks = self.locks.write().unwrap_or_else(PoisonError::into_inner);
        // Someone may have taken a new reference since the decrement, or the
        // entry may already have been retired and replaced.
        let still_ours = locks
            .get(lock.key())
            .is_some_and(|current| Arc::ptr_eq(current, lock));
        if still_ours && lock.references() == 0 {
            locks.remove(lock.key());
            debug!("retired key lock");
        }
    }

    /// Number of keys that currently have a lock.
    pub fn len(&self) -> usize {
        self.locks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &K) -> bool {
        self.locks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Reference count of the lock for `key`, or zero if it has none.
    pub fn references(&self, key: &K) -> usize {
        self.locks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map_or(0, |lock| lock.references())
    }

    /// Whether the lock for `key` is currently held by some context.
    pub fn is_locked(&self, key: &K) -> bool {
        self.locks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .is_some_and(|lock| lock.is_locked())
    }

    pub fn keys(&self) -> Vec<K> {
        self.locks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Interrupt `context` if it is blocked on any registered lock.
    pub fn interrupt(&self, context: &ContextId) -> bool {
        let locks: Vec<Arc<KeyLock<K>>> = self
            .locks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        locks
            .iter()
            .fold(false, |found, lock| lock.interrupt(context) || found)
    }
}

impl<K: Eq + Hash + Clone> Default for LockRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash> fmt::Debug for LockRegistry<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.locks.read().map(|locks| locks.len()).unwrap_or(0);
        f.debug_struct("LockRegistry").field("len", &len).finish()
    }
}

/// A counted reference to a registered key lock.
///
/// Dropping the handle releases the reference exactly once.
pub struct LockRef<'r, K: Eq + Hash + Clone> {
    registry: &'r LockRegistry<K>,
    lock: Arc<KeyLock<K>>,
}

impl<K: Eq + Hash + Clone> LockRef<'_, K> {
    pub fn lock(&self) -> &Arc<KeyLock<K>> {
        &self.lock
    }
}

impl<K: Eq + Hash + Clone> Deref for LockRef<'_, K> {
    type Target = KeyLock<K>;

    fn deref(&self) -> &KeyLock<K> {
        &self.lock
    }
}

impl<K: Eq + Hash + Clone> Drop for LockRef<'_, K> {
    fn drop(&mut self) {
        self.registry.release_reference(&self.lock);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn same_key_returns_same_lock() {
        let registry = LockRegistry::new();
        let a = registry.acquire_reference(&"entity-1").unwrap();
        let b = registry.acquire_reference(&"entity-1").unwrap();
        assert!(Arc::ptr_eq(a.lock(), b.lock()));
        assert_eq!(registry.references(&"entity-1"), 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn different_keys_return_different_locks() {
        let registry = LockRegistry::new();
        let a = registry.acquire_reference(&"entity-1").unwrap();
        let b = registry.acquire_reference(&"entity-2").unwrap();
        assert!(!Arc::ptr_eq(a.lock(), b.lock()));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn last_release_retires_entry() {
        let registry = LockRegistry::new();
        let a = registry.acquire_reference(&7u32).unwrap();
        let b = registry.acquire_reference(&7u32).unwrap();

        drop(a);
        assert!(registry.contains(&7));
        assert_eq!(registry.references(&7), 1);

        drop(b);
        assert!(!registry.contains(&7));
        assert_eq!(registry.references(&7), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn retired_key_gets_fresh_lock() {
        let registry = LockRegistry::new();
        let first = registry.acquire_reference(&"k").unwrap();
        let first_lock = Arc::clone(first.lock());
        drop(first);

        let second = registry.acquire_reference(&"k").unwrap();
        assert!(!Arc::ptr_eq(&first_lock, second.lock()));
        assert_eq!(second.references(), 1);
    }

    #[test]
    fn handle_derefs_to_functional_lock() {
        let registry = LockRegistry::new();
        let handle = registry.acquire_reference(&"k").unwrap();
        handle.acquire().unwrap();
        assert!(registry.is_locked(&"k"));
        handle.release().unwrap();
        assert!(!registry.is_locked(&"k"));
    }

    #[test]
    fn concurrent_churn_leaves_no_entries() {
        let registry = LockRegistry::new();
        let threads = 8;
        let barrier = Barrier::new(threads);

        thread::scope(|s| {
            for _ in 0..threads {
                s.spawn(|| {
                    barrier.wait();
                    for i in 0..2_000u32 {
                        let handle = registry.acquire_reference(&(i % 3)).unwrap();
                        assert!(handle.references() >= 1);
                        handle.acquire().unwrap();
                        handle.release().unwrap();
                    }
                });
            }
        });

        assert!(registry.is_empty());
    }

    #[test]
    fn concurrent_holders_share_one_instance() {
        let registry = LockRegistry::new();
        let threads = 6;
        let barrier = Barrier::new(threads);

        let locks: Vec<Arc<KeyLock<&str>>> = thread::scope(|s| {
            let handles: Vec<_> = (0..threads)
                .map(|_| {
                    s.spawn(|| {
                        let handle = registry.acquire_reference(&"shared").unwrap();
                        let lock = Arc::clone(handle.lock());
                        // Keep every reference alive until all threads have one.
                        barrier.wait();
                        lock
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(locks.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert!(registry.is_empty());
    }
}
