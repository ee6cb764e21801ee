use std::convert::Infallible;
use std::fmt;
use std::hash::Hash;
use std::time::Duration;

use crate::config::LockerConfig;
use crate::context::ContextId;
use crate::error::LockerError;
use crate::lock::{LockRegistry, WaitForGraph};
use crate::strategy::{Blocking, DeadlockPreventing, LockStrategy, TimeoutBounded};

/// Serializes work per entity key while letting different keys run in
/// parallel.
///
/// The locker only deals with keys, never with the entities themselves. At
/// most one thread runs protected work for a given key at a time; a thread
/// already inside protected work for a key may enter it again.
///
/// ## Example
///
/// ```
/// use entity_locker::EntityLocker;
///
/// let locker = EntityLocker::new();
/// let balance = locker
///     .lock_and_run(&"account-1", || 100 + 20)
///     .unwrap();
/// assert_eq!(balance, 120);
/// ```
pub struct EntityLocker<K: Eq + Hash> {
    registry: LockRegistry<K>,
    graph: Option<WaitForGraph<K>>,
    config: LockerConfig,
}

impl<K> EntityLocker<K>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    /// A locker whose unbounded waits simply block.
    pub fn new() -> Self {
        Self::with_config(LockerConfig::default())
    }

    /// A locker that fails with a deadlock error instead of waiting on a
    /// lock whose owner (transitively) waits on the caller.
    pub fn with_deadlock_prevention() -> Self {
        Self::with_config(LockerConfig::default().with_deadlock_prevention(true))
    }

    /// Build a locker from a validated configuration.
    pub fn from_config(config: LockerConfig) -> Result<Self, LockerError> {
        config.validate()?;
        Ok(Self::with_config(config))
    }

    fn with_config(config: LockerConfig) -> Self {
        EntityLocker {
            registry: LockRegistry::new(),
            graph: config.deadlock_prevention.then(WaitForGraph::new),
            config,
        }
    }

    pub fn config(&self) -> &LockerConfig {
        &self.config
    }

    /// Run `work` while holding the lock for `key`, waiting as long as it
    /// takes to get it.
    ///
    /// An `Err` from `work` is returned as [`LockerError::TaskFailure`].
    pub fn lock_and_execute<R, E, F>(&self, key: &K, work: F) -> Result<R, LockerError<E>>
    where
        F: FnOnce() -> Result<R, E>,
    {
        self.execute(key, None, work)
    }

    /// [`lock_and_execute`](Self::lock_and_execute) for work that cannot fail.
    pub fn lock_and_run<R, F>(&self, key: &K, work: F) -> Result<R, LockerError>
    where
        F: FnOnce() -> R,
    {
        self.execute(key, None, || Ok::<R, Infallible>(work()))
    }

    /// Run `work` while holding the lock for `key`, waiting at most
    /// `timeout` for it.
    ///
    /// If the wait expires `work` never runs and the call fails with
    /// [`LockerError::LockTimeout`].
    pub fn try_lock_and_execute<R, E, F>(
        &self,
        key: &K,
        timeout: Duration,
        work: F,
    ) -> Result<R, LockerError<E>>
    where
        F: FnOnce() -> Result<R, E>,
    {
        self.execute(key, Some(timeout), work)
    }

    /// [`try_lock_and_execute`](Self::try_lock_and_execute) for work that
    /// cannot fail.
    pub fn try_lock_and_run<R, F>(
        &self,
        key: &K,
        timeout: Duration,
        work: F,
    ) -> Result<R, LockerError>
    where
        F: FnOnce() -> R,
    {
        self.execute(key, Some(timeout), || Ok::<R, Infallible>(work()))
    }

    fn execute<R, E, F>(
        &self,
        key: &K,
        timeout: Option<Duration>,
        work: F,
    ) -> Result<R, LockerError<E>>
    where
        F: FnOnce() -> Result<R, E>,
    {
        let handle = self.registry.acquire_reference(key)?;
        let lock = handle.lock();

        let result = match (&self.graph, timeout) {
            (Some(graph), None) => {
                DeadlockPreventing::new(graph, self.config.probe_interval()).execute(lock, work)
            }
            (Some(graph), Some(timeout)) => {
                DeadlockPreventing::new(graph, self.config.probe_interval())
                    .with_timeout(timeout)
                    .execute(lock, work)
            }
            (None, None) => Blocking.execute(lock, work),
            (None, Some(timeout)) => TimeoutBounded::new(timeout).execute(lock, work),
        };

        // The key lock is already released; now give up the reference.
        drop(handle);
        result
    }

    /// Interrupt `context` if it is blocked waiting for any key.
    ///
    /// The interrupted call fails with [`LockerError::InterruptedWait`].
    /// Returns `false` if the context was not waiting.
    pub fn interrupt(&self, context: &ContextId) -> bool {
        self.registry.interrupt(context)
    }

    pub fn is_locked(&self, key: &K) -> bool {
        self.registry.is_locked(key)
    }

    /// Keys that currently have a live lock (held or awaited).
    pub fn registered_keys(&self) -> Vec<K> {
        self.registry.keys()
    }

    pub fn registry(&self) -> &LockRegistry<K> {
        &self.registry
    }
}

impl<K> Default for EntityLocker<K>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash> fmt::Debug for EntityLocker<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityLocker")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_work_result() {
        let locker = EntityLocker::new();
        assert_eq!(locker.lock_and_run(&"k", || "result").unwrap(), "result");
        assert!(locker.registered_keys().is_empty());
    }

    #[test]
    fn unit_work() {
        let locker = EntityLocker::new();
        let mut touched = false;
        locker.lock_and_run(&1u64, || touched = true).unwrap();
        assert!(touched);
    }

    #[test]
    fn task_failure_is_preserved() {
        #[derive(Debug, PartialEq)]
        enum Rejected {
            Stale(u32),
        }

        let locker = EntityLocker::new();
        let err = locker
            .lock_and_execute(&"k", || Err::<(), _>(Rejected::Stale(3)))
            .unwrap_err();
        assert_eq!(err.into_task_error(), Some(Rejected::Stale(3)));
        assert!(!locker.is_locked(&"k"));
        assert!(locker.registered_keys().is_empty());
    }

    #[test]
    fn nested_calls_on_same_key_reenter() {
        let locker = EntityLocker::new();
        let depth = locker
            .lock_and_run(&"k", || {
                locker
                    .lock_and_run(&"k", || locker.registry().references(&"k"))
                    .unwrap()
            })
            .unwrap();
        assert_eq!(depth, 2);
        assert!(locker.registered_keys().is_empty());
    }

    #[test]
    fn none_is_an_ordinary_key() {
        let locker: EntityLocker<Option<u32>> = EntityLocker::new();
        assert_eq!(locker.lock_and_run(&None, || 5).unwrap(), 5);
    }

    #[test]
    fn invalid_config_is_rejected_before_any_locking() {
        let config = LockerConfig::default().with_probe_interval(Duration::ZERO);
        let err = EntityLocker::<String>::from_config(config).unwrap_err();
        assert!(matches!(err, LockerError::InvalidArgument(_)));
    }

    #[test]
    fn deadlock_prevention_is_configurable() {
        let locker: EntityLocker<u8> = EntityLocker::with_deadlock_prevention();
        assert!(locker.config().deadlock_prevention);
        assert_eq!(locker.try_lock_and_run(&1, Duration::from_millis(10), || 7).unwrap(), 7);
    }
}
