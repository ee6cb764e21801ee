use std::sync::Arc;

use super::LockStrategy;
use crate::lock::{KeyLock, LockError};

/// Waits for the lock without bound.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blocking;

impl<K> LockStrategy<K> for Blocking {
    fn acquire(&self, lock: &Arc<KeyLock<K>>) -> Result<(), LockError> {
        lock.acquire()
    }
}
