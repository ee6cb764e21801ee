//! Per-key reentrant locking for storage and cache layers.
//!
//! [`EntityLocker`] serializes protected work by entity key: work on the same
//! key runs one thread at a time, work on different keys runs in parallel.
//! One lock exists per key while some thread holds or awaits it, and it is
//! retired when the last reference goes away.
//!
//! Waits can be unbounded, bounded by a timeout, or guarded by a wait-for
//! graph that turns a would-be deadlock into a [`LockerError::Deadlock`].

mod config;
mod context;
mod error;
mod locker;

pub mod lock;
pub mod strategy;

pub use config::{LockerConfig, DEFAULT_PROBE_INTERVAL};
pub use context::ContextId;
pub use error::LockerError;
pub use lock::{DeadlockChain, LockError, WaitEdge};
pub use locker::EntityLocker;
