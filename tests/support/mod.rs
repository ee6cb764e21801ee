#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use entity_locker::{EntityLocker, LockerConfig};

pub const PROBE: Duration = Duration::from_millis(50);

/// Locker with deadlock prevention and a short probe, to keep tests quick.
pub fn deadlock_locker() -> EntityLocker<&'static str> {
    EntityLocker::from_config(
        LockerConfig::default()
            .with_deadlock_prevention(true)
            .with_probe_interval(PROBE),
    )
    .unwrap()
}

/// Two threads were inside protected work at the same time.
#[derive(Debug, PartialEq)]
pub struct MultipleAccess;

/// Shared flag that detects overlapping protected sections.
#[derive(Default)]
pub struct SingleAccess {
    running: AtomicBool,
    entered: AtomicUsize,
}

impl SingleAccess {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the section as occupied for `hold`, failing if it already was.
    pub fn enter(&self, hold: Duration) -> Result<(), MultipleAccess> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(MultipleAccess);
        }
        self.entered.fetch_add(1, Ordering::SeqCst);
        thread::sleep(hold);
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }
}

/// Tracks how many sections run at once and the highest value seen.
#[derive(Default)]
pub struct Concurrency {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Concurrency {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_for(&self, hold: Duration) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        thread::sleep(hold);
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}
