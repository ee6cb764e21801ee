mod error;
mod graph;
mod key_lock;
mod registry;

pub use error::LockError;
pub use graph::{CycleCheck, DeadlockChain, WaitEdge, WaitForGraph};
pub use key_lock::KeyLock;
pub use registry::{LockRef, LockRegistry};
