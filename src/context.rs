use std::fmt;
use std::hash::{Hash, Hasher};
use std::thread::{self, Thread, ThreadId};

/// Identity of the execution context (OS thread) that owns or awaits a key lock.
///
/// Two handles are equal when they refer to the same thread. The thread
/// handle is kept so diagnostics can print its name.
#[derive(Clone)]
pub struct ContextId {
    thread: Thread,
}

impl ContextId {
    /// Identity of the calling thread.
    pub fn current() -> Self {
        ContextId {
            thread: thread::current(),
        }
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread.id()
    }

    pub fn name(&self) -> Option<&str> {
        self.thread.name()
    }

    pub fn is_current(&self) -> bool {
        self.thread.id() == thread::current().id()
    }
}

impl PartialEq for ContextId {
    fn eq(&self, other: &Self) -> bool {
        self.thread.id() == other.thread.id()
    }
}

impl Eq for ContextId {}

impl Hash for ContextId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.thread.id().hash(state);
    }
}

impl fmt::Debug for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextId")
            .field("id", &self.thread.id())
            .field("name", &self.thread.name())
            .finish()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.thread.name() {
            Some(name) => write!(f, "thread '{}'", name),
            None => write!(f, "thread {:?}", self.thread.id()),
        }
    }
}
