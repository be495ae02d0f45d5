//! Task identity.

use std::fmt;

/// Stable identity of a task for the lifetime of that task, as produced by
/// [`RuntimeAdapter::current_task_id`](crate::RuntimeAdapter::current_task_id).
///
/// `runtime` names the adapter family ("thread", "local", ...) so that two
/// adapters handing out overlapping `id` ranges can't collide; `id` is
/// whatever the adapter considers a stable per-task integer (an OS thread
/// id, a green-thread slot index, a task-local counter).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TaskId {
    pub runtime: &'static str,
    pub id: u64,
}

impl TaskId {
    pub const fn new(runtime: &'static str, id: u64) -> Self {
        Self { runtime, id }
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.runtime, self.id)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
