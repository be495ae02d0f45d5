//! The runtime adapter contract.
//!
//! `sync_engine`'s primitives never call into a thread-parking API, a
//! greenlet hub, or an event loop directly. They only ever go through this
//! trait, supplied by the caller at the top of every blocking call. This is
//! what lets the *same* `Mutex` be acquired from a thread and released from
//! a coroutine running on a different event loop: the engine never assumes
//! which adapter created any given waiter, it only ever calls `wake()` on
//! whichever one is stored in the queue.

use crate::task::TaskId;
use crate::time::Instant;
use std::fmt;
use std::time::Duration;

/// The outcome of [`Waiter::park`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParkOutcome {
    /// `wake()` was called (possibly before `park` was even entered).
    Woken,
    /// The deadline elapsed before `wake()` was called.
    TimedOut,
    /// The owning task was cancelled by its runtime while parked.
    Cancelled,
}

/// A one-shot rendezvous token tied to a specific runtime.
///
/// Exactly one side calls [`park`](Waiter::park), exactly one side calls
/// [`wake`](Waiter::wake); ordering between them is unconstrained — a
/// `wake` that arrives before `park` is entered must still be observed by
/// the subsequent `park` (latched wakeup), never lost.
pub trait Waiter: Send + Sync {
    /// Suspend the current task until `wake()` is called or `deadline`
    /// elapses. Must be called at most once per waiter.
    fn park(&self, deadline: Option<Instant>) -> ParkOutcome;

    /// Wake the parked side. Idempotent: only the first call has any
    /// effect, and it is safe to call this from any thread, at any time,
    /// including before `park` has been entered.
    fn wake(&self) -> bool;
}

/// Coarse scheduling family a [`RuntimeAdapter`] belongs to.
/// Used only to pick sensible defaults (checkpoint insertion, fairness
/// mode); the engine never branches on it for correctness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeClass {
    /// Preemptive, shared-memory, possibly multi-core.
    Threaded,
    /// Cooperative, single-threaded, explicit yield points (greenlet- or
    /// event-loop-style). The engine treats green and async runtimes
    /// identically.
    Cooperative,
}

/// Everything the engine needs from a host runtime.
///
/// Implementations must be cheap to pass around as `&dyn RuntimeAdapter`:
/// every method here is object-safe on purpose, because a single waiter
/// queue may hold waiters created by several different adapter instances
/// (possibly even several different adapter *types*) at once.
pub trait RuntimeAdapter: Send + Sync + fmt::Debug {
    /// Stable identity of the task currently running on this adapter.
    fn current_task_id(&self) -> TaskId;

    /// This adapter's monotonic clock, in nanoseconds since an
    /// adapter-defined epoch.
    fn monotonic_now(&self) -> Instant;

    /// Block the current task for `duration`, yielding to the runtime.
    fn sleep(&self, duration: Duration);

    /// Block the current task until `deadline` (an `Instant` produced by
    /// this same adapter).
    fn sleep_until(&self, deadline: Instant);

    /// Suspend the current task indefinitely (used by zero-party latches).
    fn sleep_forever(&self) -> !;

    /// Produce a fresh, unparked [`Waiter`] token for the current task.
    fn create_waiter(&self) -> Box<dyn Waiter>;

    /// Run `f` with external cancellation of the current task suppressed;
    /// re-raise any suppressed cancellation once `f` returns.
    fn shield(&self, f: &mut dyn FnMut());

    /// True if this adapter is the one driving the calling thread right
    /// now. Used by callers performing runtime detection; the engine
    /// itself never calls this (detection is out of scope).
    fn is_running_in_current_thread(&self) -> bool;

    /// The scheduling family this adapter belongs to.
    fn class(&self) -> RuntimeClass;
}
