//! Runtime-agnostic synchronization primitives, generic over the
//! [`sync_core::RuntimeAdapter`] a caller supplies at each blocking call.
//!
//! Every primitive in this crate is built from two pieces: an atomic fast
//! path that never touches a [`wait::WaitQueue`], and a slow path that
//! enqueues a [`wait::Event`] and parks through whichever adapter the
//! caller is running under. Nothing in here assumes a particular runtime;
//! a lock acquired from a plain OS thread can be released from code
//! running on a cooperative event loop, and vice versa.

mod barrier;
mod capacity_limiter;
mod condvar;
mod event;
mod guard;
mod mutex;
mod queue;
mod semaphore;
#[cfg(test)]
mod test_support;
mod wait;

pub use barrier::{Barrier, BrokenBarrierError, Latch, RBarrier};
pub use capacity_limiter::{CapacityLimiter, RCapacityLimiter};
pub use condvar::CondVar;
pub use event::{CountdownEvent, OnceEvent, REvent};
pub use guard::{Flag, ResourceGuard};
pub use mutex::{Lock, RLock};
pub use queue::{ComplexQueue, Ordering as QueueOrdering, SimpleQueue};
pub use semaphore::{BinarySemaphore, Semaphore};
pub use wait::{Event, RemoveOutcome, WaitQueue};
