//! The public event family: one-time, resettable, and countdown events.
//!
//! These are distinct from [`crate::wait::Event`] (the internal rendezvous
//! cell every primitive enqueues into a wait queue) — each type here *uses*
//! one or more internal events per waiter, the way every other primitive
//! in this crate does, but presents its own state machine to callers.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use sync_core::{Instant, RuntimeAdapter};

use crate::wait::{Event as WaitEvent, WaitQueue};

/// A one-time event: monotonic PENDING→SET, broadcasting every waiter the
/// moment it is set. Never clearable.
pub struct OnceEvent {
    is_set: AtomicBool,
    queue: WaitQueue,
}

impl OnceEvent {
    pub fn new() -> Self {
        Self { is_set: AtomicBool::new(false), queue: WaitQueue::new() }
    }

    pub fn is_set(&self) -> bool {
        self.is_set.load(Ordering::Acquire)
    }

    /// Mark the event set and wake every current waiter. Idempotent.
    pub fn set(&self) {
        if self.is_set.swap(true, Ordering::AcqRel) {
            return;
        }
        self.queue.notify_all();
    }

    pub fn wait(&self, adapter: &dyn RuntimeAdapter) -> bool {
        self.wait_deadline(adapter, None)
    }

    pub fn wait_timeout(&self, adapter: &dyn RuntimeAdapter, timeout: Duration) -> bool {
        let deadline = Instant::checked_add(adapter.monotonic_now(), timeout)
            .unwrap_or_else(|| adapter.monotonic_now());
        self.wait_deadline(adapter, Some(deadline))
    }

    fn wait_deadline(&self, adapter: &dyn RuntimeAdapter, deadline: Option<Instant>) -> bool {
        if self.is_set() {
            return true;
        }
        let event = WaitEvent::new(adapter.create_waiter(), false);
        self.queue.append(event.clone());
        if self.is_set() {
            // Closed the race: `set` may have run (and drained the queue,
            // including this entry) between our check and our append.
            self.queue.cancel_and_remove(&event);
            return true;
        }
        event.wait(adapter, deadline)
    }
}

impl Default for OnceEvent {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OnceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnceEvent").field("is_set", &self.is_set()).finish()
    }
}

/// A resettable event: pairs a monotonically increasing generation counter
/// with an is-set flag, so a `set()` immediately followed by a `clear()`
/// still wakes every waiter that was parked before either call landed —
/// a waiter captures the generation in force at enqueue time, and is only
/// left parked if the event's generation hasn't advanced past it.
pub struct REvent {
    generation: AtomicU64,
    is_set: AtomicBool,
    queue: WaitQueue,
}

impl REvent {
    pub fn new() -> Self {
        Self { generation: AtomicU64::new(0), is_set: AtomicBool::new(false), queue: WaitQueue::new() }
    }

    pub fn is_set(&self) -> bool {
        self.is_set.load(Ordering::Acquire)
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// If not already set, bump the generation and mark set, then wake
    /// every waiter — including ones that will re-check after a
    /// concurrent `clear()`, since they captured a generation at or below
    /// this one.
    pub fn set(&self) {
        if self.is_set.swap(true, Ordering::AcqRel) {
            return;
        }
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.queue.notify_all();
    }

    pub fn clear(&self) {
        self.is_set.store(false, Ordering::Release);
    }

    pub fn wait(&self, adapter: &dyn RuntimeAdapter) -> bool {
        self.wait_deadline(adapter, None)
    }

    pub fn wait_timeout(&self, adapter: &dyn RuntimeAdapter, timeout: Duration) -> bool {
        let deadline = Instant::checked_add(adapter.monotonic_now(), timeout)
            .unwrap_or_else(|| adapter.monotonic_now());
        self.wait_deadline(adapter, Some(deadline))
    }

    fn wait_deadline(&self, adapter: &dyn RuntimeAdapter, deadline: Option<Instant>) -> bool {
        let captured = self.generation();
        if self.is_set() {
            return true;
        }
        let event = WaitEvent::new(adapter.create_waiter(), false);
        self.queue.append(event.clone());
        if self.is_set() && self.generation() > captured {
            self.queue.cancel_and_remove(&event);
            return true;
        }
        if event.wait(adapter, deadline) {
            return true;
        }
        self.queue.on_cancelled(&event) == crate::wait::RemoveOutcome::StolenSuccess
    }
}

impl Default for REvent {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for REvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("REvent")
            .field("is_set", &self.is_set())
            .field("generation", &self.generation())
            .finish()
    }
}

/// A countdown latch: `up`/`down` adjust an integer counter; waiters block
/// until it reaches zero, at which point everyone currently parked is
/// broadcast. `clear()` force-resets to zero and broadcasts, matching
/// `down` driving the count to zero.
pub struct CountdownEvent {
    value: AtomicU64,
    queue: WaitQueue,
}

impl CountdownEvent {
    pub fn new(initial: u64) -> Self {
        Self { value: AtomicU64::new(initial), queue: WaitQueue::new() }
    }

    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    pub fn is_set(&self) -> bool {
        self.value() == 0
    }

    pub fn up(&self, n: u64) {
        self.value.fetch_add(n, Ordering::AcqRel);
    }

    /// Decrement by `n`; if this call drives the value to exactly zero,
    /// broadcast every current waiter.
    pub fn down(&self, n: u64) {
        let prev = self.value.fetch_sub(n, Ordering::AcqRel);
        if prev == n {
            self.queue.notify_all();
        }
    }

    pub fn clear(&self) {
        self.value.store(0, Ordering::Release);
        self.queue.notify_all();
    }

    pub fn wait(&self, adapter: &dyn RuntimeAdapter) -> bool {
        self.wait_deadline(adapter, None)
    }

    pub fn wait_timeout(&self, adapter: &dyn RuntimeAdapter, timeout: Duration) -> bool {
        let deadline = Instant::checked_add(adapter.monotonic_now(), timeout)
            .unwrap_or_else(|| adapter.monotonic_now());
        self.wait_deadline(adapter, Some(deadline))
    }

    fn wait_deadline(&self, adapter: &dyn RuntimeAdapter, deadline: Option<Instant>) -> bool {
        if self.is_set() {
            return true;
        }
        let event = WaitEvent::new(adapter.create_waiter(), false);
        self.queue.append(event.clone());
        if self.is_set() {
            self.queue.cancel_and_remove(&event);
            return true;
        }
        if event.wait(adapter, deadline) {
            return true;
        }
        self.queue.on_cancelled(&event) == crate::wait::RemoveOutcome::StolenSuccess
    }
}

impl std::fmt::Debug for CountdownEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountdownEvent").field("value", &self.value()).finish()
    }
}
