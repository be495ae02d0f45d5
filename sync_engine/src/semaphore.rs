//! Counting, bounded, and binary semaphores.
//!
//! Each semaphore is a `value` cell plus a [`WaitQueue`]: the fast path is
//! a plain atomic CAS on `value`, and only a caller that finds it
//! insufficient falls through to enqueuing on the slow path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use sync_core::{AcquireError, Instant, ProgrammerError, ReleaseError, RuntimeAdapter, StateError};

use crate::wait::{Event, WaitQueue};

/// A counting semaphore: `0 <= value <= max_value`. Constructed unbounded
/// via [`Semaphore::new`] or with an explicit cap via
/// [`Semaphore::bounded`], which rejects releases that would overflow it
/// Bounded variants reject releases that would overflow the cap.
pub struct Semaphore {
    value: AtomicU64,
    max_value: u64,
    wait_queue: WaitQueue,
}

impl Semaphore {
    pub fn new(initial: u64) -> Self {
        Self { value: AtomicU64::new(initial), max_value: u64::MAX, wait_queue: WaitQueue::new() }
    }

    pub fn bounded(initial: u64, max_value: u64) -> Self {
        debug_assert!(initial <= max_value, "initial value must not exceed max_value");
        Self { value: AtomicU64::new(initial), max_value, wait_queue: WaitQueue::new() }
    }

    /// A binary semaphore is logically a bounded semaphore with
    /// `max_value = 1`, but [`BinarySemaphore`] below keeps its own
    /// bool-sized representation and exposes the raw park/unpark hooks the
    /// condition variable needs.
    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    pub fn max_value(&self) -> u64 {
        self.max_value
    }

    /// Non-blocking fast path: CAS `value` down by `count` if it's
    /// currently large enough. Never enqueues, never yields.
    pub fn try_acquire(&self, count: u64) -> bool {
        let mut current = self.value.load(Ordering::Acquire);
        loop {
            if current < count {
                return false;
            }
            match self.value.compare_exchange_weak(
                current,
                current - count,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Block until `count` units are available or `adapter` cancels the
    /// wait.
    pub fn acquire(&self, adapter: &dyn RuntimeAdapter, count: u64) -> Result<(), AcquireError> {
        self.acquire_deadline(adapter, count, None)
    }

    pub fn acquire_timeout(
        &self,
        adapter: &dyn RuntimeAdapter,
        count: u64,
        timeout: Duration,
    ) -> Result<(), AcquireError> {
        let deadline = Instant::checked_add(adapter.monotonic_now(), timeout)
            .unwrap_or_else(|| adapter.monotonic_now());
        self.acquire_deadline(adapter, count, Some(deadline))
    }

    fn acquire_deadline(
        &self,
        adapter: &dyn RuntimeAdapter,
        count: u64,
        deadline: Option<Instant>,
    ) -> Result<(), AcquireError> {
        if count == 0 {
            return Err(ProgrammerError::NonPositiveCount.into());
        }
        loop {
            if self.try_acquire(count) {
                return Ok(());
            }
            let event = Event::with_amount(adapter.create_waiter(), false, count);
            self.wait_queue.append(event.clone());
            let woken = event.wait(adapter, deadline);
            if woken {
                // A releaser already deducted `count` from `value` on our
                // behalf as part of waking us.
                return Ok(());
            }
            match self.wait_queue.on_cancelled(&event) {
                crate::wait::RemoveOutcome::StolenSuccess => return Ok(()),
                crate::wait::RemoveOutcome::Removed => {
                    // The counter may have changed while we slept; retry
                    // the fast path rather than assuming timeout.
                    if deadline.is_some_and(|d| d.has_elapsed(adapter.monotonic_now())) {
                        return Err(sync_core::WaitError::TimedOut.into());
                    }
                    log::trace!("semaphore {self:p} acquire({count}) retrying the fast path");
                }
            }
        }
    }

    /// Increment `value` by `count`, then hand out up to `count` units to
    /// whichever queued waiters it can now satisfy, in FIFO order.
    pub fn release(&self, count: u64) -> Result<(), ReleaseError> {
        if count == 0 {
            return Err(ProgrammerError::NonPositiveCount.into());
        }
        let mut current = self.value.load(Ordering::Acquire);
        loop {
            let new_value = current.checked_add(count).filter(|v| *v <= self.max_value);
            let Some(new_value) = new_value else {
                log::warn!(
                    "semaphore {self:p} rejected release({count}): would exceed max_value={}",
                    self.max_value
                );
                return Err(ProgrammerError::SemaphoreOverRelease.into());
            };
            match self.value.compare_exchange_weak(
                current,
                new_value,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
        self.wait_queue.drain_while(
            |requested| {
                let mut current = self.value.load(Ordering::Acquire);
                loop {
                    if current < requested {
                        return false;
                    }
                    match self.value.compare_exchange_weak(
                        current,
                        current - requested,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => return true,
                        Err(observed) => current = observed,
                    }
                }
            },
            |amount| {
                // The reserved head turned out to already be cancelled by
                // its own timeout; hand the units back instead of losing
                // them, so a release can never vanish without either being
                // claimed by a waiter or remaining in `value`.
                self.value.fetch_add(amount, Ordering::AcqRel);
            },
        );
        Ok(())
    }

    pub fn waiting_len(&self) -> usize {
        self.wait_queue.len()
    }
}

impl std::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Semaphore")
            .field("value", &self.value())
            .field("max_value", &self.max_value)
            .field("waiting", &self.wait_queue.len())
            .finish()
    }
}

/// A semaphore whose `value` is stored as a single flag (0 or 1), used as
/// the building block for [`crate::mutex::Lock`] and as the lock a
/// [`crate::condvar::CondVar`] can bind to in its mixed mode. Exposes the
/// raw wait queue (`raw_wait_queue`) so the condition variable can
/// reparking waiters without going through the value byte.
pub struct BinarySemaphore {
    held: std::sync::atomic::AtomicBool,
    wait_queue: WaitQueue,
}

impl BinarySemaphore {
    pub fn new(initially_available: bool) -> Self {
        Self {
            held: std::sync::atomic::AtomicBool::new(!initially_available),
            wait_queue: WaitQueue::new(),
        }
    }

    pub fn is_available(&self) -> bool {
        !self.held.load(Ordering::Acquire)
    }

    pub fn try_acquire(&self) -> bool {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn acquire(&self, adapter: &dyn RuntimeAdapter) -> Result<(), StateError> {
        self.acquire_deadline(adapter, None).map(|_| ())
    }

    pub fn acquire_timeout(
        &self,
        adapter: &dyn RuntimeAdapter,
        timeout: Duration,
    ) -> Result<bool, StateError> {
        let deadline = Instant::checked_add(adapter.monotonic_now(), timeout)
            .unwrap_or_else(|| adapter.monotonic_now());
        self.acquire_deadline(adapter, Some(deadline))
    }

    fn acquire_deadline(
        &self,
        adapter: &dyn RuntimeAdapter,
        deadline: Option<Instant>,
    ) -> Result<bool, StateError> {
        loop {
            if self.try_acquire() {
                return Ok(true);
            }
            let event = Event::new(adapter.create_waiter(), false);
            self.wait_queue.append(event.clone());
            if event.wait(adapter, deadline) {
                return Ok(true);
            }
            if self.wait_queue.on_cancelled(&event) == crate::wait::RemoveOutcome::StolenSuccess {
                return Ok(true);
            }
            if deadline.is_some_and(|d| d.has_elapsed(adapter.monotonic_now())) {
                return Ok(false);
            }
        }
    }

    /// Release, granting ownership directly to the next waiter if any
    /// (without ever observing `held` flip back to "available" in between)
    /// so a concurrent `try_acquire` can't steal it out from under the
    /// waiter that's been sitting in the queue the longest.
    pub fn release(&self) {
        if !self.wait_queue.notify_one() {
            self.held.store(false, Ordering::Release);
        }
    }

    /// The queue condition variable reparking uses directly, bypassing
    /// the `held` flag entirely.
    pub(crate) fn raw_wait_queue(&self) -> &WaitQueue {
        &self.wait_queue
    }
}

impl std::fmt::Debug for BinarySemaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinarySemaphore")
            .field("available", &self.is_available())
            .field("waiting", &self.wait_queue.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestAdapter;
    use quickcheck_macros::quickcheck;
    use std::sync::Arc;
    use std::thread;

    /// For all reachable states, `0 <= value(S) <= max_value(S)`, across
    /// arbitrary interleavings of non-blocking acquire/release calls.
    #[quickcheck]
    fn value_stays_within_bounds(ops: Vec<(bool, u8)>) -> bool {
        let max = 8u64;
        let sem = Semaphore::bounded(max / 2, max);
        for (acquire, raw) in ops {
            let count = u64::from(raw % 4) + 1;
            if acquire {
                let _ = sem.try_acquire(count);
            } else {
                let _ = sem.release(count);
            }
            if sem.value() > sem.max_value() {
                return false;
            }
        }
        true
    }

    #[test]
    fn try_acquire_respects_value() {
        let sem = Semaphore::new(2);
        assert!(sem.try_acquire(1));
        assert!(sem.try_acquire(1));
        assert!(!sem.try_acquire(1));
        assert_eq!(sem.value(), 0);
    }

    #[test]
    fn bounded_release_rejects_overflow() {
        let sem = Semaphore::bounded(1, 1);
        assert!(matches!(sem.release(1), Err(ReleaseError::Programmer(ProgrammerError::SemaphoreOverRelease))));
    }

    #[test]
    fn blocked_acquire_wakes_on_release() {
        let sem = Arc::new(Semaphore::new(0));
        let sem2 = sem.clone();
        let handle = thread::spawn(move || {
            let adapter = TestAdapter::new("thread", 1);
            sem2.acquire(&adapter, 1).unwrap();
        });
        thread::sleep(Duration::from_millis(20));
        assert_eq!(sem.waiting_len(), 1);
        sem.release(1).unwrap();
        handle.join().unwrap();
        assert_eq!(sem.value(), 0);
    }

    #[test]
    fn cancelled_acquire_never_loses_a_release() {
        // Two 0.1s timeouts race a release at 0.2s.
        let sem = Arc::new(Semaphore::new(0));
        let sem2 = sem.clone();
        let sem3 = sem.clone();
        let a = thread::spawn(move || {
            let adapter = TestAdapter::new("thread", 1);
            sem2.acquire_timeout(&adapter, 1, Duration::from_millis(100))
        });
        let b = thread::spawn(move || {
            let adapter = TestAdapter::new("thread", 2);
            sem3.acquire_timeout(&adapter, 1, Duration::from_millis(100))
        });
        thread::sleep(Duration::from_millis(200));
        sem.release(1).unwrap();
        let ra = a.join().unwrap();
        let rb = b.join().unwrap();
        // Both timeouts should have fired before the release landed.
        assert!(ra.is_err() && rb.is_err());
        assert_eq!(sem.value(), 1);
    }

    #[test]
    fn binary_semaphore_excludes() {
        let sem = BinarySemaphore::new(true);
        assert!(sem.try_acquire());
        assert!(!sem.try_acquire());
        sem.release();
        assert!(sem.try_acquire());
    }
}
