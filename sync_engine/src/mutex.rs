//! Ownable locks: a plain mutual-exclusion `Lock` and a reentrant `RLock`.

use spin::Mutex as SpinMutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use sync_core::{Instant, RuntimeAdapter, StateError, TaskId};

use crate::semaphore::BinarySemaphore;

/// A mutual-exclusion lock built atop a [`BinarySemaphore`] plus an owner
/// slot. `owner` is set only after the semaphore is actually held, and
/// cleared only before it is released, so any observer that sees an owner
/// also sees the lock taken. The owner slot is a spinlock rather than an OS
/// mutex — the same signal-safety reasoning as [`crate::wait::WaitQueue`]'s
/// body lock applies, since a signal handler reading `owner()` on the
/// thread that holds it must never block on a libc primitive.
pub struct Lock {
    sem: BinarySemaphore,
    owner: SpinMutex<Option<TaskId>>,
}

impl Lock {
    pub fn new() -> Self {
        Self { sem: BinarySemaphore::new(true), owner: SpinMutex::new(None) }
    }

    pub fn is_locked(&self) -> bool {
        !self.sem.is_available()
    }

    pub fn owner(&self) -> Option<TaskId> {
        self.owner.lock().clone()
    }

    pub fn try_acquire(&self, adapter: &dyn RuntimeAdapter) -> bool {
        if self.sem.try_acquire() {
            *self.owner.lock() = Some(adapter.current_task_id());
            true
        } else {
            false
        }
    }

    pub fn acquire(&self, adapter: &dyn RuntimeAdapter) -> Result<(), StateError> {
        self.sem.acquire(adapter)?;
        *self.owner.lock() = Some(adapter.current_task_id());
        Ok(())
    }

    pub fn acquire_timeout(
        &self,
        adapter: &dyn RuntimeAdapter,
        timeout: Duration,
    ) -> Result<bool, StateError> {
        let acquired = self.sem.acquire_timeout(adapter, timeout)?;
        if acquired {
            *self.owner.lock() = Some(adapter.current_task_id());
        }
        Ok(acquired)
    }

    /// Release is cooperative: the caller is trusted to actually hold the
    /// lock. Enforcing ownership is left to wrapper APIs (a guard type)
    /// rather than this primitive, which only needs to stay internally
    /// consistent.
    pub fn release(&self) {
        *self.owner.lock() = None;
        self.sem.release();
    }

    pub(crate) fn raw_binary_semaphore(&self) -> &BinarySemaphore {
        &self.sem
    }
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Lock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lock").field("locked", &self.is_locked()).field("owner", &self.owner()).finish()
    }
}

/// A reentrant lock: the owning task may acquire it again without
/// blocking, as long as each extra acquire is matched by a release.
///
/// Signal-safety ordering: `owner` is written before `recursion` on
/// acquire and `recursion` is cleared before `owner` on release, so a
/// nested call observing a partially-updated pair never reads "owner set,
/// recursion zero" — which would look like someone else holds the lock.
pub struct RLock {
    lock: Lock,
    recursion: AtomicU64,
}

impl RLock {
    pub fn new() -> Self {
        Self { lock: Lock::new(), recursion: AtomicU64::new(0) }
    }

    pub fn recursion(&self) -> u64 {
        self.recursion.load(Ordering::Acquire)
    }

    pub fn owner(&self) -> Option<TaskId> {
        self.lock.owner()
    }

    /// `count` > 1 performs a one-shot reentrant acquire: lock (if not
    /// already held by this task) and set recursion directly to `count`.
    pub fn acquire(&self, adapter: &dyn RuntimeAdapter, count: u64) -> Result<(), StateError> {
        self.acquire_deadline(adapter, count, None).map(|_| ())
    }

    pub fn acquire_timeout(
        &self,
        adapter: &dyn RuntimeAdapter,
        count: u64,
        timeout: Duration,
    ) -> Result<bool, StateError> {
        let deadline = Instant::checked_add(adapter.monotonic_now(), timeout)
            .unwrap_or_else(|| adapter.monotonic_now());
        self.acquire_deadline(adapter, count, Some(deadline))
    }

    fn acquire_deadline(
        &self,
        adapter: &dyn RuntimeAdapter,
        count: u64,
        deadline: Option<Instant>,
    ) -> Result<bool, StateError> {
        let this_task = adapter.current_task_id();
        if self.lock.owner().as_ref() == Some(&this_task) {
            self.recursion.fetch_add(count, Ordering::AcqRel);
            // Reentrant acquires still perform a cooperative checkpoint so
            // callers get predictable context-switch behavior even on the
            // fast, already-owned path.
            adapter.sleep(Duration::ZERO);
            return Ok(true);
        }
        let acquired = match deadline {
            None => {
                self.lock.acquire(adapter)?;
                true
            }
            Some(d) => self.lock.acquire_timeout(adapter, d.duration_since(adapter.monotonic_now()))?,
        };
        if acquired {
            self.recursion.store(count, Ordering::Release);
        }
        Ok(acquired)
    }

    /// Decrement recursion; only once it reaches zero is the underlying
    /// lock actually released.
    pub fn release(&self) {
        let prev = self.recursion.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev >= 1, "RLock released more times than it was acquired");
        if prev == 1 {
            self.lock.release();
        }
    }
}

impl Default for RLock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RLock")
            .field("owner", &self.owner())
            .field("recursion", &self.recursion())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestAdapter;
    use quickcheck_macros::quickcheck;

    /// `recursion > 0 <=> owner != None`, across arbitrary sequences of
    /// single-task acquire/release calls.
    #[quickcheck]
    fn recursion_matches_ownership(acquires: Vec<bool>) -> bool {
        let lock = RLock::new();
        let adapter = TestAdapter::new("thread", 1);
        for acquire in acquires {
            if acquire {
                lock.acquire(&adapter, 1).unwrap();
            } else if lock.recursion() > 0 {
                lock.release();
            }
            if (lock.recursion() > 0) != lock.owner().is_some() {
                return false;
            }
        }
        true
    }

    #[test]
    fn lock_excludes_concurrent_holders() {
        let lock = Lock::new();
        let a = TestAdapter::new("thread", 1);
        assert!(lock.try_acquire(&a));
        assert!(!lock.try_acquire(&a));
        assert_eq!(lock.owner(), Some(a.current_task_id()));
        lock.release();
        assert!(!lock.is_locked());
    }

    #[test]
    fn rlock_nests_and_unwinds() {
        let lock = RLock::new();
        let a = TestAdapter::new("thread", 7);
        lock.acquire(&a, 1).unwrap();
        lock.acquire(&a, 1).unwrap();
        assert_eq!(lock.recursion(), 2);
        lock.release();
        assert!(lock.owner().is_some());
        lock.release();
        assert!(lock.owner().is_none());
    }

    #[test]
    fn rlock_one_shot_reentrant_count() {
        let lock = RLock::new();
        let a = TestAdapter::new("thread", 3);
        lock.acquire(&a, 5).unwrap();
        assert_eq!(lock.recursion(), 5);
    }
}
