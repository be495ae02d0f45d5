//! A semaphore augmented with identity-based ownership tracking: the same
//! logical task that borrows a slot is the one required to return it.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use sync_core::{AcquireError, Instant, ProgrammerError, ReleaseError, RuntimeAdapter, TaskId};

use crate::semaphore::Semaphore;

struct Ownership {
    borrowers: StdMutex<HashMap<TaskId, u64>>,
}

impl Ownership {
    fn new() -> Self {
        Self { borrowers: StdMutex::new(HashMap::new()) }
    }

    fn borrow(&self, task: TaskId, count: u64) {
        *self.borrowers.lock().unwrap().entry(task).or_insert(0) += count;
    }

    fn release(&self, task: &TaskId, count: u64) -> Result<(), ProgrammerError> {
        let mut borrowers = self.borrowers.lock().unwrap();
        let Some(held) = borrowers.get_mut(task) else {
            log::warn!("capacity limiter: {task} released {count} tokens it never borrowed");
            return Err(ProgrammerError::ReleaseWithoutAcquire);
        };
        if *held < count {
            log::warn!("capacity limiter: {task} released {count} tokens but only holds {held}");
            return Err(ProgrammerError::ReleaseWithoutAcquire);
        }
        *held -= count;
        if *held == 0 {
            borrowers.remove(task);
        }
        Ok(())
    }

    fn snapshot(&self) -> HashMap<TaskId, u64> {
        self.borrowers.lock().unwrap().clone()
    }
}

/// `acquire` by task T borrows one token: if T already holds tokens, its
/// entry is simply incremented without touching the underlying semaphore
/// again; otherwise it blocks like a normal semaphore acquire. `release`
/// by a non-owner (or over-releasing past what was borrowed) is a
/// programmer error.
pub struct CapacityLimiter {
    sem: Semaphore,
    ownership: Ownership,
}

impl CapacityLimiter {
    pub fn new(capacity: u64) -> Self {
        Self { sem: Semaphore::bounded(capacity, capacity), ownership: Ownership::new() }
    }

    pub fn capacity(&self) -> u64 {
        self.sem.max_value()
    }

    pub fn borrowers(&self) -> HashMap<TaskId, u64> {
        self.ownership.snapshot()
    }

    pub fn acquire(&self, adapter: &dyn RuntimeAdapter) -> Result<(), AcquireError> {
        self.sem.acquire(adapter, 1)?;
        self.ownership.borrow(adapter.current_task_id(), 1);
        Ok(())
    }

    pub fn acquire_timeout(
        &self,
        adapter: &dyn RuntimeAdapter,
        timeout: Duration,
    ) -> Result<(), AcquireError> {
        self.sem.acquire_timeout(adapter, 1, timeout)?;
        self.ownership.borrow(adapter.current_task_id(), 1);
        Ok(())
    }

    pub fn release(&self, adapter: &dyn RuntimeAdapter) -> Result<(), ReleaseError> {
        let task = adapter.current_task_id();
        self.ownership.release(&task, 1)?;
        self.sem.release(1)
    }
}

impl std::fmt::Debug for CapacityLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapacityLimiter")
            .field("available", &self.sem.value())
            .field("borrowers", &self.ownership.snapshot().len())
            .finish()
    }
}

/// Reentrant variant: `acquire(count)` reserves `count` tokens for the
/// calling task in one call (instead of one token at a time), and
/// `release` requires a matching count to fully return them.
pub struct RCapacityLimiter {
    sem: Semaphore,
    ownership: Ownership,
}

impl RCapacityLimiter {
    pub fn new(capacity: u64) -> Self {
        Self { sem: Semaphore::bounded(capacity, capacity), ownership: Ownership::new() }
    }

    pub fn borrowers(&self) -> HashMap<TaskId, u64> {
        self.ownership.snapshot()
    }

    pub fn acquire(&self, adapter: &dyn RuntimeAdapter, count: u64) -> Result<(), AcquireError> {
        if count == 0 {
            return Err(ProgrammerError::NonPositiveCount.into());
        }
        self.sem.acquire(adapter, count)?;
        self.ownership.borrow(adapter.current_task_id(), count);
        Ok(())
    }

    pub fn acquire_timeout(
        &self,
        adapter: &dyn RuntimeAdapter,
        count: u64,
        timeout: Duration,
    ) -> Result<(), AcquireError> {
        if count == 0 {
            return Err(ProgrammerError::NonPositiveCount.into());
        }
        self.sem.acquire_timeout(adapter, count, timeout)?;
        self.ownership.borrow(adapter.current_task_id(), count);
        Ok(())
    }

    pub fn release(&self, adapter: &dyn RuntimeAdapter, count: u64) -> Result<(), ReleaseError> {
        let task = adapter.current_task_id();
        self.ownership.release(&task, count)?;
        self.sem.release(count)
    }
}

impl std::fmt::Debug for RCapacityLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RCapacityLimiter")
            .field("available", &self.sem.value())
            .field("borrowers", &self.ownership.snapshot().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestAdapter;
    use quickcheck_macros::quickcheck;

    /// `sum(borrowers.values()) <= capacity`, across arbitrary sequences of
    /// single-task, non-blocking acquire/release calls.
    #[quickcheck]
    fn borrowed_total_never_exceeds_capacity(acquires: Vec<bool>) -> bool {
        let capacity = 3u64;
        let limiter = CapacityLimiter::new(capacity);
        let adapter = TestAdapter::new("thread", 1);
        for acquire in acquires {
            let held: u64 = limiter.borrowers().values().sum();
            if acquire {
                if held < capacity {
                    limiter.acquire(&adapter).unwrap();
                }
            } else if held > 0 {
                limiter.release(&adapter).unwrap();
            }
            if limiter.borrowers().values().sum::<u64>() > capacity {
                return false;
            }
        }
        true
    }

    #[test]
    fn release_without_acquire_is_a_programmer_error() {
        let limiter = CapacityLimiter::new(2);
        let adapter = TestAdapter::new("thread", 1);
        assert!(matches!(
            limiter.release(&adapter),
            Err(ReleaseError::Programmer(ProgrammerError::ReleaseWithoutAcquire))
        ));
    }

    #[test]
    fn borrowers_snapshot_tracks_acquire_and_release() {
        let limiter = CapacityLimiter::new(2);
        let adapter = TestAdapter::new("thread", 1);
        limiter.acquire(&adapter).unwrap();
        assert_eq!(limiter.borrowers().get(&adapter.current_task_id()), Some(&1));
        limiter.release(&adapter).unwrap();
        assert!(limiter.borrowers().is_empty());
    }

    #[test]
    fn reentrant_limiter_requires_matching_release_count() {
        let limiter = RCapacityLimiter::new(4);
        let adapter = TestAdapter::new("thread", 1);
        limiter.acquire(&adapter, 3).unwrap();
        assert_eq!(
            limiter.release(&adapter, 4),
            Err(ProgrammerError::ReleaseWithoutAcquire.into())
        );
        limiter.release(&adapter, 3).unwrap();
        assert!(limiter.borrowers().is_empty());
    }
}
