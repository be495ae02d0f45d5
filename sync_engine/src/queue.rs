//! FIFO/LIFO bags and bounded queues with fair dual-waitqueue coordination.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use sync_core::{AcquireError, Instant, ProgrammerError, RuntimeAdapter, StateError};

use crate::semaphore::Semaphore;
use crate::wait::{Event, WaitQueue};

/// Insertion/removal discipline for [`SimpleQueue`] and [`ComplexQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ordering {
    Fifo,
    Lifo,
    Priority,
}

/// An unbounded bag plus a counting semaphore: `put` pushes and bumps the
/// semaphore, `get` acquires a unit then pops. Never blocks on `put`.
pub struct SimpleQueue<T> {
    body: StdMutex<VecDeque<T>>,
    sem: Semaphore,
    ordering: Ordering,
}

impl<T> SimpleQueue<T> {
    pub fn new(ordering: Ordering) -> Self {
        assert_ne!(ordering, Ordering::Priority, "SimpleQueue has no priority variant; use ComplexQueue");
        Self { body: StdMutex::new(VecDeque::new()), sem: Semaphore::new(0), ordering }
    }

    pub fn len(&self) -> usize {
        self.sem.value() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn put(&self, item: T) {
        self.body.lock().unwrap().push_back(item);
        self.sem.release(1).expect("unbounded queue semaphore never overflows");
    }

    pub fn try_get(&self) -> Option<T> {
        if !self.sem.try_acquire(1) {
            return None;
        }
        Some(self.pop())
    }

    pub fn get(&self, adapter: &dyn RuntimeAdapter) -> Result<T, AcquireError> {
        self.sem.acquire(adapter, 1)?;
        Ok(self.pop())
    }

    pub fn get_timeout(&self, adapter: &dyn RuntimeAdapter, timeout: Duration) -> Result<T, AcquireError> {
        self.sem.acquire_timeout(adapter, 1, timeout)?;
        Ok(self.pop())
    }

    fn pop(&self) -> T {
        let mut body = self.body.lock().unwrap();
        match self.ordering {
            Ordering::Fifo => body.pop_front().expect("semaphore permit implies an item is present"),
            Ordering::Lifo => body.pop_back().expect("semaphore permit implies an item is present"),
            Ordering::Priority => unreachable!("rejected in SimpleQueue::new"),
        }
    }
}

impl<T> std::fmt::Debug for SimpleQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimpleQueue").field("len", &self.len()).field("ordering", &self.ordering).finish()
    }
}

struct Body<T: Ord> {
    fifo: VecDeque<T>,
    lifo: Vec<T>,
    heap: BinaryHeap<Reverse<T>>,
}

impl<T: Ord> Body<T> {
    fn new(ordering: Ordering, initial: Vec<T>) -> Self {
        match ordering {
            Ordering::Fifo => Self { fifo: initial.into(), lifo: Vec::new(), heap: BinaryHeap::new() },
            Ordering::Lifo => Self { fifo: VecDeque::new(), lifo: initial, heap: BinaryHeap::new() },
            // `BinaryHeap::from` restores the heap invariant for us.
            Ordering::Priority => {
                Self { fifo: VecDeque::new(), lifo: Vec::new(), heap: initial.into_iter().map(Reverse).collect() }
            }
        }
    }

    fn len(&self, ordering: Ordering) -> usize {
        match ordering {
            Ordering::Fifo => self.fifo.len(),
            Ordering::Lifo => self.lifo.len(),
            Ordering::Priority => self.heap.len(),
        }
    }

    fn push(&mut self, ordering: Ordering, item: T) {
        match ordering {
            Ordering::Fifo => self.fifo.push_back(item),
            Ordering::Lifo => self.lifo.push(item),
            Ordering::Priority => self.heap.push(Reverse(item)),
        }
    }

    fn pop(&mut self, ordering: Ordering) -> T {
        match ordering {
            Ordering::Fifo => self.fifo.pop_front().expect("caller already checked non-empty"),
            Ordering::Lifo => self.lifo.pop().expect("caller already checked non-empty"),
            Ordering::Priority => self.heap.pop().expect("caller already checked non-empty").0,
        }
    }
}

/// A bounded queue with independent `putters`/`getters` wait-queues and a
/// single implicit lock protecting the body plus both queues. `put`
/// blocks on a full buffer, `get` blocks on an empty one; a successful
/// `put` only ever frees capacity a getter can use, and a successful
/// `get` only ever frees capacity a putter can use, so each wakes
/// exactly its complementary side's queue, strict FIFO within that side.
pub struct ComplexQueue<T: Ord> {
    body: StdMutex<Body<T>>,
    max_size: usize,
    ordering: Ordering,
    putters: WaitQueue,
    getters: WaitQueue,
}

impl<T: Ord> ComplexQueue<T> {
    pub fn new(ordering: Ordering, max_size: usize) -> Result<Self, ProgrammerError> {
        Self::with_initial(ordering, max_size, Vec::new())
    }

    /// Build pre-populated with `initial`; for the priority variant, the
    /// heap invariant is restored before the queue is ever exposed to a
    /// caller.
    pub fn with_initial(
        ordering: Ordering,
        max_size: usize,
        initial: Vec<T>,
    ) -> Result<Self, ProgrammerError> {
        if max_size == 0 {
            return Err(ProgrammerError::NonPositiveMaxSize);
        }
        debug_assert!(initial.len() <= max_size, "initial contents exceed max_size");
        Ok(Self {
            body: StdMutex::new(Body::new(ordering, initial)),
            max_size,
            ordering,
            putters: WaitQueue::new(),
            getters: WaitQueue::new(),
        })
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.body.lock().unwrap().len(self.ordering)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.max_size
    }

    pub fn try_put(&self, item: T) -> Result<(), (StateError, T)> {
        let mut body = self.body.lock().unwrap();
        if body.len(self.ordering) >= self.max_size {
            return Err((StateError::QueueFull, item));
        }
        body.push(self.ordering, item);
        let new_len = body.len(self.ordering);
        drop(body);
        log::debug!("complex queue {self:p} now holds {new_len}/{} items", self.max_size);
        self.wake_one_getter();
        Ok(())
    }

    pub fn try_get(&self) -> Result<T, StateError> {
        let mut body = self.body.lock().unwrap();
        if body.len(self.ordering) == 0 {
            return Err(StateError::QueueEmpty);
        }
        let item = body.pop(self.ordering);
        drop(body);
        self.wake_one_putter();
        Ok(item)
    }

    pub fn put(&self, adapter: &dyn RuntimeAdapter, item: T) -> Result<(), AcquireError> {
        self.put_deadline(adapter, item, None)
    }

    pub fn put_timeout(
        &self,
        adapter: &dyn RuntimeAdapter,
        item: T,
        timeout: Duration,
    ) -> Result<(), AcquireError> {
        let deadline = Instant::checked_add(adapter.monotonic_now(), timeout)
            .unwrap_or_else(|| adapter.monotonic_now());
        self.put_deadline(adapter, item, Some(deadline))
    }

    fn put_deadline(
        &self,
        adapter: &dyn RuntimeAdapter,
        mut item: T,
        deadline: Option<Instant>,
    ) -> Result<(), AcquireError> {
        loop {
            match self.try_put(item) {
                Ok(()) => return Ok(()),
                Err((_, returned)) => item = returned,
            }
            let event = Event::new(adapter.create_waiter(), false);
            self.putters.append(event.clone());
            if event.wait(adapter, deadline) {
                continue; // re-attempt try_put; room may only be momentary
            }
            if self.putters.on_cancelled(&event) == crate::wait::RemoveOutcome::StolenSuccess {
                continue;
            }
            return Err(sync_core::WaitError::TimedOut.into());
        }
    }

    pub fn get(&self, adapter: &dyn RuntimeAdapter) -> Result<T, AcquireError> {
        self.get_deadline(adapter, None)
    }

    pub fn get_timeout(&self, adapter: &dyn RuntimeAdapter, timeout: Duration) -> Result<T, AcquireError> {
        let deadline = Instant::checked_add(adapter.monotonic_now(), timeout)
            .unwrap_or_else(|| adapter.monotonic_now());
        self.get_deadline(adapter, Some(deadline))
    }

    fn get_deadline(&self, adapter: &dyn RuntimeAdapter, deadline: Option<Instant>) -> Result<T, AcquireError> {
        loop {
            match self.try_get() {
                Ok(item) => return Ok(item),
                Err(_) => {}
            }
            let event = Event::new(adapter.create_waiter(), false);
            self.getters.append(event.clone());
            if event.wait(adapter, deadline) {
                continue;
            }
            if self.getters.on_cancelled(&event) == crate::wait::RemoveOutcome::StolenSuccess {
                continue;
            }
            return Err(sync_core::WaitError::TimedOut.into());
        }
    }

    fn wake_one_getter(&self) {
        self.getters.notify_one();
    }

    fn wake_one_putter(&self) {
        self.putters.notify_one();
    }
}

impl<T: Ord> std::fmt::Debug for ComplexQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComplexQueue")
            .field("len", &self.len())
            .field("max_size", &self.max_size)
            .field("putters_waiting", &self.putters.len())
            .field("getters_waiting", &self.getters.len())
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

    /// `0 <= len(Q) <= max_size`, across arbitrary sequences of non-blocking
    /// `try_put`/`try_get` calls.
    #[quickcheck]
    fn complex_queue_len_stays_within_bounds(puts: Vec<bool>) -> bool {
        let max_size = 4;
        let q: ComplexQueue<i32> = ComplexQueue::new(Ordering::Fifo, max_size).unwrap();
        let mut next = 0;
        for put in puts {
            if put {
                let _ = q.try_put(next);
                next += 1;
            } else {
                let _ = q.try_get();
            }
            if q.len() > max_size {
                return false;
            }
        }
        true
    }

    #[test]
    fn simple_queue_is_fifo_by_default() {
        let q: SimpleQueue<i32> = SimpleQueue::new(Ordering::Fifo);
        q.put(1);
        q.put(2);
        q.put(3);
        assert_eq!(q.try_get(), Some(1));
        assert_eq!(q.try_get(), Some(2));
        assert_eq!(q.try_get(), Some(3));
        assert_eq!(q.try_get(), None);
    }

    #[test]
    fn simple_queue_lifo_pops_most_recent() {
        let q: SimpleQueue<i32> = SimpleQueue::new(Ordering::Lifo);
        q.put(1);
        q.put(2);
        assert_eq!(q.try_get(), Some(2));
        assert_eq!(q.try_get(), Some(1));
    }

    #[test]
    fn complex_queue_rejects_put_over_capacity() {
        let q: ComplexQueue<i32> = ComplexQueue::new(Ordering::Fifo, 1).unwrap();
        q.try_put(1).unwrap();
        assert_eq!(q.try_put(2), Err((StateError::QueueFull, 2)));
    }

    #[test]
    fn complex_queue_rejects_zero_max_size() {
        assert_eq!(
            ComplexQueue::<i32>::new(Ordering::Fifo, 0).err(),
            Some(ProgrammerError::NonPositiveMaxSize)
        );
    }

    #[test]
    fn complex_queue_priority_orders_by_min_heap() {
        let q: ComplexQueue<i32> = ComplexQueue::new(Ordering::Priority, 16).unwrap();
        for v in [3, 1, 4, 1, 5, 9, 2, 6] {
            q.try_put(v).unwrap();
        }
        let mut out = Vec::new();
        while let Ok(v) = q.try_get() {
            out.push(v);
        }
        assert_eq!(out, vec![1, 1, 2, 3, 4, 5, 6, 9]);
    }

    #[test]
    fn complex_queue_blocked_put_wakes_on_get() {
        let q = Arc::new(ComplexQueue::<i32>::new(Ordering::Fifo, 1).unwrap());
        q.try_put(0).unwrap();
        let q2 = q.clone();
        let handle = thread::spawn(move || {
            let adapter = TestAdapter::new("thread", 1);
            q2.put(&adapter, 1).unwrap();
        });
        thread::sleep(Duration::from_millis(20));
        assert_eq!(q.try_get().unwrap(), 0);
        handle.join().unwrap();
        assert_eq!(q.try_get().unwrap(), 1);
    }

    #[test]
    fn heap_initial_contents_restore_invariant() {
        let q: ComplexQueue<i32> =
            ComplexQueue::with_initial(Ordering::Priority, 8, vec![5, 3, 8, 1]).unwrap();
        assert_eq!(q.try_get().unwrap(), 1);
        assert_eq!(q.try_get().unwrap(), 3);
    }
}
