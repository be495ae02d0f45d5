//! The internal one-shot rendezvous cell and the wait-queue it is enqueued
//! in.
//!
//! Each waitable object owns a `WaitQueue` of `Event`s, one per currently
//! blocked waiter. A design that serializes all queue access behind one
//! global lock (as an embedded kernel might, disabling interrupts instead
//! of taking a real lock) doesn't hold up once waiters run genuinely in
//! parallel across OS threads, so here each `WaitQueue` is protected by
//! its own short-held `spin::Mutex` instead of one lock shared process-wide.

use spin::Mutex as SpinMutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use sync_core::{current_config, Instant, ParkOutcome, RuntimeAdapter, Waiter};

const PENDING: u8 = 0;
const SET: u8 = 1;
const CANCELLED: u8 = 2;

/// A one-shot rendezvous cell: the waiting side owns it until it resolves,
/// a notifier may also hold a reference after popping it from a
/// [`WaitQueue`]. State transitions are monotonic and CAS-guarded, so at
/// most one of `set`/`cancel` ever wins.
pub struct Event {
    state: AtomicU8,
    waiter: Box<dyn Waiter>,
    /// When true, `wait` suppresses external cancellation until the event
    /// resolves, then re-raises it.
    pub(crate) shield: bool,
    /// Context-specific payload a primitive attaches to its queued waits.
    /// A primitive that queues different kinds of requests (a semaphore
    /// wanting N units, a mutex wanting exclusive ownership, ...) could tag
    /// each queued wait with whatever shape it needs; in practice every
    /// primitive here only ever needs "how many units this waiter is
    /// asking for", so a single counter covers all of them. Defaults to 1.
    pub(crate) amount: u64,
}

impl Event {
    pub fn new(waiter: Box<dyn Waiter>, shield: bool) -> Arc<Self> {
        Self::with_amount(waiter, shield, 1)
    }

    pub fn with_amount(waiter: Box<dyn Waiter>, shield: bool, amount: u64) -> Arc<Self> {
        Arc::new(Self { state: AtomicU8::new(PENDING), waiter, shield, amount })
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.state.load(Ordering::Acquire) == SET
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }

    /// CAS PENDING→SET, waking the parked side on success. Idempotent:
    /// returns true only for the call that actually wins the race.
    pub fn set(&self) -> bool {
        let won = self
            .state
            .compare_exchange(PENDING, SET, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            log::trace!("event {self:p} set, waking waiter");
            self.waiter.wake();
        } else {
            log::trace!("event {self:p} set lost the CAS race, already resolved");
        }
        won
    }

    /// CAS PENDING→CANCELLED, waking the parked side so it can inspect the
    /// outcome promptly. Returns true iff this call performed the
    /// transition (i.e. a racing `set` had not already won).
    fn cancel(&self) -> bool {
        let won = self
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            log::trace!("event {self:p} cancelled");
            self.waiter.wake();
        }
        won
    }

    /// Park until resolved or `deadline` elapses; returns true iff the
    /// event ultimately resolved to SET.
    pub fn wait(self: &Arc<Self>, adapter: &dyn RuntimeAdapter, deadline: Option<Instant>) -> bool {
        if self.shield {
            let this = self.clone();
            let mut body = move || this.park_once(deadline);
            adapter.shield(&mut body);
        } else {
            self.park_once(deadline);
        }
        self.is_set()
    }

    fn park_once(&self, deadline: Option<Instant>) {
        match self.waiter.park(deadline) {
            ParkOutcome::Woken => {}
            ParkOutcome::TimedOut | ParkOutcome::Cancelled => {
                // We own the cancellation only if no notifier beat us to
                // SET; either way `cancel` leaves `self` in a terminal
                // state, so the caller's `is_set()` check afterward always
                // reflects the correct, race-resolved outcome.
                self.cancel();
            }
        }
    }
}

/// Outcome of attempting to remove a specific event from the queue it was
/// enqueued in, used by a waiter that just timed out or was cancelled
/// and wants to remove itself from the queue it was enqueued in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// We cancelled it and (under perfect fairness) removed it from the
    /// backing storage; under relaxed fairness it is left as a tombstone.
    Removed,
    /// A notifier had already popped and resolved it to SET before we
    /// could cancel — the wakeup is not lost, it now belongs to us.
    StolenSuccess,
}

struct Body {
    deque: Option<VecDeque<Arc<Event>>>,
    appends_since_compaction: usize,
}

impl Body {
    const fn new() -> Self {
        Self { deque: None, appends_since_compaction: 0 }
    }

    fn push(&mut self, event: Arc<Event>) {
        self.deque.get_or_insert_with(VecDeque::new).push_back(event);
    }

    fn pop_front(&mut self) -> Option<Arc<Event>> {
        self.deque.as_mut()?.pop_front()
    }

    fn len(&self) -> usize {
        self.deque.as_ref().map_or(0, VecDeque::len)
    }

    fn erase(&mut self, target: &Arc<Event>) -> bool {
        let Some(deque) = self.deque.as_mut() else { return false };
        if let Some(pos) = deque.iter().position(|e| Arc::ptr_eq(e, target)) {
            deque.remove(pos);
            true
        } else {
            false
        }
    }

    fn compact(&mut self) {
        if let Some(deque) = self.deque.as_mut() {
            deque.retain(|e| !e.is_cancelled());
        }
        self.appends_since_compaction = 0;
    }
}

/// An append-only, concurrent FIFO of [`Event`]s.
///
/// Lazily allocated: an empty, never-contended `WaitQueue` holds no heap
/// storage at all.
pub struct WaitQueue {
    body: SpinMutex<Body>,
}

/// Every `COMPACTION_INTERVAL` appends under relaxed fairness, sweep
/// tombstoned (cancelled) entries out of the backing deque so a queue that
/// sees many more timeouts than successful notifies doesn't grow without
/// bound.
const COMPACTION_INTERVAL: usize = 64;

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitQueue {
    pub const fn new() -> Self {
        Self { body: SpinMutex::new(Body::new()) }
    }

    pub fn len(&self) -> usize {
        self.body.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `event`, transitioning its owning task into the logical
    /// "waiting" state from the queue's point of view.
    pub fn append(&self, event: Arc<Event>) {
        let mut body = self.body.lock();
        body.push(event);
        log::debug!("wait queue {self:p} grew to {} entries", body.len());
        if !current_config().perfect_fairness {
            body.appends_since_compaction += 1;
            if body.appends_since_compaction >= COMPACTION_INTERVAL {
                log::debug!("wait queue {self:p} compacting after {COMPACTION_INTERVAL} appends");
                body.compact();
            }
        }
    }

    /// Pop the next non-cancelled entry without resolving it, so the
    /// caller can perform protocol-specific bookkeeping (e.g. handing a
    /// mutex's ownership to the chosen waiter) before the waiter actually
    /// wakes. Tombstoned heads are discarded as part of the same pop.
    pub fn pop_pending(&self) -> Option<Arc<Event>> {
        let mut body = self.body.lock();
        loop {
            let event = body.pop_front()?;
            if event.is_cancelled() {
                continue;
            }
            return Some(event);
        }
    }

    /// Pop and resolve the head of the queue, retrying past any
    /// already-cancelled entries. Returns
    /// true iff some waiter was actually woken.
    pub fn notify_one(&self) -> bool {
        loop {
            let Some(event) = self.pop_pending() else { return false };
            if event.set() {
                return true;
            }
            // Lost a race with this event's own cancellation; it was
            // already popped, so just move on to the next entry.
        }
    }

    /// Drain from the front, skipping tombstones, offering each live head's
    /// `amount` payload to `try_satisfy` in turn. While it returns true the
    /// head is a candidate to be woken and draining continues; the first
    /// `false` leaves that head in place (its request can't be satisfied
    /// right now) and stops draining. Returns how many waiters were woken.
    ///
    /// `try_satisfy` and `refund` together reserve and (if need be) give
    /// back a head's `amount`: the head is only actually popped and its
    /// budget permanently committed *after* this call wins the race to
    /// resolve it (`event.set()`). A head that was reserved via
    /// `try_satisfy` but then turns out to have already been cancelled by
    /// its own timeout loses the `set()` race; `refund` is called with that
    /// same `amount` so the reservation isn't silently lost, and draining
    /// continues from the (still in place) next head.
    ///
    /// A plain "notify up to N waiters" release loop only works when every
    /// waiter wants exactly one unit; this lets each queued waiter ask for
    /// a different amount and only grants the ones a single release can
    /// actually afford, in order.
    pub fn drain_while(
        &self,
        mut try_satisfy: impl FnMut(u64) -> bool,
        mut refund: impl FnMut(u64),
    ) -> usize {
        let mut body = self.body.lock();
        let mut woken = 0;
        loop {
            let Some(deque) = body.deque.as_mut() else { break };
            let Some(front) = deque.front() else { break };
            if front.is_cancelled() {
                deque.pop_front();
                continue;
            }
            let amount = front.amount;
            if !try_satisfy(amount) {
                break;
            }
            let event = deque.pop_front().expect("front just peeked as Some");
            if event.set() {
                woken += 1;
            } else {
                // Lost the race to this event's own cancellation between
                // `try_satisfy` reserving `amount` and us resolving it —
                // give the reservation back rather than letting it vanish.
                refund(amount);
            }
        }
        woken
    }

    /// Notify up to `n` waiters; returns how many were actually woken.
    pub fn notify_n(&self, n: usize) -> usize {
        (0..n).take_while(|_| self.notify_one()).count()
    }

    /// Notify every currently-queued waiter; returns how many were woken.
    pub fn notify_all(&self) -> usize {
        let mut woken = 0;
        while self.notify_one() {
            woken += 1;
        }
        woken
    }

    /// Attempt to remove `event` from this queue after it resolved to
    /// CANCELLED on its own side. Under perfect
    /// fairness the entry is scanned for and erased immediately; under
    /// relaxed fairness it is left in place as a tombstone for `notify_one`
    /// (or the next compaction) to skip.
    pub fn on_cancelled(&self, event: &Arc<Event>) -> RemoveOutcome {
        if !event.is_cancelled() {
            debug_assert!(event.is_set(), "cancelled caller must have resolved the event");
            log::trace!("wait queue {self:p} lost a cancellation race to a notifier");
            return RemoveOutcome::StolenSuccess;
        }
        if current_config().perfect_fairness {
            self.body.lock().erase(event);
        } else {
            log::debug!("wait queue {self:p} leaving a tombstone for a cancelled entry");
        }
        RemoveOutcome::Removed
    }

    /// Cancel `event` and, if it was genuinely this call's cancellation
    /// (not a race already won by a notifier), remove it from the queue.
    /// Returns true iff the event's final state is SET (a "stolen
    /// success": the caller should treat the wait as having succeeded).
    pub fn cancel_and_remove(&self, event: &Arc<Event>) -> bool {
        if event.cancel() {
            self.on_cancelled(event);
            false
        } else {
            true
        }
    }
}

impl std::fmt::Debug for WaitQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitQueue").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::LoopbackWaiter;

    fn pending_event(shield: bool) -> Arc<Event> {
        Event::new(Box::new(LoopbackWaiter::new()), shield)
    }

    #[test]
    fn set_is_idempotent() {
        let ev = pending_event(false);
        assert!(ev.set());
        assert!(!ev.set());
        assert!(ev.is_set());
    }

    #[test]
    fn cancel_loses_race_to_set() {
        let ev = pending_event(false);
        assert!(ev.set());
        // A concurrent canceller must observe it as already resolved, and
        // not flip SET back to CANCELLED.
        let q = WaitQueue::new();
        assert_eq!(q.cancel_and_remove(&ev), true);
        assert!(ev.is_set());
    }

    #[test]
    fn fifo_notify_order() {
        let q = WaitQueue::new();
        let evs: Vec<_> = (0..4).map(|_| pending_event(false)).collect();
        for e in &evs {
            q.append(e.clone());
        }
        for e in &evs {
            assert!(q.notify_one());
            assert!(e.is_set());
        }
        assert!(!q.notify_one());
    }

    #[test]
    fn tombstones_are_skipped_by_notify() {
        let q = WaitQueue::new();
        let evs: Vec<_> = (0..3).map(|_| pending_event(false)).collect();
        for e in &evs {
            q.append(e.clone());
        }
        // Cancel the middle one directly, as if its wait had timed out.
        assert!(q.cancel_and_remove(&evs[1]) == false);
        assert!(evs[1].is_cancelled());

        assert!(q.notify_one());
        assert!(evs[0].is_set());
        assert!(q.notify_one());
        assert!(evs[2].is_set());
        assert!(!q.notify_one());
    }
}
