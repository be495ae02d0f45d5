//! Single-use, cyclic, and resettable barriers sharing one
//! wakeup-on-threshold state machine with formal broken-state handling.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use sync_core::{Instant, RuntimeAdapter, StateError, WaitError};

use crate::wait::{Event, WaitQueue};

const FILLING: u8 = 0;
const DRAINING: u8 = 1;
const BROKEN: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BrokenBarrierError {
    #[error(transparent)]
    Wait(#[from] WaitError),
    #[error(transparent)]
    State(#[from] StateError),
}

struct Shared {
    state: AtomicU8,
    parties: u64,
    arrived: AtomicU64,
    phase: AtomicU64,
    queue: WaitQueue,
    /// Index granted to each arriving task this phase, in arrival order;
    /// reset at the start of every phase.
    next_index: StdMutex<u64>,
}

impl Shared {
    fn new(parties: u64) -> Self {
        Self {
            state: AtomicU8::new(FILLING),
            parties,
            arrived: AtomicU64::new(0),
            phase: AtomicU64::new(0),
            queue: WaitQueue::new(),
            next_index: StdMutex::new(0),
        }
    }

    fn state(&self) -> u8 {
        self.state.load(Ordering::Acquire)
    }

    /// Arrive and block until the phase drains (or the barrier breaks),
    /// returning this arrival's 0-based index. Shared by `Latch` (one
    /// phase, never reset) and the cyclic/resettable variants (phase
    /// counter advances and the barrier returns to FILLING on drain).
    fn wait(&self, adapter: &dyn RuntimeAdapter, deadline: Option<Instant>, cyclic: bool) -> Result<u64, BrokenBarrierError> {
        if self.state() == BROKEN {
            return Err(StateError::BrokenBarrier.into());
        }
        let index = {
            let mut next = self.next_index.lock().unwrap();
            let i = *next;
            *next += 1;
            i
        };
        // A zero-party latch never auto-trips on arrival count; it can
        // only be released by an explicit `abort` (which `break_barrier`
        // turns into a `notify_all` on this same queue).
        if self.parties != 0 {
            let arrived = self.arrived.fetch_add(1, Ordering::AcqRel) + 1;
            if arrived == self.parties {
                self.drain(cyclic);
                return Ok(index);
            }
        }
        let event = Event::new(adapter.create_waiter(), false);
        self.queue.append(event.clone());
        if self.state() != FILLING {
            // Either drained or broke between our arrival bump and our
            // enqueue; resolve immediately instead of parking.
            self.queue.cancel_and_remove(&event);
            return self.resolve_after_arrival(index);
        }
        if event.wait(adapter, deadline) {
            return self.resolve_after_arrival(index);
        }
        if self.queue.on_cancelled(&event) == crate::wait::RemoveOutcome::StolenSuccess {
            return self.resolve_after_arrival(index);
        }
        // Our own wait failed (timeout/cancellation) without ever being
        // resolved by the drain or another abort — that is itself a
        // breaking condition.
        self.break_barrier();
        Err(WaitError::TimedOut.into())
    }

    fn resolve_after_arrival(&self, index: u64) -> Result<u64, BrokenBarrierError> {
        if self.state() == BROKEN {
            Err(StateError::BrokenBarrier.into())
        } else {
            Ok(index)
        }
    }

    fn drain(&self, cyclic: bool) {
        if self
            .state
            .compare_exchange(FILLING, DRAINING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        self.queue.notify_all();
        if cyclic {
            self.arrived.store(0, Ordering::Release);
            *self.next_index.lock().unwrap() = 0;
            self.phase.fetch_add(1, Ordering::AcqRel);
            self.state.store(FILLING, Ordering::Release);
        }
    }

    /// Flip to BROKEN, racing any concurrent successful drain; whichever
    /// transition's CAS wins defines the outcome for not-yet-woken tasks.
    fn break_barrier(&self) {
        if self
            .state
            .compare_exchange(FILLING, BROKEN, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            log::warn!(
                "barrier {self:p} broken with {}/{} parties arrived",
                self.arrived.load(Ordering::Acquire),
                self.parties
            );
            self.queue.notify_all();
        }
    }

    fn reset(&self) {
        self.break_barrier();
        self.queue.notify_all();
        self.arrived.store(0, Ordering::Release);
        *self.next_index.lock().unwrap() = 0;
        self.phase.fetch_add(1, Ordering::AcqRel);
        self.state.store(FILLING, Ordering::Release);
    }
}

/// A single-use barrier: once `parties` tasks have called `wait`, all of
/// them (and any subsequent caller) proceed. `parties=0` never auto-trips
/// and can only be released via [`Latch::abort`].
pub struct Latch {
    shared: Shared,
}

impl Latch {
    pub fn new(parties: u64) -> Self {
        Self { shared: Shared::new(parties) }
    }

    pub fn arrived(&self) -> u64 {
        self.shared.arrived.load(Ordering::Acquire)
    }

    pub fn wait(&self, adapter: &dyn RuntimeAdapter) -> Result<u64, BrokenBarrierError> {
        self.shared.wait(adapter, None, false)
    }

    pub fn wait_timeout(
        &self,
        adapter: &dyn RuntimeAdapter,
        timeout: Duration,
    ) -> Result<u64, BrokenBarrierError> {
        let deadline = Instant::checked_add(adapter.monotonic_now(), timeout)
            .unwrap_or_else(|| adapter.monotonic_now());
        self.shared.wait(adapter, Some(deadline), false)
    }

    pub fn abort(&self) {
        self.shared.break_barrier();
    }

    pub fn is_broken(&self) -> bool {
        self.shared.state() == BROKEN
    }
}

impl std::fmt::Debug for Latch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Latch").field("arrived", &self.arrived()).field("broken", &self.is_broken()).finish()
    }
}

/// A cyclic barrier: after every arrival drains, the barrier resets to
/// FILLING and a phase counter advances. Each arrival is assigned a
/// 0-based index within its phase, in arrival order.
pub struct Barrier {
    shared: Shared,
}

impl Barrier {
    pub fn new(parties: u64) -> Self {
        Self { shared: Shared::new(parties) }
    }

    pub fn parties(&self) -> u64 {
        self.shared.parties
    }

    pub fn phase(&self) -> u64 {
        self.shared.phase.load(Ordering::Acquire)
    }

    pub fn wait(&self, adapter: &dyn RuntimeAdapter) -> Result<u64, BrokenBarrierError> {
        self.shared.wait(adapter, None, true)
    }

    pub fn wait_timeout(
        &self,
        adapter: &dyn RuntimeAdapter,
        timeout: Duration,
    ) -> Result<u64, BrokenBarrierError> {
        let deadline = Instant::checked_add(adapter.monotonic_now(), timeout)
            .unwrap_or_else(|| adapter.monotonic_now());
        self.shared.wait(adapter, Some(deadline), true)
    }

    pub fn abort(&self) {
        self.shared.break_barrier();
    }

    pub fn is_broken(&self) -> bool {
        self.shared.state() == BROKEN
    }
}

impl std::fmt::Debug for Barrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Barrier").field("phase", &self.phase()).field("broken", &self.is_broken()).finish()
    }
}

/// A cyclic barrier that additionally supports [`RBarrier::reset`], which
/// forces any current waiters into BROKEN and clears back to a fresh
/// FILLING phase.
pub struct RBarrier {
    shared: Shared,
}

impl RBarrier {
    pub fn new(parties: u64) -> Self {
        Self { shared: Shared::new(parties) }
    }

    pub fn phase(&self) -> u64 {
        self.shared.phase.load(Ordering::Acquire)
    }

    pub fn wait(&self, adapter: &dyn RuntimeAdapter) -> Result<u64, BrokenBarrierError> {
        self.shared.wait(adapter, None, true)
    }

    pub fn wait_timeout(
        &self,
        adapter: &dyn RuntimeAdapter,
        timeout: Duration,
    ) -> Result<u64, BrokenBarrierError> {
        let deadline = Instant::checked_add(adapter.monotonic_now(), timeout)
            .unwrap_or_else(|| adapter.monotonic_now());
        self.shared.wait(adapter, Some(deadline), true)
    }

    pub fn abort(&self) {
        self.shared.break_barrier();
    }

    pub fn reset(&self) {
        self.shared.reset();
    }

    pub fn is_broken(&self) -> bool {
        self.shared.state() == BROKEN
    }
}

impl std::fmt::Debug for RBarrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RBarrier").field("phase", &self.phase()).field("broken", &self.is_broken()).finish()
    }
}
