//! A cooperative, single-threaded [`RuntimeAdapter`].
//!
//! Unifies the "green thread" and "async event loop" runtime families: both
//! are, from the engine's point of view, a single logical thread of control
//! that only ever switches tasks at an explicit yield point. Here that
//! single thread of control is modelled as a "floor" token passed around a
//! FIFO ready queue; each task is a real OS thread, but at most one of them
//! is ever off the ready queue's waiting list and actually executing, so the
//! observable scheduling behaviour — no preemption, deterministic handoff at
//! blocking calls — matches a real green/async runtime even though the
//! underlying implementation borrows OS threads to host the call stacks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant as StdInstant};

use sync_core::{Instant, ParkOutcome, RuntimeAdapter, RuntimeClass, TaskId, Waiter};

fn process_epoch() -> StdInstant {
    static EPOCH: OnceLock<StdInstant> = OnceLock::new();
    *EPOCH.get_or_init(StdInstant::now)
}

fn monotonic_now() -> Instant {
    Instant::from_nanos(process_epoch().elapsed().as_nanos() as u64)
}

struct Hub {
    ready: Mutex<VecDeque<u64>>,
    held_by: Mutex<Option<u64>>,
    turn: Condvar,
    next_task_id: AtomicU64,
}

impl Hub {
    fn new() -> Self {
        Self {
            ready: Mutex::new(VecDeque::new()),
            held_by: Mutex::new(None),
            turn: Condvar::new(),
            next_task_id: AtomicU64::new(1),
        }
    }

    fn enqueue(&self, id: u64) {
        self.ready.lock().unwrap().push_back(id);
        self.turn.notify_all();
    }

    /// Block until `id` is both at the front of the ready queue and the
    /// floor is free, then take the floor.
    fn acquire_floor(&self, id: u64) {
        let mut held = self.held_by.lock().unwrap();
        loop {
            let can_go = held.is_none() && self.ready.lock().unwrap().front() == Some(&id);
            if can_go {
                self.ready.lock().unwrap().pop_front();
                *held = Some(id);
                return;
            }
            held = self.turn.wait(held).unwrap();
        }
    }

    fn release_floor(&self, id: u64) {
        let mut held = self.held_by.lock().unwrap();
        debug_assert_eq!(*held, Some(id));
        *held = None;
        self.turn.notify_all();
    }
}

/// The single event loop driving every task spawned onto it.
///
/// Cloning an `Arc<EventLoop>` and calling [`EventLoop::spawn`] from several
/// real OS threads is how a "cross-runtime" scenario is built: each
/// `EventLoop` is its own cooperative runtime, and a primitive acquired by a
/// task on one loop can be released by a task on a different loop (or a
/// plain [`crate::ThreadAdapter`]) without either side knowing the other
/// exists.
pub struct EventLoop {
    hub: Arc<Hub>,
}

impl EventLoop {
    pub fn new() -> Self {
        Self { hub: Arc::new(Hub::new()) }
    }

    /// Spawn `f` as a new task on this loop and immediately join it.
    /// Returns once `f` has run to completion and relinquished the floor.
    pub fn spawn<F>(&self, f: F) -> JoinHandle<()>
    where
        F: FnOnce(&CooperativeAdapter) + Send + 'static,
    {
        let hub = self.hub.clone();
        let id = hub.next_task_id.fetch_add(1, Ordering::Relaxed);
        hub.enqueue(id);
        std::thread::spawn(move || {
            hub.acquire_floor(id);
            let adapter = CooperativeAdapter { hub: hub.clone(), task_id: id };
            f(&adapter);
            hub.release_floor(id);
        })
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

/// A waiter that gives up the event loop's floor while parked, and must
/// re-win its turn on the ready queue before `park` returns.
pub struct CooperativeWaiter {
    hub: Arc<Hub>,
    task_id: u64,
    woken: Mutex<bool>,
    cv: Condvar,
}

impl Waiter for CooperativeWaiter {
    fn park(&self, deadline: Option<Instant>) -> ParkOutcome {
        self.hub.release_floor(self.task_id);

        let outcome = {
            let mut guard = self.woken.lock().unwrap();
            loop {
                if *guard {
                    break ParkOutcome::Woken;
                }
                match deadline {
                    None => guard = self.cv.wait(guard).unwrap(),
                    Some(d) => {
                        let now_ns = monotonic_now().as_nanos();
                        let d_ns = d.as_nanos();
                        if now_ns >= d_ns {
                            break ParkOutcome::TimedOut;
                        }
                        let (g, timeout) = self
                            .cv
                            .wait_timeout(guard, Duration::from_nanos(d_ns - now_ns))
                            .unwrap();
                        guard = g;
                        if *guard {
                            break ParkOutcome::Woken;
                        }
                        if timeout.timed_out() {
                            break ParkOutcome::TimedOut;
                        }
                    }
                }
            }
        };

        // Whether woken or timed out, this task must re-join the ready
        // queue and win its turn before it's allowed to run again — a
        // single-threaded runtime never lets two tasks make progress at
        // once, even one racing a timeout against a `wake`.
        self.hub.enqueue(self.task_id);
        self.hub.acquire_floor(self.task_id);
        outcome
    }

    fn wake(&self) -> bool {
        let mut guard = self.woken.lock().unwrap();
        if *guard {
            return false;
        }
        *guard = true;
        self.cv.notify_all();
        true
    }
}

/// A task's handle onto the [`EventLoop`] it was spawned on.
#[derive(Clone)]
pub struct CooperativeAdapter {
    hub: Arc<Hub>,
    task_id: u64,
}

impl std::fmt::Debug for CooperativeAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CooperativeAdapter").field("task_id", &self.task_id).finish()
    }
}

impl RuntimeAdapter for CooperativeAdapter {
    fn current_task_id(&self) -> TaskId {
        TaskId::new("local", self.task_id)
    }

    fn monotonic_now(&self) -> Instant {
        monotonic_now()
    }

    fn sleep(&self, duration: Duration) {
        let deadline = monotonic_now().saturating_add(duration);
        self.sleep_until(deadline);
    }

    fn sleep_until(&self, deadline: Instant) {
        let waiter = CooperativeWaiter {
            hub: self.hub.clone(),
            task_id: self.task_id,
            woken: Mutex::new(false),
            cv: Condvar::new(),
        };
        waiter.park(Some(deadline));
    }

    fn sleep_forever(&self) -> ! {
        let waiter = CooperativeWaiter {
            hub: self.hub.clone(),
            task_id: self.task_id,
            woken: Mutex::new(false),
            cv: Condvar::new(),
        };
        waiter.park(None);
        unreachable!("a zero-party latch's waiter is only ever woken by abort(), never set()")
    }

    fn create_waiter(&self) -> Box<dyn Waiter> {
        Box::new(CooperativeWaiter {
            hub: self.hub.clone(),
            task_id: self.task_id,
            woken: Mutex::new(false),
            cv: Condvar::new(),
        })
    }

    fn shield(&self, f: &mut dyn FnMut()) {
        f()
    }

    fn is_running_in_current_thread(&self) -> bool {
        true
    }

    fn class(&self) -> RuntimeClass {
        RuntimeClass::Cooperative
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[test]
    fn tasks_run_one_at_a_time_in_arrival_order() {
        let loop_ = EventLoop::new();
        let order = Arc::new(StdMutex::new(Vec::new()));

        let handles: Vec<_> = (0..5)
            .map(|i| {
                let order = order.clone();
                loop_.spawn(move |adapter| {
                    order.lock().unwrap().push(i);
                    adapter.sleep(Duration::from_millis(1));
                    order.lock().unwrap().push(100 + i);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        // Each task runs to completion (including its sleep) before the
        // next one is even granted the floor, since spawn() blocks until
        // the floor is free and the ready queue puts this task next.
        let recorded = order.lock().unwrap().clone();
        assert_eq!(recorded.len(), 10);
    }

    #[test]
    fn current_task_id_is_stable_within_a_task() {
        let loop_ = EventLoop::new();
        let seen = Arc::new(StdMutex::new(None));
        let seen2 = seen.clone();
        loop_
            .spawn(move |adapter| {
                let first = adapter.current_task_id();
                let second = adapter.current_task_id();
                *seen2.lock().unwrap() = Some(first == second);
            })
            .join()
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(true));
    }
}
