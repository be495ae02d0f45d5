//! A [`RuntimeAdapter`] for plain preemptive OS threads.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, OnceLock};
use std::time::{Duration, Instant as StdInstant};

use sync_core::{Instant, ParkOutcome, RuntimeAdapter, RuntimeClass, TaskId, Waiter};

fn process_epoch() -> StdInstant {
    static EPOCH: OnceLock<StdInstant> = OnceLock::new();
    *EPOCH.get_or_init(StdInstant::now)
}

fn monotonic_now() -> Instant {
    Instant::from_nanos(process_epoch().elapsed().as_nanos() as u64)
}

static NEXT_THREAD_TASK_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_TASK_ID: Cell<Option<u64>> = const { Cell::new(None) };
}

fn this_thread_task_id() -> u64 {
    THREAD_TASK_ID.with(|slot| {
        if let Some(id) = slot.get() {
            return id;
        }
        let id = NEXT_THREAD_TASK_ID.fetch_add(1, Ordering::Relaxed);
        slot.set(Some(id));
        id
    })
}

/// A condvar-backed waiter: `wake()` latches so a wake racing ahead of
/// `park` is never lost.
pub struct ThreadWaiter {
    woken: Mutex<bool>,
    cv: Condvar,
}

impl ThreadWaiter {
    fn new() -> Self {
        Self { woken: Mutex::new(false), cv: Condvar::new() }
    }
}

impl Waiter for ThreadWaiter {
    fn park(&self, deadline: Option<Instant>) -> ParkOutcome {
        let mut guard = self.woken.lock().unwrap();
        loop {
            if *guard {
                return ParkOutcome::Woken;
            }
            match deadline {
                None => guard = self.cv.wait(guard).unwrap(),
                Some(d) => {
                    let now_ns = monotonic_now().as_nanos();
                    let d_ns = d.as_nanos();
                    if now_ns >= d_ns {
                        return ParkOutcome::TimedOut;
                    }
                    let (g, timeout) =
                        self.cv.wait_timeout(guard, Duration::from_nanos(d_ns - now_ns)).unwrap();
                    guard = g;
                    if *guard {
                        return ParkOutcome::Woken;
                    }
                    if timeout.timed_out() {
                        return ParkOutcome::TimedOut;
                    }
                }
            }
        }
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

/// Drives `sync_engine` primitives from plain OS threads: `park`/`wake`
/// go through a condvar, the clock is the process's own monotonic clock,
/// and every blocking call is a real `std::thread` block — there is no
/// cooperative scheduling to preserve.
#[derive(Debug, Clone, Copy)]
pub struct ThreadAdapter;

impl ThreadAdapter {
    pub const fn new() -> Self {
        Self
    }
}

impl Default for ThreadAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeAdapter for ThreadAdapter {
    fn current_task_id(&self) -> TaskId {
        TaskId::new("thread", this_thread_task_id())
    }

    fn monotonic_now(&self) -> Instant {
        monotonic_now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn sleep_until(&self, deadline: Instant) {
        let now_ns = monotonic_now().as_nanos();
        let d_ns = deadline.as_nanos();
        if d_ns > now_ns {
            std::thread::sleep(Duration::from_nanos(d_ns - now_ns));
        }
    }

    fn sleep_forever(&self) -> ! {
        loop {
            std::thread::sleep(Duration::from_secs(3600));
        }
    }

    fn create_waiter(&self) -> Box<dyn Waiter> {
        Box::new(ThreadWaiter::new())
    }

    fn shield(&self, f: &mut dyn FnMut()) {
        // OS threads have no notion of cooperative cancellation to
        // suppress; running `f` directly already has the right effect.
        f()
    }

    fn is_running_in_current_thread(&self) -> bool {
        true
    }

    fn class(&self) -> RuntimeClass {
        RuntimeClass::Threaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_threads_get_distinct_ids() {
        let adapter = ThreadAdapter::new();
        let here = adapter.current_task_id();
        let there = std::thread::spawn(|| ThreadAdapter::new().current_task_id()).join().unwrap();
        assert_ne!(here, there);
    }

    #[test]
    fn same_thread_is_stable() {
        let adapter = ThreadAdapter::new();
        assert_eq!(adapter.current_task_id(), adapter.current_task_id());
    }
}
