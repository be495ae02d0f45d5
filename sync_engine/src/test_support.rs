//! A minimal in-process [`RuntimeAdapter`] used only by this crate's own
//! unit tests. Kept internal rather than pulled from `sync_runtime_std`,
//! since that crate depends on this one and a dev-dependency back onto it
//! would be circular.

#![cfg(test)]

use std::sync::{Condvar, Mutex, OnceLock};
use std::time::{Duration, Instant as StdInstant};

use sync_core::{Instant, ParkOutcome, RuntimeAdapter, RuntimeClass, TaskId, Waiter};

fn epoch() -> StdInstant {
    static EPOCH: OnceLock<StdInstant> = OnceLock::new();
    *EPOCH.get_or_init(StdInstant::now)
}

pub fn now() -> Instant {
    Instant::from_nanos(epoch().elapsed().as_nanos() as u64)
}

/// A condvar-backed waiter: latches `wake()` so a `wake` that races ahead
/// of `park` is never lost.
pub struct LoopbackWaiter {
    woken: Mutex<bool>,
    cv: Condvar,
}

impl LoopbackWaiter {
    pub fn new() -> Self {
        Self { woken: Mutex::new(false), cv: Condvar::new() }
    }
}

impl Default for LoopbackWaiter {
    fn default() -> Self {
        Self::new()
    }
}

impl Waiter for LoopbackWaiter {
    fn park(&self, deadline: Option<Instant>) -> ParkOutcome {
        let mut guard = self.woken.lock().unwrap();
        loop {
            if *guard {
                return ParkOutcome::Woken;
            }
            match deadline {
                None => guard = self.cv.wait(guard).unwrap(),
                Some(d) => {
                    let now_ns = now().as_nanos();
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

#[derive(Debug, Clone)]
pub struct TestAdapter {
    pub name: &'static str,
    pub task: u64,
}

impl TestAdapter {
    pub fn new(name: &'static str, task: u64) -> Self {
        Self { name, task }
    }
}

impl RuntimeAdapter for TestAdapter {
    fn current_task_id(&self) -> TaskId {
        TaskId::new(self.name, self.task)
    }

    fn monotonic_now(&self) -> Instant {
        now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn sleep_until(&self, deadline: Instant) {
        let now_ns = now().as_nanos();
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
        Box::new(LoopbackWaiter::new())
    }

    fn shield(&self, f: &mut dyn FnMut()) {
        f()
    }

    fn is_running_in_current_thread(&self) -> bool {
        true
    }

    fn class(&self) -> RuntimeClass {
        RuntimeClass::Threaded
    }
}
