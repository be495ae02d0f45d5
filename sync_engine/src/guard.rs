//! Non-blocking, signal-safe primitives: a one-slot claim guard and a
//! set-once typed container.

use spin::Mutex as SpinMutex;
use std::sync::atomic::{AtomicBool, Ordering};

use sync_core::StateError;

/// A one-slot claim primitive. `try_claim` sets an "in-use" flag via CAS;
/// a concurrent attempt while it's held fails with `BusyResource`. Never
/// blocks, so it is safe to call from a signal handler.
pub struct ResourceGuard {
    claimed: AtomicBool,
}

impl ResourceGuard {
    pub fn new() -> Self {
        Self { claimed: AtomicBool::new(false) }
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }

    pub fn try_claim(&self) -> Result<(), StateError> {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| StateError::BusyResource)
    }

    pub fn release(&self) {
        self.claimed.store(false, Ordering::Release);
    }
}

impl Default for ResourceGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResourceGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceGuard").field("claimed", &self.is_claimed()).finish()
    }
}

/// A one-slot, set-once container. `get` returns the stored value if any,
/// else a caller-supplied default; `set` stores a value, overwriting
/// whatever was there (the "once" naming reflects typical usage, not an
/// enforced invariant — unlike [`ResourceGuard`] this never refuses a
/// write). Never blocks; backed by a spinlock rather than an OS mutex so it
/// stays safe to touch from a signal handler on the same thread.
pub struct Flag<T> {
    value: SpinMutex<Option<T>>,
}

impl<T: Clone> Flag<T> {
    pub fn new() -> Self {
        Self { value: SpinMutex::new(None) }
    }

    pub fn get(&self, default: T) -> T {
        self.value.lock().clone().unwrap_or(default)
    }

    pub fn get_opt(&self) -> Option<T> {
        self.value.lock().clone()
    }

    pub fn set(&self, value: T) {
        *self.value.lock() = Some(value);
    }

    pub fn is_set(&self) -> bool {
        self.value.lock().is_some()
    }
}

impl<T: Clone> Default for Flag<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + std::fmt::Debug> std::fmt::Debug for Flag<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flag").field("value", &self.get_opt()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_rejects_concurrent_claim() {
        let guard = ResourceGuard::new();
        guard.try_claim().unwrap();
        assert_eq!(guard.try_claim(), Err(StateError::BusyResource));
        guard.release();
        guard.try_claim().unwrap();
    }

    #[test]
    fn flag_defaults_until_set() {
        let flag: Flag<i32> = Flag::new();
        assert_eq!(flag.get(7), 7);
        flag.set(42);
        assert_eq!(flag.get(7), 42);
        assert!(flag.is_set());
    }
}
