//! Signal-safety context.
//!
//! Runtime-detection code (out of scope for this crate, §1) must not try to
//! invoke a cooperative runtime's hub/event-loop APIs from a context where
//! that is unsafe — inside a signal handler, or inside a destructor running
//! on a thread that is itself unwinding through engine code. This module is
//! the thread-local flag that code makes that decision from.
//!
//! Grounded on `r3_port_std`'s own care around async-signal-safety in
//! `threading_unix.rs`: its remote-park signal handler reads a `#[thread_local]
//! AtomicPtr` directly rather than going through `pthread_getspecific`,
//! because the latter is not documented as async-signal-safe by POSIX. The
//! same constraint applies here in spirit — whatever this flag's storage is,
//! checking it must never allocate, lock, or call into libc, so that it can
//! itself be read from inside a signal handler on the same thread. A plain
//! thread-local `Cell<u32>` satisfies that: `Cell::get`/`set` are just loads
//! and stores.

use std::cell::Cell;

thread_local! {
    static DISABLE_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// True if the calling thread is currently inside a scope where touching a
/// cooperative runtime's APIs is unsafe. Engine code never calls this
/// itself (runtime detection is out of scope); it exists for adapter
/// implementations to consult before doing their own detection work.
pub fn is_signal_unsafe() -> bool {
    DISABLE_DEPTH.with(|d| d.get() > 0)
}

/// Enter a scope in which [`is_signal_unsafe`] reports true for the calling
/// thread, until the returned guard is dropped. Nestable: the underlying
/// counter is a depth, not a flag, so an inner guard dropping early doesn't
/// prematurely clear an outer one.
pub fn enter_signal_unsafe() -> SignalUnsafeGuard {
    DISABLE_DEPTH.with(|d| d.set(d.get().saturating_add(1)));
    SignalUnsafeGuard { _private: () }
}

/// RAII token returned by [`enter_signal_unsafe`]. Restores the previous
/// depth on drop.
#[must_use]
pub struct SignalUnsafeGuard {
    _private: (),
}

impl Drop for SignalUnsafeGuard {
    fn drop(&mut self) {
        DISABLE_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_safe() {
        assert!(!is_signal_unsafe());
    }

    #[test]
    fn nested_guards_track_depth() {
        assert!(!is_signal_unsafe());
        let outer = enter_signal_unsafe();
        assert!(is_signal_unsafe());
        {
            let inner = enter_signal_unsafe();
            assert!(is_signal_unsafe());
            drop(inner);
        }
        assert!(is_signal_unsafe(), "outer guard must still be held");
        drop(outer);
        assert!(!is_signal_unsafe());
    }
}
