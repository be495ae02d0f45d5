//! Monotonic timestamps.
//!
//! Each runtime adapter may have its own notion of "now" (a virtual clock
//! under a test harness, the OS monotonic clock for real threads), so the
//! engine never calls [`std::time::Instant::now`] directly — it always goes
//! through [`RuntimeAdapter::monotonic_now`](crate::RuntimeAdapter::monotonic_now)
//! and stores/compares the nanosecond count it returns.

use std::fmt;
use std::time::Duration;

/// Nanoseconds since an adapter-defined epoch. Only comparable to other
/// `Instant`s produced by the same adapter.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instant(u64);

impl Instant {
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    pub fn checked_add(self, dur: Duration) -> Option<Self> {
        self.0.checked_add(dur.as_nanos().try_into().ok()?).map(Self)
    }

    pub fn saturating_add(self, dur: Duration) -> Self {
        Self(self.0.saturating_add(dur.as_nanos().try_into().unwrap_or(u64::MAX)))
    }

    pub fn duration_since(self, earlier: Self) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }

    pub fn has_elapsed(self, now: Self) -> bool {
        now >= self
    }
}

impl fmt::Debug for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}
