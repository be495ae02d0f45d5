//! Error taxonomy.
//!
//! Operational outcomes (acquired/not-acquired, item/no-item) are not
//! errors at all — they are returned by value from the primitives
//! themselves (`bool`, `Option<T>`). What lives here are the three kinds
//! spec.md actually wants surfaced as typed errors: state violations,
//! programmer errors, and the timeout/cancellation pair that every blocking
//! verb can produce.

use thiserror::Error;

/// Why a blocking wait did not complete with the value the caller wanted.
/// Produced by every timed or cancellable `wait`/`acquire`/`get`/`put`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WaitError {
    #[error("operation timed out")]
    TimedOut,
    #[error("operation was cancelled")]
    Cancelled,
}

/// A recoverable violation of a primitive's state contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("barrier is broken")]
    BrokenBarrier,
    #[error("resource is already claimed")]
    BusyResource,
    #[error("queue is empty")]
    QueueEmpty,
    #[error("queue is full")]
    QueueFull,
}

/// Caller misuse of an otherwise well-formed primitive.
///
/// spec.md's §6/§7 taxonomy also names "negative parties" and "negative
/// timeout" as programmer errors, but this crate's constructors take
/// `parties: u64` and its deadlines are built from `Duration`, so neither
/// is representable to begin with — the type system already rejects them,
/// with no runtime check (and no variant here) needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProgrammerError {
    #[error("count must be at least 1")]
    NonPositiveCount,
    #[error("max_size must be positive")]
    NonPositiveMaxSize,
    #[error("release called without a matching acquire")]
    ReleaseWithoutAcquire,
    #[error("release would exceed max_value")]
    SemaphoreOverRelease,
    #[error("release called by a task that is not the owner")]
    WrongOwner,
}

/// Combined error returned by a blocking acquire-style call: either the
/// wait didn't resolve in the caller's favor, or the caller misused the
/// API. Kept as one enum per verb family rather than a single catch-all,
/// since this engine's surface is a handful of typed Rust methods, not a
/// syscall table that needs one error code space for everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AcquireError {
    #[error(transparent)]
    Wait(#[from] WaitError),
    #[error(transparent)]
    Programmer(#[from] ProgrammerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReleaseError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Programmer(#[from] ProgrammerError),
}
