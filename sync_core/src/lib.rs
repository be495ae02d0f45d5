//! Runtime-adapter contract, error taxonomy, and process configuration
//! shared by every `sync_engine` primitive.
//!
//! Defines the seam (`RuntimeAdapter`/`Waiter`) the engine is generic over
//! and the small set of shared types (errors, task identity, clock) every
//! primitive family needs, without containing any primitive logic itself.

mod adapter;
mod config;
mod error;
mod signal;
mod task;
mod time;

pub use adapter::{ParkOutcome, RuntimeAdapter, RuntimeClass, Waiter};
pub use config::{current_config, global_config, with_config_override, Config};
pub use error::{AcquireError, ProgrammerError, ReleaseError, StateError, WaitError};
pub use signal::{enter_signal_unsafe, is_signal_unsafe, SignalUnsafeGuard};
pub use task::TaskId;
pub use time::Instant;
