//! Process-wide configuration.
//!
//! Resolved once from the environment via `once_cell::sync::OnceCell` and
//! never re-read afterwards, with a thread-local override stack for tests
//! and call sites that need a different answer than the process default.

use once_cell::sync::OnceCell;
use std::cell::RefCell;
use std::env;

/// The process-wide tunables that affect fairness and checkpoint behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Strict FIFO wakeup with eager removal of cancelled waiters, vs.
    /// tombstoned removal with amortized compaction.
    pub perfect_fairness: bool,
    /// Whether a successful green-runtime blocking call inserts a
    /// checkpoint even when it resolves without blocking.
    pub green_checkpoints: bool,
    /// Same, for async-runtime callers.
    pub async_checkpoints: bool,
}

impl Default for Config {
    /// Relaxed (tombstoned) fairness by default: strict FIFO only pays for
    /// itself under a single global lock serializing all access, which a
    /// systems-language implementation that runs genuinely in parallel
    /// does not have. Both checkpoint flags default on, matching every
    /// runtime class currently supported.
    fn default() -> Self {
        Self {
            perfect_fairness: false,
            green_checkpoints: true,
            async_checkpoints: true,
        }
    }
}

impl Config {
    fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = parse_bool_env("PERFECT_FAIRNESS") {
            cfg.perfect_fairness = v;
        }
        if let Some(v) = parse_bool_env("GREEN_CHECKPOINTS") {
            cfg.green_checkpoints = v;
        }
        if let Some(v) = parse_bool_env("ASYNC_CHECKPOINTS") {
            cfg.async_checkpoints = v;
        }
        cfg
    }
}

fn parse_bool_env(key: &str) -> Option<bool> {
    match env::var(key).ok()?.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        other => {
            log::warn!("ignoring unrecognized value {other:?} for {key}");
            None
        }
    }
}

static GLOBAL: OnceCell<Config> = OnceCell::new();

thread_local! {
    static OVERRIDE_STACK: RefCell<Vec<Config>> = RefCell::new(Vec::new());
}

/// The process-wide configuration, resolved from the environment on first
/// access and cached for the remainder of the process's lifetime.
pub fn global_config() -> Config {
    *GLOBAL.get_or_init(Config::from_env)
}

/// The configuration in effect for the calling thread right now: the
/// innermost [`with_config_override`] scope if any, otherwise
/// [`global_config`].
pub fn current_config() -> Config {
    OVERRIDE_STACK.with(|stack| stack.borrow().last().copied()).unwrap_or_else(global_config)
}

/// Run `f` with `cfg` in effect for the calling thread, restoring whatever
/// was in effect before on return (even if `f` panics).
pub fn with_config_override<R>(cfg: Config, f: impl FnOnce() -> R) -> R {
    OVERRIDE_STACK.with(|stack| stack.borrow_mut().push(cfg));
    struct Pop;
    impl Drop for Pop {
        fn drop(&mut self) {
            OVERRIDE_STACK.with(|stack| {
                stack.borrow_mut().pop();
            });
        }
    }
    let _pop = Pop;
    f()
}
