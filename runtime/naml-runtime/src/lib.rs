//!
//! naml-runtime - Scheduler runtime aggregator
//!
//! Owns the process-wide construction the scheduler core itself stays
//! agnostic to: reading `SLEEP_THRESHOLD` from the environment, installing
//! a `tracing` subscriber, and exposing the `extern "C"` ABI an
//! AOT-compiled naml program links against (`naml_sched_*`), mirroring the
//! rest of the naml standard library's raw-pointer FFI convention
//! (`naml_mutex_*`).
//!
//! Rust hosts that own their own task type do not need the FFI surface at
//! all - they can depend on `naml-std-scheduler` directly and build a
//! `Scheduler<MyTaskType>` themselves. This crate exists for the non-Rust
//! embedding case, and for the one thing a library must not do for
//! itself: decide process-wide logging and configuration unprompted.
//!

pub mod config;
pub mod ffi;

use std::sync::Once;

pub use naml_std_scheduler::{
    ExternalEventLoop, GcCooperator, NoEventLoop, NoGc, RawTaskHandle, Scheduler, SchedulerError,
    TaskCell, TaskHandle,
};

static LOGGING_INIT: Once = Once::new();

/// Installs a `tracing_subscriber::fmt()` subscriber the same way
/// `naml-lsp`'s `main.rs` does (stderr, no ANSI), but only once per
/// process and only if the embedding host has not already installed a
/// subscriber of its own - this crate is a library, not a binary, and
/// must not clobber a host's logging setup.
fn init_logging() {
    LOGGING_INIT.call_once(|| {
        if !tracing::dispatcher::has_been_set() {
            tracing_subscriber::fmt().with_writer(std::io::stderr).with_ansi(false).init();
        }
    });
}

/// Reads `SLEEP_THRESHOLD` from the environment and builds a scheduler
/// over [`RawTaskHandle`] for `n_workers` workers, with no external event
/// loop or GC cooperator plugged in. Hosts embedding their own event loop
/// or collector should construct `Scheduler::with_collaborators` directly
/// instead of calling this.
pub fn init(n_workers: usize) -> Result<Scheduler<RawTaskHandle>, SchedulerError> {
    init_logging();
    let sleep_threshold = config::sleep_threshold_from_env()?;
    tracing::info!(n_workers, ?sleep_threshold, "scheduler initialized");
    Ok(Scheduler::with_config(
        n_workers,
        naml_std_scheduler::TASKS_PER_HEAP,
        sleep_threshold,
        NoEventLoop,
        NoGc,
    ))
}
