//!
//! External collaborators
//!
//! The acquisition loop drains an external event loop and cooperates with
//! a garbage collector before it parks, but owns neither. Both are
//! referenced only through these trait contracts; a host that has no use
//! for one plugs in the no-op implementation below.
//!

/// A non-blocking, pollable source of additional work (the design's
/// "external event loop" - in the original system, libuv). The scheduler
/// never assumes anything about what runs inside it beyond: polling it may
/// produce runnable tasks as a side effect, and at most one worker should
/// own it at a time.
pub trait ExternalEventLoop: Send + Sync {
    /// Run one pass. Returns `true` if it did any work, so the caller
    /// should reset its spin counter and retry the multi-queue before
    /// considering parking again. Ordinary calls (without a prior
    /// `try_claim`) must not block; a caller that successfully claimed the
    /// loop is allowed to let this block up to the host's own timeout,
    /// since it has committed to owning the wait instead of parking on
    /// its own slot.
    fn poll(&self) -> bool;

    /// Best-effort, non-blocking attempt to become the sole owner of the
    /// event loop for a blocking wait. `false` means another worker
    /// already claimed it; the caller falls back to its own park slot.
    fn try_claim(&self) -> bool;

    /// Release a claim taken by `try_claim`.
    fn release_claim(&self);

    /// Break a blocking `poll()` out of whatever it is waiting on (the
    /// original runtime's `uv_stop`/`jl_wake_libuv`). Called unconditionally
    /// by `wake_all`, alongside the park-slot fan-out, so a worker that
    /// currently owns the event loop notices the wakeup promptly instead of
    /// waiting out the host's own poll timeout.
    fn interrupt(&self);
}

/// The default when a host has no event loop to drain: every worker parks
/// on its own slot, exactly as if `ExternalEventLoop` did not exist.
pub struct NoEventLoop;

impl ExternalEventLoop for NoEventLoop {
    fn poll(&self) -> bool {
        false
    }

    fn try_claim(&self) -> bool {
        false
    }

    fn release_claim(&self) {}
    fn interrupt(&self) {}
}

/// Garbage-collector cooperation points the acquisition loop visits while
/// looking for work and before it blocks. A stop-the-world collector uses
/// `safepoint` to pause a worker that is merely spinning, and brackets the
/// blocking wait itself with `enter_safe_region`/`exit_safe_region` so a
/// parked worker doesn't hold up a collection cycle.
pub trait GcCooperator: Send + Sync {
    /// Pause here if a collection is pending. Called once per spin
    /// iteration and once per acquisition-loop pass.
    fn safepoint(&self);

    /// Entered immediately before a blocking park; a collector may treat
    /// workers inside a safe region as already paused.
    fn enter_safe_region(&self);

    /// Exited immediately after returning from a blocking park (whether
    /// woken or timed out).
    fn exit_safe_region(&self);
}

/// The default when a host has no collector, or one that never needs a
/// worker's cooperation to pause it.
pub struct NoGc;

impl GcCooperator for NoGc {
    fn safepoint(&self) {}
    fn enter_safe_region(&self) {}
    fn exit_safe_region(&self) {}
}
