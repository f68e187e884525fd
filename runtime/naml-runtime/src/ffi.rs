//!
//! C ABI surface
//!
//! Exposes the scheduler to an AOT-compiled naml host as a handful of
//! `extern "C"` functions over an opaque scheduler pointer and
//! `RawTaskHandle`, the same raw-pointer discipline the rest of the naml
//! standard library uses (`naml_mutex_*`, `naml_spawn_closure`). The host
//! owns every `TaskCell` it passes in; this module never allocates or
//! frees one.
//!

use std::ffi::c_void;
use std::ptr::NonNull;

use naml_std_scheduler::{NoEventLoop, NoGc, RawTaskHandle, Scheduler, TaskCell};

/// Opaque from the host's point of view; only ever touched through the
/// functions in this module.
pub type NamlScheduler = Scheduler<RawTaskHandle, NoEventLoop, NoGc>;

/// Allocate and initialize a scheduler for `n_workers` workers, reading
/// `SLEEP_THRESHOLD` from the environment. A malformed `SLEEP_THRESHOLD`
/// is logged and falls back to the default threshold rather than failing
/// the call - there is no `Result` to hand back across this boundary, and
/// the same misconfiguration is already surfaced to a Rust caller of
/// [`crate::init`] as an `Err`.
#[unsafe(no_mangle)]
pub extern "C" fn naml_sched_init(n_workers: usize) -> *mut NamlScheduler {
    let sched = match crate::init(n_workers) {
        Ok(sched) => sched,
        Err(err) => {
            tracing::error!(%err, "invalid SLEEP_THRESHOLD, falling back to default");
            Scheduler::with_collaborators(n_workers, NoEventLoop, NoGc)
        }
    };
    Box::into_raw(Box::new(sched))
}

/// # Safety
/// `sched` must be a pointer returned by [`naml_sched_init`] and not
/// already freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn naml_sched_free(sched: *mut NamlScheduler) {
    if !sched.is_null() {
        drop(unsafe { Box::from_raw(sched) });
    }
}

/// # Safety
/// `sched` must be a live pointer from [`naml_sched_init`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn naml_sched_on_worker_start(sched: *mut NamlScheduler, tid: usize) {
    unsafe { &*sched }.on_worker_start(tid);
}

/// Insert `cell` at `priority`. Returns `0` on success, `1` if the shard
/// it landed in is full (`SchedulerError::CapacityExceeded`).
///
/// # Safety
/// `sched` must be a live pointer from [`naml_sched_init`]; `cell` must
/// stay valid for as long as the task may be enqueued or held by a
/// worker (i.e. at least until a matching `naml_sched_next` returns it).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn naml_sched_enqueue(
    sched: *mut NamlScheduler,
    cell: NonNull<TaskCell>,
    priority: i16,
) -> i32 {
    let handle = unsafe { RawTaskHandle::new(cell) };
    match unsafe { &*sched }.enqueue(handle, priority) {
        Ok(()) => 0,
        Err(err) => {
            tracing::error!(%err, "enqueue failed");
            1
        }
    }
}

/// Blocks until a task is available for worker `tid`, then returns it.
///
/// # Safety
/// `sched` must be a live pointer from [`naml_sched_init`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn naml_sched_next(sched: *mut NamlScheduler, tid: usize) -> *mut TaskCell {
    let task = unsafe { &*sched }.next(tid).expect("Scheduler::next never returns None");
    task.0.as_ptr()
}

/// # Safety
/// `sched` must be a live pointer from [`naml_sched_init`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn naml_sched_wake(sched: *mut NamlScheduler) {
    unsafe { &*sched }.wake_all();
}

/// Calls `visitor(task, ctx)` for every currently enqueued task. `ctx` is
/// passed through unexamined. The caller must guarantee concurrent
/// mutation of the scheduler is externally excluded for the duration of
/// this call (see `Scheduler::for_each_enqueued`).
///
/// # Safety
/// `sched` must be a live pointer from [`naml_sched_init`]; `visitor`
/// must be safe to call with the `TaskCell` pointers currently enqueued
/// and the given `ctx`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn naml_sched_for_each_enqueued(
    sched: *mut NamlScheduler,
    visitor: extern "C" fn(*mut TaskCell, *mut c_void),
    ctx: *mut c_void,
) {
    unsafe { &*sched }.for_each_enqueued(|task| visitor(task.0.as_ptr(), ctx));
}

#[cfg(test)]
mod tests {
    use super::*;
    use naml_std_scheduler::TaskHandle;
    use std::sync::atomic::Ordering;

    fn new_cell(priority: i16) -> NonNull<TaskCell> {
        let ptr = Box::into_raw(Box::new(TaskCell::new()));
        let handle = unsafe { RawTaskHandle::new(NonNull::new(ptr).unwrap()) };
        handle.set_priority(priority);
        NonNull::new(ptr).unwrap()
    }

    fn priority_of(ptr: *mut TaskCell) -> i16 {
        let handle = unsafe { RawTaskHandle::new(NonNull::new(ptr).unwrap()) };
        handle.priority()
    }

    #[test]
    fn round_trip_through_c_abi() {
        unsafe {
            let sched = naml_sched_init(1);
            naml_sched_on_worker_start(sched, 0);
            let cell = new_cell(0);
            assert_eq!(naml_sched_enqueue(sched, cell, 42), 0);
            let out = naml_sched_next(sched, 0);
            assert_eq!(out, cell.as_ptr());
            assert_eq!(priority_of(out), 42);
            naml_sched_free(sched);
            drop(Box::from_raw(cell.as_ptr()));
        }
    }

    #[test]
    fn for_each_enqueued_reaches_c_visitor() {
        unsafe {
            let sched = naml_sched_init(1);
            let cell = new_cell(7);
            naml_sched_enqueue(sched, cell, 7);

            extern "C" fn count(_task: *mut TaskCell, ctx: *mut c_void) {
                let counter = &*(ctx as *const std::sync::atomic::AtomicUsize);
                counter.fetch_add(1, Ordering::SeqCst);
            }

            let counter = std::sync::atomic::AtomicUsize::new(0);
            naml_sched_for_each_enqueued(sched, count, &counter as *const _ as *mut c_void);
            assert_eq!(counter.load(Ordering::SeqCst), 1);

            let out = naml_sched_next(sched, 0);
            naml_sched_free(sched);
            drop(Box::from_raw(out));
        }
    }
}
