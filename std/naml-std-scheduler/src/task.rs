//!
//! Task handle contract
//!
//! The scheduler never owns, allocates, or frees task objects; it holds
//! non-owning references inside shard slots while a task is enqueued and
//! returns them to the caller on `next()`. Everything about a task beyond
//! `priority` and `owner_tid` - its closure, stack, and execution mechanism
//! - is an external collaborator's concern.
//!

use std::sync::atomic::{AtomicI16, Ordering};

/// The fields the scheduler reads and writes on an externally-owned task.
///
/// `priority` is lower-is-higher-priority, fixed by `set_priority` at
/// insertion time and read thereafter. `owner_tid` starts at `-1`
/// (unowned); the scheduler CASes it to a worker id to claim affinity and
/// never clears it back to `-1` itself.
pub trait TaskHandle: Clone + Send {
    /// Record the priority this task was enqueued with.
    fn set_priority(&self, priority: i16);

    /// The priority last recorded by `set_priority`.
    fn priority(&self) -> i16;

    /// The atomic cell backing `owner_tid`, for CAS-based claiming.
    fn owner_tid(&self) -> &AtomicI16;
}

/// `owner_tid` sentinel meaning "no worker has claimed this task yet".
pub const UNOWNED: i16 = -1;

/// A plain in-process task cell: priority plus owner affinity, nothing
/// else. Useful directly when the embedding caller is itself Rust and
/// wants to store scheduler bookkeeping inline in its own task struct via
/// composition, without going through a foreign pointer.
#[derive(Debug)]
pub struct TaskCell {
    priority: AtomicI16,
    owner_tid: AtomicI16,
}

impl TaskCell {
    pub const fn new() -> Self {
        Self {
            priority: AtomicI16::new(0),
            owner_tid: AtomicI16::new(UNOWNED),
        }
    }
}

impl Default for TaskCell {
    fn default() -> Self {
        Self::new()
    }
}

/// A `Copy` handle to a foreign, heap-allocated [`TaskCell`], for embedding
/// the scheduler into a non-Rust host the way `naml-runtime` embeds the
/// rest of the `naml` standard library behind raw pointers (compare
/// `naml_mutex_lock(m: *mut NamlMutex)` in the sibling mutex FFI). The
/// pointee is never allocated or freed by this crate - the host owns it.
#[derive(Debug, Clone, Copy)]
#[repr(transparent)]
pub struct RawTaskHandle(pub std::ptr::NonNull<TaskCell>);

unsafe impl Send for RawTaskHandle {}

impl RawTaskHandle {
    /// # Safety
    /// `cell` must stay valid for as long as any `RawTaskHandle` wrapping
    /// it is in use (i.e. while the task may still be enqueued or held by
    /// a worker).
    pub unsafe fn new(cell: std::ptr::NonNull<TaskCell>) -> Self {
        Self(cell)
    }
}

impl TaskHandle for RawTaskHandle {
    fn set_priority(&self, priority: i16) {
        unsafe { self.0.as_ref() }.priority.store(priority, Ordering::Relaxed);
    }

    fn priority(&self) -> i16 {
        unsafe { self.0.as_ref() }.priority.load(Ordering::Relaxed)
    }

    fn owner_tid(&self) -> &AtomicI16 {
        &unsafe { self.0.as_ref() }.owner_tid
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Arc;

    /// A `Copy` task handle backed by `Arc<TaskCell>`, for tests that want
    /// safe shared ownership instead of `RawTaskHandle`'s raw pointer.
    #[derive(Clone)]
    pub struct ArcTask(pub Arc<TaskCell>);

    impl ArcTask {
        pub fn new(priority: i16) -> Self {
            let cell = TaskCell::new();
            cell.priority.store(priority, Ordering::Relaxed);
            Self(Arc::new(cell))
        }
    }

    impl TaskHandle for ArcTask {
        fn set_priority(&self, priority: i16) {
            self.0.priority.store(priority, Ordering::Relaxed);
        }

        fn priority(&self) -> i16 {
            self.0.priority.load(Ordering::Relaxed)
        }

        fn owner_tid(&self) -> &AtomicI16 {
            &self.0.owner_tid
        }
    }
}
