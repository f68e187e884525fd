//!
//! Scheduler error types
//!
//! Only variants a caller can actually observe are public here.
//! `LostOwnership`, `StaleMinPrio`, and `SpuriousWakeup` from the design
//! (see crate docs) are internal restart signals consumed inside
//! `multiq::delete_min` and the acquisition loop; they never escape a
//! public function, so they have no variant in this enum.
//!

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A shard reached `TASKS_PER_HEAP` on `push`. Fatal at this layer:
    /// shard capacity is a design ceiling sized generously, not a
    /// backpressure signal, so callers should treat this as unrecoverable
    /// producer misuse or a task leak rather than retry.
    #[error("shard {shard} is full ({capacity} tasks); increase tasks-per-heap or find the leak")]
    CapacityExceeded { shard: usize, capacity: usize },

    /// `SLEEP_THRESHOLD` was set but was neither a valid unsigned integer
    /// nor the literal `"infinite"`.
    #[error("invalid SLEEP_THRESHOLD {value:?}: expected an unsigned integer or \"infinite\"")]
    InvalidConfig { value: String },
}
