//!
//! naml-std-scheduler - Multi-queue priority task scheduler core
//!
//! Implements the scheduling core of the naml M:N runtime as a set of
//! small, independently-testable pieces:
//!
//! - [`shard`] - a bounded d-ary min-heap with a lock-free cached minimum
//! - [`multiqueue`] - a sharded array of heap shards with two-choice,
//!   affinity-respecting insert/extract
//! - [`controller`] - the active/deciding/sleeping handshake that lets a
//!   worker park without racing a concurrent wakeup
//! - [`park`] - the per-worker condvar slot a parked worker actually waits on
//! - [`event`] - trait contracts for the external event loop and garbage
//!   collector a host may plug in
//! - [`scheduler`] - [`Scheduler`], which wires all of the above into the
//!   worker acquisition loop and the producer-side enqueue/wake API
//!
//! Task objects themselves - their closures, stacks, and execution
//! mechanism - are never owned by this crate; it holds references behind
//! the [`task::TaskHandle`] contract and hands them back out unchanged.
//!
//! ## Platform
//!
//! Native only: threads are not available under WASM.
//!

pub mod controller;
pub mod error;
pub mod event;
pub mod multiqueue;
pub mod park;
pub mod scheduler;
pub mod shard;
pub mod task;

pub use controller::{SleepController, WakeOutcome};
pub use error::SchedulerError;
pub use event::{ExternalEventLoop, GcCooperator, NoEventLoop, NoGc};
pub use multiqueue::MultiQueue;
pub use park::ParkSlot;
pub use scheduler::{Scheduler, SPIN_LIMIT};
pub use shard::{HeapShard, HEAP_D, TASKS_PER_HEAP};
pub use task::{RawTaskHandle, TaskCell, TaskHandle, UNOWNED};
