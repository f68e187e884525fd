//!
//! Multi-queue
//!
//! A fixed array of [`HeapShard`]s. Insertion picks a random shard and
//! retries on `trylock` contention; extraction samples two random shards
//! and takes the better of their cached minimums ("two-choice" load
//! balancing), trading a small amount of ordering fidelity for lock-free
//! probing and near-optimal balance across shards.
//!

use naml_std_random::ShardRng;

use crate::error::SchedulerError;
use crate::shard::{EMPTY_PRIO, HeapShard, TASKS_PER_HEAP};
use crate::task::{TaskHandle, UNOWNED};

/// `heap_c` from the design: multi-queue oversubscription factor. `heap_p =
/// MULTIQ_C * worker_count` shards are allocated so `trylock` contention on
/// insertion stays low even under a full worker count hammering the queue.
pub const MULTIQ_C: usize = 4;

pub struct MultiQueue<T> {
    shards: Box<[HeapShard<T>]>,
}

impl<T: TaskHandle> MultiQueue<T> {
    pub fn new(worker_count: usize) -> Self {
        Self::with_capacity(worker_count, TASKS_PER_HEAP)
    }

    pub fn with_capacity(worker_count: usize, tasks_per_heap: usize) -> Self {
        Self::with_shards((MULTIQ_C * worker_count).max(1), tasks_per_heap)
    }

    /// Build with an exact shard count, bypassing the `heap_p = C *
    /// worker_count` oversubscription rule. Production callers go through
    /// `with_capacity`/`new`; this exists for tests and callers that need
    /// to pin `heap_p` directly (e.g. the capacity-ceiling scenario, which
    /// specifies `heap_p = 1` independent of worker count).
    pub fn with_shards(shard_count: usize, tasks_per_heap: usize) -> Self {
        let heap_p = shard_count.max(1);
        let shards = (0..heap_p)
            .map(|i| HeapShard::new(i, tasks_per_heap))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { shards }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Insert `task` at `priority`, recording the priority on the task
    /// itself (the design calls this "recording priority on the task"
    /// rather than treating it as side-channel data). Retries a random
    /// shard pick until a `trylock` succeeds; a full shard is a fatal
    /// scheduling error, not backpressure.
    pub fn insert(&self, task: T, priority: i16, rng: &mut ShardRng) -> Result<(), SchedulerError> {
        task.set_priority(priority);
        loop {
            let idx = rng.unbiased_index(self.shards.len() as u32) as usize;
            if let Some(mut guard) = self.shards[idx].try_lock() {
                return guard.push(task);
            }
        }
    }

    /// Two-choice extraction, optionally constrained to tasks this worker
    /// may legally take (unowned, or already affine to `self_tid`). Each
    /// full pass probes up to `shard_count()` candidates; an affinity
    /// conflict or a lost ownership CAS restarts the whole pass (the
    /// design's "restart the whole delete_min" rule) rather than just the
    /// current probe. Passes themselves are capped at `shard_count()` to
    /// keep this wait-bounded even when the only available task is
    /// permanently affine to another worker - callers simply see `None`
    /// and fall back to their own outer retry/park loop.
    pub fn delete_min(&self, self_tid: i16, rng: &mut ShardRng) -> Option<T> {
        'restart: for _pass in 0..self.shards.len().max(1) {
            for _ in 0..self.shards.len() {
                let Some((idx, observed)) = self.pick_candidate(rng) else { continue };
                let Some(mut guard) = self.shards[idx].try_lock() else { continue };
                if !guard.root_matches(observed) {
                    continue;
                }
                let Some(task) = guard.root() else { continue };

                let owner = task.owner_tid();
                let current = owner.load(std::sync::atomic::Ordering::Acquire);
                if current != UNOWNED && current != self_tid {
                    // Belongs to someone else; must not be stolen. Release
                    // and restart the whole extraction, not just this probe.
                    continue 'restart;
                }
                if current == UNOWNED
                    && owner
                        .compare_exchange(
                            UNOWNED,
                            self_tid,
                            std::sync::atomic::Ordering::AcqRel,
                            std::sync::atomic::Ordering::Acquire,
                        )
                        .is_err()
                {
                    // Another worker claimed it first; restart.
                    continue 'restart;
                }
                return Some(guard.pop_min());
            }
            return None;
        }
        None
    }

    /// Draw two independent shard indices and return the one with the
    /// smaller cached priority, along with that observed priority for
    /// later revalidation. `None` if both draws landed on empty shards.
    fn pick_candidate(&self, rng: &mut ShardRng) -> Option<(usize, i16)> {
        let heap_p = self.shards.len() as u32;
        let r1 = rng.unbiased_index(heap_p) as usize;
        let r2 = rng.unbiased_index(heap_p) as usize;
        let p1 = self.shards[r1].peek_min_prio();
        let p2 = self.shards[r2].peek_min_prio();
        let (idx, prio) = if p1 <= p2 { (r1, p1) } else { (r2, p2) };
        if prio == EMPTY_PRIO {
            None
        } else {
            Some((idx, prio))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.is_empty())
    }

    /// The caller (see crate docs) guarantees concurrent mutation is
    /// externally excluded for the duration of this call - typically a
    /// stop-the-world GC mark phase - so every shard's `trylock` is
    /// expected to succeed; a held lock here would mean that contract was
    /// violated, not ordinary contention.
    pub fn for_each_enqueued(&self, mut visitor: impl FnMut(&T)) {
        for shard in self.shards.iter() {
            let guard = shard
                .try_lock()
                .expect("for_each_enqueued requires exclusive access to the scheduler");
            guard.for_each(|t| visitor(t));
        }
    }
}
