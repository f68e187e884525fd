//!
//! Sleep controller
//!
//! A single shared three-state machine (active / deciding / sleeping) for
//! the whole worker pool, not one per worker - mirroring the original
//! runtime's single process-wide `sleep_check_state` and its
//! `sleep_check_now()` handshake. Only one worker at a time can hold the
//! "deciding" right (the `active -> deciding` CAS); every other worker
//! that wants to sleep while a decision is already in flight just waits
//! for it to resolve and reuses that answer instead of taking its own
//! snapshot, since "is there work anywhere" is a pool-wide question, not
//! a per-worker one.
//!

use std::sync::atomic::{AtomicU8, Ordering};

const ACTIVE: u8 = 0;
const DECIDING: u8 = 1;
const SLEEPING: u8 = 2;

/// Outcome of waking the pool, for callers that want to know whether a
/// park-slot `signal()` fan-out is actually necessary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeOutcome {
    /// The pool was already active; nothing to do.
    AlreadyActive,
    /// Some worker was mid-decision; it will observe `active` on its own
    /// and bail out, but a worker already past that point and blocked on
    /// its park slot still needs a condvar signal, and this state alone
    /// can't distinguish the two - callers should treat this the same as
    /// `WasSleeping`.
    WasDeciding,
    /// The pool had committed to sleeping; parked workers must be
    /// signalled to actually wake their OS threads.
    WasSleeping,
}

pub struct SleepController {
    state: AtomicU8,
}

impl SleepController {
    pub fn new() -> Self {
        Self { state: AtomicU8::new(ACTIVE) }
    }

    /// Mirrors the original `sleep_check_now()`: on behalf of whichever
    /// worker calls this, decide whether the whole pool may transition
    /// toward sleeping. `snapshot` is the "is there truly no work
    /// anywhere" check (e.g. the multi-queue being empty) and is invoked
    /// at most once per call, and only by the one worker that actually
    /// wins the `active -> deciding` CAS - every concurrent caller that
    /// instead observes `deciding` busy-waits for that worker's decision
    /// and reuses it rather than repeating the snapshot itself. Returns
    /// `true` if the caller should now park.
    pub fn sleep_check_now(&self, mut snapshot: impl FnMut() -> bool) -> bool {
        loop {
            let state = self.state.load(Ordering::Acquire);
            if state == DECIDING {
                while self.state.load(Ordering::Acquire) == DECIDING {
                    std::hint::spin_loop();
                }
                continue;
            }
            if state == SLEEPING {
                return true;
            }
            debug_assert_eq!(state, ACTIVE);
            if self.state.compare_exchange(ACTIVE, DECIDING, Ordering::AcqRel, Ordering::Acquire).is_ok() {
                if snapshot() {
                    if self
                        .state
                        .compare_exchange(DECIDING, SLEEPING, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return true;
                    }
                    // Woken out from under us before we could commit;
                    // retry from the top.
                } else {
                    self.state.store(ACTIVE, Ordering::Release);
                    return false;
                }
            }
        }
    }

    /// `true` if the pool is currently marked safe to sleep. Re-checked
    /// by every parked worker's `park_while` predicate, since a spurious
    /// OS wakeup must not be mistaken for a real one.
    pub fn is_sleeping(&self) -> bool {
        self.state.load(Ordering::Acquire) == SLEEPING
    }

    /// Force the pool back to `active`, returning the state it was in
    /// beforehand.
    pub fn wake(&self) -> WakeOutcome {
        match self.state.swap(ACTIVE, Ordering::AcqRel) {
            SLEEPING => WakeOutcome::WasSleeping,
            DECIDING => WakeOutcome::WasDeciding,
            _ => WakeOutcome::AlreadyActive,
        }
    }
}

impl Default for SleepController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn sleep_check_commits_when_snapshot_says_empty() {
        let ctl = SleepController::new();
        assert!(ctl.sleep_check_now(|| true));
        assert!(ctl.is_sleeping());
    }

    #[test]
    fn sleep_check_declines_when_snapshot_finds_work() {
        let ctl = SleepController::new();
        assert!(!ctl.sleep_check_now(|| false));
        assert!(!ctl.is_sleeping());
    }

    #[test]
    fn wake_while_sleeping_returns_was_sleeping() {
        let ctl = SleepController::new();
        ctl.sleep_check_now(|| true);
        assert_eq!(ctl.wake(), WakeOutcome::WasSleeping);
        assert!(!ctl.is_sleeping());
    }

    #[test]
    fn wake_while_active_is_a_no_op() {
        let ctl = SleepController::new();
        assert_eq!(ctl.wake(), WakeOutcome::AlreadyActive);
    }

    /// A second caller arriving while the first is still inside its
    /// `snapshot` closure (holding the `deciding` right) must wait for
    /// that decision and reuse it rather than starting its own.
    #[test]
    fn concurrent_decider_shares_its_answer() {
        let ctl = Arc::new(SleepController::new());
        let deciders_running = Arc::new(AtomicUsize::new(0));

        let ctl2 = ctl.clone();
        let running2 = deciders_running.clone();
        let first = thread::spawn(move || {
            ctl2.sleep_check_now(|| {
                running2.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(30));
                true
            })
        });

        // Give the first caller time to win the CAS and enter its
        // snapshot closure before the second one calls in.
        thread::sleep(Duration::from_millis(10));
        let second = ctl.sleep_check_now(|| panic!("second caller must not take its own snapshot"));

        assert!(first.join().unwrap());
        assert!(second);
        assert_eq!(deciders_running.load(Ordering::SeqCst), 1);
    }
}
