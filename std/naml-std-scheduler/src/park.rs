//!
//! Park slot
//!
//! One per worker: a `Mutex<bool>` paired with a `Condvar`, used by the
//! acquisition loop to sleep when the multi-queue and external event loop
//! both come up empty. Only the owning worker ever waits on its own slot;
//! any other thread (a pusher, or a waking worker fanning out) may call
//! `signal` on it.
//!

use std::sync::{Condvar, Mutex};
use std::time::Duration;

pub struct ParkSlot {
    woken: Mutex<bool>,
    condvar: Condvar,
}

impl ParkSlot {
    pub fn new() -> Self {
        Self {
            woken: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    /// Block until `signal()` is called, re-checking `should_keep_sleeping`
    /// on every wakeup so a spurious OS wakeup (or a signal that raced with
    /// a prior `park` returning) can't be mistaken for a real one.
    pub fn park_while(&self, mut should_keep_sleeping: impl FnMut() -> bool) {
        let mut woken = self.woken.lock().unwrap();
        while !*woken && should_keep_sleeping() {
            woken = self.condvar.wait(woken).unwrap();
        }
        *woken = false;
    }

    /// Wake the owning worker if it is currently parked, or arrange for its
    /// next `park_while` call to return immediately if it is not yet
    /// parked (avoids the lost-wakeup race between a waker and a worker
    /// that is still on its way into `park_while`).
    pub fn signal(&self) {
        let mut woken = self.woken.lock().unwrap();
        *woken = true;
        self.condvar.notify_one();
    }
}

impl Default for ParkSlot {
    fn default() -> Self {
        Self::new()
    }
}
