//! The recorder shutdown gate.
//!
//! A process-global pair of atomics reconciles in-flight event writes with
//! teardown: writers bracket every event between [`RecorderLock::enter`] and
//! [`RecorderLock::exit`], and teardown publishes the shutdown flag, then
//! waits for the in-flight count to drain. A writer that enters after the
//! flag is up observes it and bails before touching the recorder, so once
//! [`RecorderLock::wait_for_shutdown`] returns the recorder can be destroyed.

use std::sync::atomic::{AtomicBool, AtomicIsize, Ordering};

use crossbeam::utils::CachePadded;

static SHUTDOWN: CachePadded<AtomicBool> = CachePadded::new(AtomicBool::new(false));
static OUTSTANDING_EVENT_WRITES: CachePadded<AtomicIsize> = CachePadded::new(AtomicIsize::new(0));

pub(crate) struct RecorderLock;

impl RecorderLock {
    /// Announce an in-flight event write. Paired with [`exit`]; callers must
    /// check [`is_shutting_down`] after entering and bail without touching
    /// recorder state when it is set.
    ///
    /// [`exit`]: RecorderLock::exit
    /// [`is_shutting_down`]: RecorderLock::is_shutting_down
    pub(crate) fn enter() {
        OUTSTANDING_EVENT_WRITES.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn exit() {
        let previous = OUTSTANDING_EVENT_WRITES.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(previous > 0);
    }

    pub(crate) fn is_shutting_down() -> bool {
        SHUTDOWN.load(Ordering::SeqCst)
    }

    /// Publish the shutdown flag and wait until every in-flight write has
    /// exited. New writers observe the flag and never reach the recorder.
    pub(crate) fn wait_for_shutdown() {
        SHUTDOWN.store(true, Ordering::SeqCst);
        while OUTSTANDING_EVENT_WRITES.load(Ordering::SeqCst) != 0 {
            std::hint::spin_loop();
            std::thread::yield_now();
        }
    }

    /// Lower the shutdown flag again once the recorder is gone, so a fresh
    /// init/cleanup cycle can run in the same process.
    pub(crate) fn rearm() {
        SHUTDOWN.store(false, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub(crate) fn outstanding_event_writes() -> isize {
        OUTSTANDING_EVENT_WRITES.load(Ordering::SeqCst)
    }
}

/// RAII wrapper around the gate for reporting-side operations. Captures the
/// shutdown flag at entry so callers can bail consistently.
pub(crate) struct RecorderLockScope {
    shutting_down: bool,
}

impl RecorderLockScope {
    pub(crate) fn new() -> Self {
        RecorderLock::enter();
        RecorderLockScope {
            shutting_down: RecorderLock::is_shutting_down(),
        }
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }
}

impl Drop for RecorderLockScope {
    fn drop(&mut self) {
        RecorderLock::exit();
    }
}
