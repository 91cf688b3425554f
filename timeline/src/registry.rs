//! The OS-thread registry.
//!
//! Every thread that touches the timeline gets a registry entry carrying its
//! trace id, human-readable name, isolate attribution, and the slot for its
//! cached open block. The slot is guarded by a per-thread mutex that writer
//! threads hold for the whole lifetime of an event, which is what makes it
//! safe for the reporting side to steal partially filled blocks: while the
//! lock is held the block cannot be mid-write.
//!
//! Lock ordering, outermost first: the registry list lock, then a thread's
//! block lock, then the recorder's pool lock.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::block::TimelineEventBlock;
use crate::event::{NO_ISOLATE, NO_ISOLATE_GROUP};
use crate::lock::RecorderLockScope;
use crate::time;

pub(crate) type BlockSlot = Option<Box<TimelineEventBlock>>;

/// Per-thread collaborator state.
pub(crate) struct ThreadEntry {
    trace_id: i64,
    name: Mutex<Option<String>>,
    isolate_id: AtomicI64,
    isolate_group_id: AtomicU64,
    block_slot: Arc<Mutex<BlockSlot>>,
}

impl ThreadEntry {
    fn new() -> Arc<ThreadEntry> {
        Arc::new(ThreadEntry {
            trace_id: time::current_trace_id(),
            name: Mutex::new(std::thread::current().name().map(str::to_owned)),
            isolate_id: AtomicI64::new(NO_ISOLATE),
            isolate_group_id: AtomicU64::new(NO_ISOLATE_GROUP),
            block_slot: Arc::new(Mutex::new(None)),
        })
    }

    pub(crate) fn trace_id(&self) -> i64 {
        self.trace_id
    }

    pub(crate) fn name(&self) -> Option<String> {
        self.name.lock().clone()
    }

    pub(crate) fn set_name(&self, name: &str) {
        *self.name.lock() = Some(name.to_owned());
    }

    /// The mutex guarding this thread's cached open block. Writers hold it
    /// across an event's lifetime via `lock_arc`.
    pub(crate) fn block_slot(&self) -> &Arc<Mutex<BlockSlot>> {
        &self.block_slot
    }

    pub(crate) fn isolate_ids(&self) -> (i64, u64) {
        (
            self.isolate_id.load(Ordering::Relaxed),
            self.isolate_group_id.load(Ordering::Relaxed),
        )
    }

    pub(crate) fn set_isolate_ids(&self, isolate_id: i64, isolate_group_id: u64) {
        self.isolate_id.store(isolate_id, Ordering::Relaxed);
        self.isolate_group_id
            .store(isolate_group_id, Ordering::Relaxed);
    }
}

/// Process-global list of live thread entries.
pub(crate) struct ThreadRegistry {
    threads: Mutex<Vec<Arc<ThreadEntry>>>,
}

static REGISTRY: ThreadRegistry = ThreadRegistry {
    threads: Mutex::new(Vec::new()),
};

impl ThreadRegistry {
    pub(crate) fn global() -> &'static ThreadRegistry {
        &REGISTRY
    }

    /// Visit every live entry while holding the list lock. Callers may take
    /// individual block locks inside the closure; that respects the lock
    /// ordering above.
    pub(crate) fn for_each(&self, mut f: impl FnMut(&ThreadEntry)) {
        let threads = self.threads.lock();
        for entry in threads.iter() {
            f(entry);
        }
    }

    fn register(&self) -> Arc<ThreadEntry> {
        let entry = ThreadEntry::new();
        self.threads.lock().push(entry.clone());
        entry
    }

    fn unregister(&self, entry: &Arc<ThreadEntry>) {
        self.threads.lock().retain(|t| !Arc::ptr_eq(t, entry));
    }

    #[cfg(test)]
    pub(crate) fn contains_trace_id(&self, trace_id: i64) -> bool {
        self.threads
            .lock()
            .iter()
            .any(|t| t.trace_id() == trace_id)
    }
}

struct ThreadHandle {
    entry: Arc<ThreadEntry>,
}

impl Drop for ThreadHandle {
    fn drop(&mut self) {
        // Hand any open block back before the entry disappears. The block
        // lock must be released before touching the registry list lock.
        let block = self.entry.block_slot.lock().take();
        if let Some(block) = block {
            let scope = RecorderLockScope::new();
            if !scope.is_shutting_down() {
                if let Some(recorder) = crate::Timeline::recorder() {
                    recorder.finish_block(block);
                }
            }
        }
        ThreadRegistry::global().unregister(&self.entry);
    }
}

thread_local! {
    static CURRENT: ThreadHandle = ThreadHandle {
        entry: ThreadRegistry::global().register(),
    };
}

/// The calling thread's registry entry, registering it on first use.
/// Returns `None` only during thread-local teardown.
pub(crate) fn current_thread() -> Option<Arc<ThreadEntry>> {
    CURRENT.try_with(|handle| handle.entry.clone()).ok()
}

pub(crate) fn current_isolate_ids() -> (i64, u64) {
    match current_thread() {
        Some(entry) => entry.isolate_ids(),
        None => (NO_ISOLATE, NO_ISOLATE_GROUP),
    }
}

pub(crate) fn set_current_isolate(isolate_id: i64, isolate_group_id: u64) {
    if let Some(entry) = current_thread() {
        entry.set_isolate_ids(isolate_id, isolate_group_id);
    }
}

pub(crate) fn set_current_thread_name(name: &str) {
    if let Some(entry) = current_thread() {
        entry.set_name(name);
    }
}
