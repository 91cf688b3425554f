//! Fixed-capacity event blocks.
//!
//! Blocks are the unit of hand-off between writer threads and the recorder.
//! An open block is owned by exactly one thread, which appends events to it
//! without further synchronization; the reporting side takes the owning
//! thread's block lock before stealing it back. Because a single thread
//! fills a block from a monotonic clock, the events inside are ordered by
//! time origin by construction.

use crate::event::TimelineEvent;

/// Number of events per block.
pub const BLOCK_SIZE: usize = 64;

const INVALID_THREAD_ID: i64 = 0;

/// A fixed-capacity run of events, thread-owned while open.
#[derive(Debug)]
pub struct TimelineEventBlock {
    events: Vec<TimelineEvent>,
    block_index: u64,
    // Pool slot this block retires into; the allocation index doubles as the
    // slot for the fixed-buffer recorders.
    slot: usize,
    thread_id: i64,
    in_use: bool,
}

impl TimelineEventBlock {
    pub(crate) fn new(block_index: u64, slot: usize) -> Box<TimelineEventBlock> {
        Box::new(TimelineEventBlock {
            events: Vec::with_capacity(BLOCK_SIZE),
            block_index,
            slot,
            thread_id: INVALID_THREAD_ID,
            in_use: false,
        })
    }

    pub fn length(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.events.len() == BLOCK_SIZE
    }

    pub fn at(&self, index: usize) -> Option<&TimelineEvent> {
        self.events.get(index)
    }

    pub fn events(&self) -> impl Iterator<Item = &TimelineEvent> {
        self.events.iter()
    }

    pub fn block_index(&self) -> u64 {
        self.block_index
    }

    pub(crate) fn slot(&self) -> usize {
        self.slot
    }

    /// Trace id of the thread that opened this block.
    pub fn thread_id(&self) -> i64 {
        self.thread_id
    }

    pub fn in_use(&self) -> bool {
        self.in_use
    }

    /// Reserve the next event slot. The caller initializes it through the
    /// event guard while holding its thread's block lock.
    pub(crate) fn start_event(&mut self) -> &mut TimelineEvent {
        debug_assert!(self.in_use);
        debug_assert!(!self.is_full());
        let index = self.events.len();
        self.events.push(TimelineEvent::default());
        &mut self.events[index]
    }

    pub(crate) fn current_event(&self) -> Option<&TimelineEvent> {
        self.events.last()
    }

    pub(crate) fn current_event_mut(&mut self) -> Option<&mut TimelineEvent> {
        self.events.last_mut()
    }

    /// Time origin of the first event, or `i64::MAX` for an empty block.
    pub fn lower_time_bound(&self) -> i64 {
        self.events.first().map_or(i64::MAX, |e| e.time_origin())
    }

    /// Verify the block's structural invariants: every event was written by
    /// the owning thread, and time origins never decrease.
    pub fn check_block(&self) -> bool {
        if self.events.is_empty() {
            return true;
        }
        if self.events.iter().any(|e| e.thread_id() != self.thread_id) {
            return false;
        }
        let mut last_time = self.lower_time_bound();
        for event in &self.events {
            if last_time > event.time_origin() {
                return false;
            }
            last_time = event.time_origin();
        }
        true
    }

    pub(crate) fn reset(&mut self) {
        self.events.clear();
        self.thread_id = INVALID_THREAD_ID;
        self.in_use = false;
    }

    pub(crate) fn open(&mut self, thread_id: i64) {
        self.thread_id = thread_id;
        self.in_use = true;
    }

    pub(crate) fn finish(&mut self) {
        self.in_use = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time;

    #[test]
    fn block_lifecycle() {
        let mut block = TimelineEventBlock::new(0, 0);
        assert!(block.is_empty());
        assert!(!block.in_use());

        block.open(time::current_trace_id());
        assert!(block.in_use());

        for i in 0..BLOCK_SIZE {
            assert!(!block.is_full());
            let event = block.start_event();
            event.instant("tick", i as i64 + 1);
        }
        assert!(block.is_full());
        assert_eq!(block.length(), BLOCK_SIZE);
        assert_eq!(block.lower_time_bound(), 1);

        block.finish();
        assert!(!block.in_use());
        assert!(block.check_block());

        block.reset();
        assert!(block.is_empty());
        assert_eq!(block.lower_time_bound(), i64::MAX);
    }

    #[test]
    fn check_block_rejects_decreasing_timestamps() {
        let mut block = TimelineEventBlock::new(0, 0);
        block.open(time::current_trace_id());
        block.start_event().instant("a", 10);
        block.start_event().instant("b", 5);
        assert!(!block.check_block());
    }

    #[test]
    fn check_block_rejects_foreign_thread_ids() {
        let mut block = TimelineEventBlock::new(0, 0);
        block.open(time::current_trace_id() + 1);
        block.start_event().instant("a", 10);
        assert!(!block.check_block());
    }
}
