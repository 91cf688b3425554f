//! Recorder strategies and the per-thread block slot protocol.
//!
//! A recorder hands out writable event slots and decides retention. The
//! block-based strategies (ring, startup, endless) share one protocol: each
//! thread caches at most one open block in its registry entry and appends
//! events to it under its own block lock, touching the recorder's pool lock
//! only when the block rotates. The callback-style strategies (callback,
//! file, systrace) heap-allocate a standalone event per write instead.
//!
//! Events are handed out as [`TimelineEventGuard`]s: the guard dereferences
//! to the event, and dropping it publishes the event and releases the locks
//! in the required order.

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use trace_format::JsonWriter;

use crate::block::{TimelineEventBlock, BLOCK_SIZE};
use crate::event::TimelineEvent;
use crate::lock::RecorderLock;
use crate::output::{CallbackRecorder, FileRecorder, SystraceRecorder};
use crate::registry::{self, BlockSlot, ThreadRegistry};
use crate::TimelineError;

/// Default fixed-buffer capacity, in events.
pub const DEFAULT_RECORDER_CAPACITY: usize = 32 * 1024;

/// Predicates a reporter applies while iterating a snapshot.
#[derive(Debug, Clone)]
pub struct TimelineEventFilter {
    time_origin_micros: i64,
    time_extent_micros: i64,
    isolate_id: Option<i64>,
}

impl Default for TimelineEventFilter {
    fn default() -> Self {
        TimelineEventFilter {
            time_origin_micros: -1,
            time_extent_micros: -1,
            isolate_id: None,
        }
    }
}

impl TimelineEventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to events overlapping `[origin, origin + extent]`. A `-1`
    /// for either bound leaves the window unbounded.
    pub fn time_window(mut self, time_origin_micros: i64, time_extent_micros: i64) -> Self {
        debug_assert!(time_origin_micros >= -1);
        debug_assert!(time_extent_micros >= -1);
        self.time_origin_micros = time_origin_micros;
        self.time_extent_micros = time_extent_micros;
        self
    }

    /// Restrict to events attributed to one isolate.
    pub fn isolate(mut self, isolate_id: i64) -> Self {
        self.isolate_id = Some(isolate_id);
        self
    }

    pub fn time_origin_micros(&self) -> i64 {
        self.time_origin_micros
    }

    pub fn time_extent_micros(&self) -> i64 {
        self.time_extent_micros
    }

    pub fn include_block(&self, block: &TimelineEventBlock) -> bool {
        !block.in_use() && !block.is_empty()
    }

    pub fn include_event(&self, event: &TimelineEvent) -> bool {
        if !event.is_valid() {
            return false;
        }
        self.isolate_id
            .is_none_or(|isolate_id| event.isolate_id() == isolate_id)
    }
}

/// Running min/max of serialized event timestamps.
#[derive(Debug, Clone, Copy)]
struct TimeBounds {
    low: i64,
    high: i64,
}

impl Default for TimeBounds {
    fn default() -> Self {
        TimeBounds {
            low: i64::MAX,
            high: 0,
        }
    }
}

impl TimeBounds {
    fn report(&mut self, micros: i64) {
        if micros > self.high {
            self.high = micros;
        }
        if micros < self.low {
            self.low = micros;
        }
    }

    fn origin(&self) -> i64 {
        if self.high == 0 {
            0
        } else {
            self.low
        }
    }

    fn extent(&self) -> i64 {
        if self.high == 0 {
            0
        } else {
            self.high - self.low
        }
    }
}

/// Strategy hook shared by the block-based recorders: swap a finished block
/// for a fresh one, or retire one outright. Both run under the pool lock.
pub(crate) trait BlockAllocator: Send + Sync {
    fn exchange_block(
        &self,
        finished: Option<Box<TimelineEventBlock>>,
        thread_id: i64,
    ) -> Option<Box<TimelineEventBlock>>;

    fn finish_block(&self, block: Box<TimelineEventBlock>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AllocationPolicy {
    /// Ring behavior: reuse the least recently handed out finished block.
    Wrap,
    /// Startup behavior: stop handing out blocks once the pool is spent.
    StopWhenExhausted,
}

struct FixedPoolState {
    // `None` marks a slot whose block is currently checked out by a thread.
    slots: Vec<Option<Box<TimelineEventBlock>>>,
    cursor: usize,
    time: TimeBounds,
}

impl FixedPoolState {
    fn obtain(&mut self, thread_id: i64, policy: AllocationPolicy) -> Option<Box<TimelineEventBlock>> {
        match policy {
            AllocationPolicy::Wrap => {
                // Only finished blocks may be handed out; a slot whose block
                // is still checked out is skipped rather than reset.
                for _ in 0..self.slots.len() {
                    if self.cursor >= self.slots.len() {
                        self.cursor = 0;
                    }
                    let slot = self.cursor;
                    self.cursor += 1;
                    if let Some(mut block) = self.slots[slot].take() {
                        block.reset();
                        block.open(thread_id);
                        return Some(block);
                    }
                }
                None
            }
            AllocationPolicy::StopWhenExhausted => {
                while self.cursor < self.slots.len() {
                    let slot = self.cursor;
                    self.cursor += 1;
                    if let Some(mut block) = self.slots[slot].take() {
                        block.reset();
                        block.open(thread_id);
                        return Some(block);
                    }
                }
                None
            }
        }
    }

    fn retire(&mut self, block: Box<TimelineEventBlock>) {
        let slot = block.slot();
        debug_assert!(self.slots[slot].is_none());
        self.slots[slot] = Some(block);
    }

    fn write_events(&mut self, writer: &mut JsonWriter, filter: &TimelineEventFilter) {
        let mut time = TimeBounds::default();
        let num_slots = self.slots.len();
        let oldest = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.as_ref()
                    .filter(|block| !block.is_empty())
                    .map(|block| (block.lower_time_bound(), index))
            })
            .min()
            .map(|(_, index)| index);
        if let Some(offset) = oldest {
            for i in 0..num_slots {
                let Some(block) = &self.slots[(i + offset) % num_slots] else {
                    continue;
                };
                if !filter.include_block(block) {
                    continue;
                }
                for event in block.events() {
                    if filter.include_event(event)
                        && event.within(filter.time_origin_micros(), filter.time_extent_micros())
                    {
                        time.report(event.low_time());
                        time.report(event.high_time());
                        event.write_json(writer);
                    }
                }
            }
        }
        self.time = time;
    }
}

/// Shared machinery of the ring and startup recorders: a preallocated pool
/// of `capacity / BLOCK_SIZE` blocks and a hand-out cursor.
pub(crate) struct FixedBufferRecorder {
    state: Mutex<FixedPoolState>,
    policy: AllocationPolicy,
}

impl FixedBufferRecorder {
    fn new(capacity: usize, policy: AllocationPolicy) -> FixedBufferRecorder {
        assert!(
            capacity > 0 && capacity % BLOCK_SIZE == 0,
            "recorder capacity must be a positive multiple of the block size"
        );
        let num_blocks = capacity / BLOCK_SIZE;
        let slots = (0..num_blocks)
            .map(|i| Some(TimelineEventBlock::new(i as u64, i)))
            .collect();
        FixedBufferRecorder {
            state: Mutex::new(FixedPoolState {
                slots,
                cursor: 0,
                time: TimeBounds::default(),
            }),
            policy,
        }
    }

    fn clear(&self) {
        let mut state = self.state.lock();
        for slot in state.slots.iter_mut() {
            if let Some(block) = slot.as_mut() {
                block.reset();
            }
        }
    }
}

impl BlockAllocator for FixedBufferRecorder {
    fn exchange_block(
        &self,
        finished: Option<Box<TimelineEventBlock>>,
        thread_id: i64,
    ) -> Option<Box<TimelineEventBlock>> {
        let mut state = self.state.lock();
        if let Some(mut block) = finished {
            block.finish();
            crate::notify_block_finished(&block);
            state.retire(block);
        }
        let block = state.obtain(thread_id, self.policy);
        if let Some(block) = &block {
            debug!(block_index = block.block_index(), thread_id, "opened block");
        }
        block
    }

    fn finish_block(&self, mut block: Box<TimelineEventBlock>) {
        let mut state = self.state.lock();
        block.finish();
        crate::notify_block_finished(&block);
        state.retire(block);
    }
}

struct EndlessState {
    // Finished blocks keyed by allocation index; open blocks live in thread
    // slots until they come back through retire.
    blocks: BTreeMap<u64, Box<TimelineEventBlock>>,
    next_block_index: u64,
    time: TimeBounds,
}

impl EndlessState {
    fn write_events(&mut self, writer: &mut JsonWriter, filter: &TimelineEventFilter) {
        let mut time = TimeBounds::default();
        for block in self.blocks.values() {
            if !filter.include_block(block) {
                continue;
            }
            for event in block.events() {
                if filter.include_event(event)
                    && event.within(filter.time_origin_micros(), filter.time_extent_micros())
                {
                    time.report(event.low_time());
                    time.report(event.high_time());
                    event.write_json(writer);
                }
            }
        }
        self.time = time;
    }
}

/// Unbounded recorder: every rotation allocates a fresh block.
pub(crate) struct EndlessRecorder {
    state: Mutex<EndlessState>,
}

impl EndlessRecorder {
    fn new() -> EndlessRecorder {
        EndlessRecorder {
            state: Mutex::new(EndlessState {
                blocks: BTreeMap::new(),
                next_block_index: 0,
                time: TimeBounds::default(),
            }),
        }
    }

    fn clear(&self) {
        let mut state = self.state.lock();
        state.blocks.clear();
        state.next_block_index = 0;
    }
}

impl BlockAllocator for EndlessRecorder {
    fn exchange_block(
        &self,
        finished: Option<Box<TimelineEventBlock>>,
        thread_id: i64,
    ) -> Option<Box<TimelineEventBlock>> {
        let mut state = self.state.lock();
        if let Some(mut block) = finished {
            block.finish();
            crate::notify_block_finished(&block);
            state.blocks.insert(block.block_index(), block);
        }
        let index = state.next_block_index;
        state.next_block_index += 1;
        let mut block = TimelineEventBlock::new(index, 0);
        block.open(thread_id);
        debug!(block_index = index, thread_id, "opened block");
        Some(block)
    }

    fn finish_block(&self, mut block: Box<TimelineEventBlock>) {
        let mut state = self.state.lock();
        block.finish();
        crate::notify_block_finished(&block);
        state.blocks.insert(block.block_index(), block);
    }
}

// Lock the calling thread's block slot, rotating or allocating its block as
// needed, and reserve the next event slot. The returned guard keeps the
// thread's block lock held so the reporting side cannot steal the block
// while the event is being filled.
fn thread_block_start_event(allocator: &dyn BlockAllocator) -> Option<BlockSlotGuard> {
    let entry = registry::current_thread()?;
    let mut guard = entry.block_slot().lock_arc();
    let needs_block = guard.as_ref().is_none_or(|block| block.is_full());
    if needs_block {
        let finished = guard.take();
        *guard = allocator.exchange_block(finished, entry.trace_id());
    }
    if let Some(block) = guard.as_mut() {
        block.start_event();
        return Some(guard);
    }
    None
}

pub(crate) type BlockSlotGuard =
    parking_lot::lock_api::ArcMutexGuard<parking_lot::RawMutex, BlockSlot>;

pub(crate) enum EventSlot {
    /// Slot inside the calling thread's open block; the guard holds the
    /// thread's block lock.
    Block(BlockSlotGuard),
    /// Standalone event for the callback-style recorders.
    Heap(Box<TimelineEvent>),
    Completed,
}

/// A writable event slot. Dereferences to the event; dropping the guard
/// publishes the event, releases the thread's block lock, and exits the
/// shutdown gate, in that order. Callers must not retain references past the
/// drop: the slot may be reused by the recorder immediately.
pub struct TimelineEventGuard {
    recorder: Arc<TimelineRecorder>,
    slot: EventSlot,
}

impl TimelineEventGuard {
    pub(crate) fn start(recorder: Arc<TimelineRecorder>) -> Option<TimelineEventGuard> {
        let slot = recorder.start_event_slot()?;
        Some(TimelineEventGuard { recorder, slot })
    }

    /// Publish the event. Equivalent to dropping the guard.
    pub fn complete(self) {}

    /// Attach a single argument whose value is already JSON-encoded, then
    /// publish. The serializer splices the value verbatim.
    pub fn complete_with_pre_serialized_args(mut self, args_json: String) {
        self.set_pre_serialized_args(true);
        self.set_num_arguments(1);
        self.set_argument(0, "Dart Arguments", args_json);
    }
}

impl Deref for TimelineEventGuard {
    type Target = TimelineEvent;

    fn deref(&self) -> &TimelineEvent {
        match &self.slot {
            EventSlot::Block(guard) => guard
                .as_ref()
                .and_then(|block| block.current_event())
                .expect("event slot reserved while the block lock is held"),
            EventSlot::Heap(event) => event,
            EventSlot::Completed => unreachable!("event accessed after completion"),
        }
    }
}

impl DerefMut for TimelineEventGuard {
    fn deref_mut(&mut self) -> &mut TimelineEvent {
        match &mut self.slot {
            EventSlot::Block(guard) => guard
                .as_mut()
                .and_then(|block| block.current_event_mut())
                .expect("event slot reserved while the block lock is held"),
            EventSlot::Heap(event) => event,
            EventSlot::Completed => unreachable!("event accessed after completion"),
        }
    }
}

impl Drop for TimelineEventGuard {
    fn drop(&mut self) {
        match std::mem::replace(&mut self.slot, EventSlot::Completed) {
            // The slot is already populated; releasing the thread's block
            // lock is the completion.
            EventSlot::Block(guard) => drop(guard),
            EventSlot::Heap(event) => self.recorder.complete_heap_event(event),
            EventSlot::Completed => return,
        }
        RecorderLock::exit();
    }
}

pub(crate) enum RecorderStrategy {
    Ring(FixedBufferRecorder),
    Startup(FixedBufferRecorder),
    Endless(EndlessRecorder),
    Callback(CallbackRecorder),
    File(FileRecorder),
    Systrace(SystraceRecorder),
}

/// A retention strategy plus its storage.
pub struct TimelineRecorder {
    strategy: RecorderStrategy,
}

impl TimelineRecorder {
    /// Fixed pool that overwrites its oldest finished block when full.
    /// `capacity` is in events and must be a multiple of [`BLOCK_SIZE`].
    pub fn ring(capacity: usize) -> TimelineRecorder {
        TimelineRecorder {
            strategy: RecorderStrategy::Ring(FixedBufferRecorder::new(
                capacity,
                AllocationPolicy::Wrap,
            )),
        }
    }

    /// Fixed pool that quietly drops events once every block has been handed
    /// out.
    pub fn startup(capacity: usize) -> TimelineRecorder {
        TimelineRecorder {
            strategy: RecorderStrategy::Startup(FixedBufferRecorder::new(
                capacity,
                AllocationPolicy::StopWhenExhausted,
            )),
        }
    }

    /// Unbounded recorder; memory grows with the trace.
    pub fn endless() -> TimelineRecorder {
        TimelineRecorder {
            strategy: RecorderStrategy::Endless(EndlessRecorder::new()),
        }
    }

    /// Deliver each completed event to `on_event` and free it immediately
    /// after. A sink that outlives the call must copy the event's data.
    pub fn callback(
        on_event: impl Fn(&TimelineEvent) + Send + Sync + 'static,
    ) -> TimelineRecorder {
        TimelineRecorder {
            strategy: RecorderStrategy::Callback(CallbackRecorder::new(on_event)),
        }
    }

    /// Stream events to a file as a Chrome Trace Event array. A file that
    /// cannot be opened degrades to a warned silent sink.
    pub fn file(path: impl AsRef<std::path::Path>) -> TimelineRecorder {
        TimelineRecorder {
            strategy: RecorderStrategy::File(FileRecorder::create(path.as_ref())),
        }
    }

    /// File recorder over a caller-provided writer.
    pub fn file_with_writer(writer: Box<dyn std::io::Write + Send>) -> TimelineRecorder {
        TimelineRecorder {
            strategy: RecorderStrategy::File(FileRecorder::with_writer(writer)),
        }
    }

    /// Platform-native shim over the kernel trace marker.
    pub fn systrace() -> Result<TimelineRecorder, TimelineError> {
        Ok(TimelineRecorder {
            strategy: RecorderStrategy::Systrace(SystraceRecorder::open()?),
        })
    }

    pub fn name(&self) -> &'static str {
        match &self.strategy {
            RecorderStrategy::Ring(_) => "ring",
            RecorderStrategy::Startup(_) => "startup",
            RecorderStrategy::Endless(_) => "endless",
            RecorderStrategy::Callback(_) => "callback",
            RecorderStrategy::File(_) => "file",
            RecorderStrategy::Systrace(_) => "systrace",
        }
    }

    fn block_allocator(&self) -> Option<&dyn BlockAllocator> {
        match &self.strategy {
            RecorderStrategy::Ring(recorder) | RecorderStrategy::Startup(recorder) => {
                Some(recorder)
            }
            RecorderStrategy::Endless(recorder) => Some(recorder),
            _ => None,
        }
    }

    pub(crate) fn start_event_slot(&self) -> Option<EventSlot> {
        match self.block_allocator() {
            Some(allocator) => thread_block_start_event(allocator).map(EventSlot::Block),
            None => Some(EventSlot::Heap(Box::default())),
        }
    }

    pub(crate) fn complete_heap_event(&self, event: Box<TimelineEvent>) {
        match &self.strategy {
            RecorderStrategy::Callback(recorder) => recorder.on_event(&event),
            RecorderStrategy::File(recorder) => recorder.enqueue(event),
            RecorderStrategy::Systrace(recorder) => recorder.emit(&event),
            _ => debug_assert!(false, "block-based recorder completed a heap event"),
        }
    }

    /// Mark a reclaimed block finished and merge it back into the pool.
    pub(crate) fn finish_block(&self, block: Box<TimelineEventBlock>) {
        if let Some(allocator) = self.block_allocator() {
            allocator.finish_block(block);
        }
    }

    pub(crate) fn clear(&self) {
        match &self.strategy {
            RecorderStrategy::Ring(recorder) | RecorderStrategy::Startup(recorder) => {
                recorder.clear()
            }
            RecorderStrategy::Endless(recorder) => recorder.clear(),
            _ => {}
        }
    }

    /// Earliest timestamp of the most recent snapshot.
    pub fn time_origin_micros(&self) -> i64 {
        match &self.strategy {
            RecorderStrategy::Ring(recorder) | RecorderStrategy::Startup(recorder) => {
                recorder.state.lock().time.origin()
            }
            RecorderStrategy::Endless(recorder) => recorder.state.lock().time.origin(),
            _ => 0,
        }
    }

    /// Length of the time range of the most recent snapshot.
    pub fn time_extent_micros(&self) -> i64 {
        match &self.strategy {
            RecorderStrategy::Ring(recorder) | RecorderStrategy::Startup(recorder) => {
                recorder.state.lock().time.extent()
            }
            RecorderStrategy::Endless(recorder) => recorder.state.lock().time.extent(),
            _ => 0,
        }
    }

    /// Service-endpoint framing: a `Timeline` object wrapping the events and
    /// the covered time range.
    pub fn write_json(&self, writer: &mut JsonWriter, filter: &TimelineEventFilter) {
        writer.open_object();
        writer.string_property("type", "Timeline");
        writer.open_array_property("traceEvents");
        write_thread_metadata(writer);
        self.write_events(writer, filter);
        writer.close_array();
        writer.int_property("timeOriginMicros", self.time_origin_micros());
        writer.int_property("timeExtentMicros", self.time_extent_micros());
        writer.close_object();
    }

    /// Bare-array framing, as written to trace files.
    pub fn write_trace_event(&self, writer: &mut JsonWriter, filter: &TimelineEventFilter) {
        writer.open_array();
        if self.block_allocator().is_some() {
            write_thread_metadata(writer);
            self.write_events(writer, filter);
        }
        writer.close_array();
    }

    fn write_events(&self, writer: &mut JsonWriter, filter: &TimelineEventFilter) {
        match &self.strategy {
            RecorderStrategy::Ring(recorder) | RecorderStrategy::Startup(recorder) => {
                recorder.state.lock().write_events(writer, filter)
            }
            RecorderStrategy::Endless(recorder) => {
                recorder.state.lock().write_events(writer, filter)
            }
            _ => {}
        }
    }
}

// One thread_name metadata event per named registry thread.
fn write_thread_metadata(writer: &mut JsonWriter) {
    let pid = std::process::id() as i64;
    ThreadRegistry::global().for_each(|entry| {
        let Some(name) = entry.name() else {
            return;
        };
        writer.open_object();
        writer.string_property("name", "thread_name");
        writer.string_property("ph", "M");
        writer.int_property("pid", pid);
        writer.int_property("tid", entry.trace_id());
        writer.open_object_property("args");
        writer.format_property("name", format_args!("{} ({})", name, entry.trace_id()));
        writer.string_property("mode", "basic");
        writer.close_object();
        writer.close_object();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time;

    fn fill_block(block: &mut TimelineEventBlock, start_ts: i64) {
        while !block.is_full() {
            let ts = start_ts + block.length() as i64;
            block.start_event().instant("tick", ts);
        }
    }

    fn snapshot_timestamps(recorder: &TimelineRecorder) -> Vec<i64> {
        let mut writer = JsonWriter::new();
        recorder.write_trace_event(&mut writer, &TimelineEventFilter::default());
        let events: Vec<serde_json::Value> = serde_json::from_str(writer.as_str()).unwrap();
        events
            .iter()
            .filter(|e| e["ph"] != "M")
            .map(|e| e["ts"].as_i64().unwrap())
            .collect()
    }

    #[test]
    fn ring_reuses_its_oldest_finished_block() {
        let recorder = TimelineRecorder::ring(BLOCK_SIZE);
        let allocator = recorder.block_allocator().unwrap();
        let tid = time::current_trace_id();

        let mut block = allocator.exchange_block(None, tid).unwrap();
        let first_index = block.block_index();
        fill_block(&mut block, 1);

        // Rotating the full block through the single-slot ring hands the
        // same block back, reset.
        let block = allocator.exchange_block(Some(block), tid).unwrap();
        assert_eq!(block.block_index(), first_index);
        assert!(block.is_empty());
        assert!(block.in_use());
        allocator.finish_block(block);
    }

    #[test]
    fn ring_only_hands_out_finished_blocks() {
        let recorder = TimelineRecorder::ring(BLOCK_SIZE);
        let allocator = recorder.block_allocator().unwrap();
        let tid = time::current_trace_id();

        let checked_out = allocator.exchange_block(None, tid).unwrap();
        // The only block is checked out; the ring must not reset it.
        assert!(allocator.exchange_block(None, tid + 1).is_none());
        allocator.finish_block(checked_out);
        assert!(allocator.exchange_block(None, tid + 1).is_some());
    }

    #[test]
    fn startup_pool_is_spent_after_one_pass() {
        let recorder = TimelineRecorder::startup(BLOCK_SIZE);
        let allocator = recorder.block_allocator().unwrap();
        let tid = time::current_trace_id();

        let block = allocator.exchange_block(None, tid).unwrap();
        // Retiring the block does not refill the startup cursor.
        assert!(allocator.exchange_block(Some(block), tid).is_none());
        assert!(allocator.exchange_block(None, tid).is_none());
    }

    #[test]
    fn endless_block_indices_increase() {
        let recorder = TimelineRecorder::endless();
        let allocator = recorder.block_allocator().unwrap();
        let tid = time::current_trace_id();

        let a = allocator.exchange_block(None, tid).unwrap();
        let b = allocator.exchange_block(Some(a), tid).unwrap();
        assert_eq!(b.block_index(), 1);
        allocator.finish_block(b);
    }

    #[test]
    fn snapshot_walks_blocks_from_the_oldest() {
        let recorder = TimelineRecorder::ring(2 * BLOCK_SIZE);
        let allocator = recorder.block_allocator().unwrap();
        let tid = time::current_trace_id();

        // Fill the second-handed-out block with *older* timestamps so slot
        // order and time order disagree.
        let mut newer = allocator.exchange_block(None, tid).unwrap();
        fill_block(&mut newer, 1000);
        let mut older = allocator.exchange_block(Some(newer), tid).unwrap();
        fill_block(&mut older, 100);
        allocator.finish_block(older);

        let timestamps = snapshot_timestamps(&recorder);
        assert_eq!(timestamps.len(), 2 * BLOCK_SIZE);
        assert_eq!(timestamps[0], 100);
        assert_eq!(timestamps[BLOCK_SIZE], 1000);
    }

    #[test]
    fn snapshot_applies_the_time_window() {
        let recorder = TimelineRecorder::endless();
        let allocator = recorder.block_allocator().unwrap();
        let tid = time::current_trace_id();

        let mut block = allocator.exchange_block(None, tid).unwrap();
        block.start_event().instant("a", 100);
        block.start_event().instant("b", 200);
        block.start_event().instant("c", 300);
        allocator.finish_block(block);

        let mut writer = JsonWriter::new();
        let filter = TimelineEventFilter::new().time_window(150, 100);
        recorder.write_trace_event(&mut writer, &filter);
        let events: Vec<serde_json::Value> = serde_json::from_str(writer.as_str()).unwrap();
        let timestamps: Vec<i64> = events
            .iter()
            .filter(|e| e["ph"] != "M")
            .map(|e| e["ts"].as_i64().unwrap())
            .collect();
        assert_eq!(timestamps, vec![200]);

        assert_eq!(recorder.time_origin_micros(), 200);
        assert_eq!(recorder.time_extent_micros(), 0);
    }

    #[test]
    fn snapshot_filters_by_isolate() {
        let recorder = TimelineRecorder::endless();
        let allocator = recorder.block_allocator().unwrap();
        let tid = time::current_trace_id();

        registry::set_current_isolate(7, 1);
        let mut block = allocator.exchange_block(None, tid).unwrap();
        block.start_event().instant("mine", 10);
        registry::set_current_isolate(8, 1);
        block.start_event().instant("other", 20);
        registry::set_current_isolate(0, 0);
        allocator.finish_block(block);

        let mut writer = JsonWriter::new();
        recorder.write_trace_event(&mut writer, &TimelineEventFilter::new().isolate(7));
        let events: Vec<serde_json::Value> = serde_json::from_str(writer.as_str()).unwrap();
        let names: Vec<&str> = events
            .iter()
            .filter(|e| e["ph"] != "M")
            .map(|e| e["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["mine"]);
    }

    #[test]
    fn clear_empties_every_pool_block() {
        let recorder = TimelineRecorder::ring(2 * BLOCK_SIZE);
        let allocator = recorder.block_allocator().unwrap();
        let tid = time::current_trace_id();

        let mut block = allocator.exchange_block(None, tid).unwrap();
        block.start_event().instant("a", 1);
        allocator.finish_block(block);

        recorder.clear();
        assert!(snapshot_timestamps(&recorder).is_empty());
    }

    #[test]
    fn default_filter_excludes_empty_and_in_use_blocks() {
        let filter = TimelineEventFilter::default();
        let mut block = TimelineEventBlock::new(0, 0);
        assert!(!filter.include_block(&block));

        block.open(time::current_trace_id());
        block.start_event().instant("a", 1);
        assert!(!filter.include_block(&block));

        block.finish();
        assert!(filter.include_block(&block));
    }
}
