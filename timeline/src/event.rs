//! Timeline events and their argument vectors.
//!
//! A [`TimelineEvent`] is one record of a trace point. Events are created in
//! place inside a block slot (or on the heap for the callback-style
//! recorders), initialized by exactly one phase constructor, optionally given
//! arguments, and then published by completing the guard that handed them
//! out. After completion the slot may be reused, so no reference to the event
//! survives the guard.

use std::borrow::Cow;
use std::fmt;

use trace_format::JsonWriter;

use crate::registry;
use crate::stream::TimelineStream;
use crate::time;

/// Sentinel for "no thread-CPU time recorded".
pub const NO_THREAD_CPU_TIME: i64 = -1;

/// Sentinel isolate id; events without an isolate omit `isolateId`.
pub const NO_ISOLATE: i64 = 0;

/// Sentinel isolate group id; events without one omit `isolateGroupId`.
pub const NO_ISOLATE_GROUP: u64 = 0;

/// The kind of trace point an event records. Maps onto the Chrome Trace
/// Event `ph` glyph during serialization.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EventPhase {
    #[default]
    None,
    Begin,
    End,
    Duration,
    Instant,
    AsyncBegin,
    AsyncInstant,
    AsyncEnd,
    Counter,
    FlowBegin,
    FlowStep,
    FlowEnd,
    Metadata,
}

/// One `(name, value)` argument pair. Names are static strings supplied by
/// the instrumentation point; values are owned by the event.
#[derive(Debug, Default)]
pub struct TimelineEventArgument {
    pub name: &'static str,
    pub value: String,
}

/// A growable vector of event arguments.
///
/// Shrinking the vector drops the excess values; overwriting a slot drops its
/// prior value. [`steal`] moves the entire buffer into another vector,
/// leaving the source empty.
///
/// [`steal`]: TimelineEventArguments::steal
#[derive(Debug, Default)]
pub struct TimelineEventArguments {
    buffer: Vec<TimelineEventArgument>,
}

impl TimelineEventArguments {
    pub fn set_num_arguments(&mut self, length: usize) {
        self.buffer.resize_with(length, Default::default);
    }

    /// Set slot `i`, taking ownership of `value`. Panics if `i` is out of
    /// bounds; callers size the vector first.
    pub fn set_argument(&mut self, i: usize, name: &'static str, value: String) {
        let slot = &mut self.buffer[i];
        slot.name = name;
        slot.value = value;
    }

    /// Set slot `i` to a copy of `value`.
    pub fn copy_argument(&mut self, i: usize, name: &'static str, value: &str) {
        self.set_argument(i, name, value.to_owned());
    }

    /// Set slot `i` from format arguments.
    pub fn format_argument(&mut self, i: usize, name: &'static str, value: fmt::Arguments<'_>) {
        self.set_argument(i, name, value.to_string());
    }

    /// Take ownership of `other`'s whole buffer, dropping any prior contents
    /// of `self` and leaving `other` empty.
    pub fn steal(&mut self, other: &mut TimelineEventArguments) {
        self.buffer = std::mem::take(&mut other.buffer);
    }

    pub fn free(&mut self) {
        self.buffer.clear();
        self.buffer.shrink_to_fit();
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&TimelineEventArgument> {
        self.buffer.get(i)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimelineEventArgument> {
        self.buffer.iter()
    }
}

/// One record of a trace point.
#[derive(Debug)]
pub struct TimelineEvent {
    phase: EventPhase,
    label: Cow<'static, str>,
    // Monotonic microseconds. Meaning depends on the phase: the async, flow
    // and begin/end phases overload `timestamp1` with the correlation id.
    timestamp0: i64,
    timestamp1: i64,
    thread_timestamp0: i64,
    thread_timestamp1: i64,
    thread_id: i64,
    isolate_id: i64,
    isolate_group_id: u64,
    stream: Option<&'static TimelineStream>,
    arguments: TimelineEventArguments,
    pre_serialized_args: bool,
}

impl Default for TimelineEvent {
    fn default() -> Self {
        TimelineEvent {
            phase: EventPhase::None,
            label: Cow::Borrowed(""),
            timestamp0: 0,
            timestamp1: 0,
            thread_timestamp0: NO_THREAD_CPU_TIME,
            thread_timestamp1: NO_THREAD_CPU_TIME,
            thread_id: 0,
            isolate_id: NO_ISOLATE,
            isolate_group_id: NO_ISOLATE_GROUP,
            stream: None,
            arguments: TimelineEventArguments::default(),
            pre_serialized_args: false,
        }
    }
}

impl TimelineEvent {
    pub fn reset(&mut self) {
        *self = TimelineEvent::default();
    }

    pub fn begin(
        &mut self,
        label: impl Into<Cow<'static, str>>,
        id: i64,
        micros: i64,
        thread_micros: i64,
    ) {
        self.init(EventPhase::Begin, label.into());
        self.timestamp0 = micros;
        self.timestamp1 = id;
        self.thread_timestamp0 = thread_micros;
    }

    pub fn end(
        &mut self,
        label: impl Into<Cow<'static, str>>,
        id: i64,
        micros: i64,
        thread_micros: i64,
    ) {
        self.init(EventPhase::End, label.into());
        self.timestamp0 = micros;
        self.timestamp1 = id;
        self.thread_timestamp0 = thread_micros;
    }

    pub fn duration_begin(
        &mut self,
        label: impl Into<Cow<'static, str>>,
        micros: i64,
        thread_micros: i64,
    ) {
        self.init(EventPhase::Duration, label.into());
        self.timestamp0 = micros;
        self.thread_timestamp0 = thread_micros;
    }

    /// Close an open duration. Must follow `duration_begin` on the same
    /// event.
    pub fn duration_end(&mut self, micros: i64, thread_micros: i64) {
        debug_assert_eq!(self.phase, EventPhase::Duration);
        debug_assert_eq!(self.timestamp1, 0);
        self.timestamp1 = micros;
        self.thread_timestamp1 = thread_micros;
    }

    pub fn duration(
        &mut self,
        label: impl Into<Cow<'static, str>>,
        start_micros: i64,
        end_micros: i64,
        thread_start_micros: i64,
        thread_end_micros: i64,
    ) {
        self.init(EventPhase::Duration, label.into());
        self.timestamp0 = start_micros;
        self.timestamp1 = end_micros;
        self.thread_timestamp0 = thread_start_micros;
        self.thread_timestamp1 = thread_end_micros;
    }

    pub fn instant(&mut self, label: impl Into<Cow<'static, str>>, micros: i64) {
        self.init(EventPhase::Instant, label.into());
        self.timestamp0 = micros;
    }

    pub fn counter(&mut self, label: impl Into<Cow<'static, str>>, micros: i64) {
        self.init(EventPhase::Counter, label.into());
        self.timestamp0 = micros;
    }

    pub fn metadata(&mut self, label: impl Into<Cow<'static, str>>, micros: i64) {
        self.init(EventPhase::Metadata, label.into());
        self.timestamp0 = micros;
    }

    pub fn async_begin(&mut self, label: impl Into<Cow<'static, str>>, async_id: i64, micros: i64) {
        self.init(EventPhase::AsyncBegin, label.into());
        self.timestamp0 = micros;
        self.timestamp1 = async_id;
    }

    pub fn async_instant(
        &mut self,
        label: impl Into<Cow<'static, str>>,
        async_id: i64,
        micros: i64,
    ) {
        self.init(EventPhase::AsyncInstant, label.into());
        self.timestamp0 = micros;
        self.timestamp1 = async_id;
    }

    pub fn async_end(&mut self, label: impl Into<Cow<'static, str>>, async_id: i64, micros: i64) {
        self.init(EventPhase::AsyncEnd, label.into());
        self.timestamp0 = micros;
        self.timestamp1 = async_id;
    }

    pub fn flow_begin(&mut self, label: impl Into<Cow<'static, str>>, flow_id: i64, micros: i64) {
        self.init(EventPhase::FlowBegin, label.into());
        self.timestamp0 = micros;
        self.timestamp1 = flow_id;
    }

    pub fn flow_step(&mut self, label: impl Into<Cow<'static, str>>, flow_id: i64, micros: i64) {
        self.init(EventPhase::FlowStep, label.into());
        self.timestamp0 = micros;
        self.timestamp1 = flow_id;
    }

    pub fn flow_end(&mut self, label: impl Into<Cow<'static, str>>, flow_id: i64, micros: i64) {
        self.init(EventPhase::FlowEnd, label.into());
        self.timestamp0 = micros;
        self.timestamp1 = flow_id;
    }

    fn init(&mut self, phase: EventPhase, label: Cow<'static, str>) {
        self.reset();
        self.phase = phase;
        self.label = label;
        self.thread_id = time::current_trace_id();
        let (isolate_id, isolate_group_id) = registry::current_isolate_ids();
        self.isolate_id = isolate_id;
        self.isolate_group_id = isolate_group_id;
    }

    pub fn phase(&self) -> EventPhase {
        self.phase
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// A default-constructed event is invalid until a phase constructor runs.
    pub fn is_valid(&self) -> bool {
        self.phase != EventPhase::None
    }

    pub fn stream(&self) -> Option<&'static TimelineStream> {
        self.stream
    }

    pub(crate) fn set_stream(&mut self, stream: &'static TimelineStream) {
        self.stream = Some(stream);
    }

    pub fn thread_id(&self) -> i64 {
        self.thread_id
    }

    pub fn isolate_id(&self) -> i64 {
        self.isolate_id
    }

    pub fn isolate_group_id(&self) -> u64 {
        self.isolate_group_id
    }

    pub fn time_origin(&self) -> i64 {
        self.timestamp0
    }

    /// End timestamp of a closed duration.
    pub fn time_end(&self) -> i64 {
        debug_assert!(self.is_finished_duration());
        self.timestamp1
    }

    /// The correlation id of async, flow and begin/end events.
    pub fn id(&self) -> i64 {
        self.timestamp1
    }

    pub fn is_duration(&self) -> bool {
        self.phase == EventPhase::Duration
    }

    pub fn is_finished_duration(&self) -> bool {
        self.phase == EventPhase::Duration && self.timestamp1 > 0
    }

    /// Wall-clock duration. An open duration (no end timestamp yet) is
    /// measured against the clock at call time.
    pub fn time_duration(&self) -> i64 {
        if self.timestamp1 == 0 {
            return time::monotonic_micros() - self.timestamp0;
        }
        self.timestamp1 - self.timestamp0
    }

    pub fn has_thread_cpu_time(&self) -> bool {
        self.thread_timestamp0 != NO_THREAD_CPU_TIME
    }

    pub fn thread_cpu_time_origin(&self) -> i64 {
        debug_assert!(self.has_thread_cpu_time());
        self.thread_timestamp0
    }

    fn has_thread_cpu_duration(&self) -> bool {
        self.thread_timestamp0 != NO_THREAD_CPU_TIME && self.thread_timestamp1 != NO_THREAD_CPU_TIME
    }

    pub fn thread_cpu_time_duration(&self) -> i64 {
        debug_assert!(self.has_thread_cpu_duration());
        self.thread_timestamp1 - self.thread_timestamp0
    }

    /// Lowest timestamp this event contributes to the recorded time range.
    pub fn low_time(&self) -> i64 {
        self.timestamp0
    }

    /// Highest timestamp this event contributes to the recorded time range.
    pub fn high_time(&self) -> i64 {
        if self.phase == EventPhase::Duration {
            self.timestamp1
        } else {
            self.timestamp0
        }
    }

    /// Whether this event falls inside the window starting at `time_origin_micros`
    /// and extending `time_extent_micros`. A sentinel of `-1` for either bound
    /// matches unconditionally. Closed durations match if the intervals
    /// intersect; every other phase matches on its origin timestamp.
    pub fn within(&self, time_origin_micros: i64, time_extent_micros: i64) -> bool {
        if time_origin_micros == -1 || time_extent_micros == -1 {
            return true;
        }
        if self.is_finished_duration() {
            let e_t0 = self.time_origin();
            let e_t1 = self.time_end();
            debug_assert!(e_t0 <= e_t1);
            let r_t0 = time_origin_micros;
            let r_t1 = time_origin_micros + time_extent_micros;
            return !(r_t1 < e_t0 || e_t1 < r_t0);
        }
        let delta = self.time_origin() - time_origin_micros;
        delta >= 0 && delta <= time_extent_micros
    }

    pub fn set_num_arguments(&mut self, length: usize) {
        self.arguments.set_num_arguments(length);
    }

    pub fn set_argument(&mut self, i: usize, name: &'static str, value: String) {
        self.arguments.set_argument(i, name, value);
    }

    pub fn copy_argument(&mut self, i: usize, name: &'static str, value: &str) {
        self.arguments.copy_argument(i, name, value);
    }

    pub fn format_argument(&mut self, i: usize, name: &'static str, value: fmt::Arguments<'_>) {
        self.arguments.format_argument(i, name, value);
    }

    pub fn steal_arguments(&mut self, other: &mut TimelineEventArguments) {
        self.arguments.steal(other);
    }

    pub fn arguments(&self) -> &TimelineEventArguments {
        &self.arguments
    }

    pub(crate) fn set_pre_serialized_args(&mut self, pre_serialized: bool) {
        self.pre_serialized_args = pre_serialized;
    }

    pub fn pre_serialized_args(&self) -> bool {
        self.pre_serialized_args
    }

    /// Serialize this event as one Chrome Trace Event object.
    pub fn write_json(&self, writer: &mut JsonWriter) {
        writer.open_object();
        writer.string_property("name", &self.label);
        match self.stream {
            Some(stream) => writer.string_property("cat", stream.name()),
            None => writer.null_property("cat"),
        }
        writer.int_property("tid", self.thread_id);
        writer.int_property("pid", std::process::id() as i64);
        writer.int_property("ts", self.time_origin());
        if self.has_thread_cpu_time() {
            writer.int_property("tts", self.thread_cpu_time_origin());
        }
        match self.phase {
            EventPhase::Begin => {
                writer.string_property("ph", "B");
            }
            EventPhase::End => {
                writer.string_property("ph", "E");
            }
            EventPhase::Duration => {
                writer.string_property("ph", "X");
                writer.int_property("dur", self.time_duration());
                if self.has_thread_cpu_duration() {
                    writer.int_property("tdur", self.thread_cpu_time_duration());
                }
            }
            EventPhase::Instant => {
                writer.string_property("ph", "i");
                writer.string_property("s", "p");
            }
            EventPhase::AsyncBegin => {
                writer.string_property("ph", "b");
                self.write_id(writer);
            }
            EventPhase::AsyncInstant => {
                writer.string_property("ph", "n");
                self.write_id(writer);
            }
            EventPhase::AsyncEnd => {
                writer.string_property("ph", "e");
                self.write_id(writer);
            }
            EventPhase::Counter => {
                writer.string_property("ph", "C");
            }
            EventPhase::FlowBegin => {
                writer.string_property("ph", "s");
                self.write_id(writer);
            }
            EventPhase::FlowStep => {
                writer.string_property("ph", "t");
                self.write_id(writer);
            }
            EventPhase::FlowEnd => {
                writer.string_property("ph", "f");
                writer.string_property("bp", "e");
                self.write_id(writer);
            }
            EventPhase::Metadata => {
                writer.string_property("ph", "M");
            }
            EventPhase::None => debug_assert!(false, "serializing an uninitialized event"),
        }
        self.write_args(writer);
        writer.close_object();
    }

    fn write_id(&self, writer: &mut JsonWriter) {
        writer.format_property("id", format_args!("{:x}", self.id() as u64));
    }

    // Pre-serialized arguments are spliced verbatim; the object is re-opened
    // only when isolate ids must be appended.
    fn write_args(&self, writer: &mut JsonWriter) {
        if self.pre_serialized_args {
            debug_assert_eq!(self.arguments.len(), 1);
            let serialized = self.arguments.get(0).map_or("{}", |arg| arg.value.as_str());
            writer.raw_property("args", serialized);
            if self.isolate_id != NO_ISOLATE {
                writer.unclose_object();
                writer.format_property("isolateId", format_args!("isolates/{}", self.isolate_id));
                writer.close_object();
            }
            if self.isolate_group_id != NO_ISOLATE_GROUP {
                writer.unclose_object();
                writer.format_property(
                    "isolateGroupId",
                    format_args!("isolateGroups/{}", self.isolate_group_id),
                );
                writer.close_object();
            }
        } else {
            writer.open_object_property("args");
            for argument in self.arguments.iter() {
                writer.string_property(argument.name, &argument.value);
            }
            if self.isolate_id != NO_ISOLATE {
                writer.format_property("isolateId", format_args!("isolates/{}", self.isolate_id));
            }
            if self.isolate_group_id != NO_ISOLATE_GROUP {
                writer.format_property(
                    "isolateGroupId",
                    format_args!("isolateGroups/{}", self.isolate_group_id),
                );
            }
            writer.close_object();
        }
    }
}
