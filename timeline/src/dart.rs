//! Native entry points backing the `dart:developer` timeline API.
//!
//! All three report entries route through the Dart stream and attach their
//! argument payload pre-serialized: the language side has already rendered
//! its argument tree to JSON, and the serializer splices it verbatim rather
//! than paying for a second encoding. When the stream is off every entry is
//! a no-op; the caller-owned strings are simply dropped.

use crate::stream::STREAM_DART;
use crate::time;
use crate::Timeline;

/// Whether the Dart stream currently records events.
pub fn is_dart_stream_enabled() -> bool {
    STREAM_DART.enabled()
}

/// A fresh task id for correlating begin/end and async event pairs.
pub fn get_next_task_id() -> i64 {
    Timeline::next_task_id()
}

/// The trace clock, for user code that wants to pre-compute timestamps.
pub fn get_trace_clock() -> i64 {
    time::monotonic_micros()
}

/// Flow event kinds accepted by [`report_flow_event`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowEventType {
    Begin,
    Step,
    End,
}

/// Report an async or synchronous task event.
///
/// `phase` selects the event kind: `n`/`b`/`e` for async instant, begin and
/// end, `B`/`E` for synchronous begin and end. Any other glyph is a
/// programmer error in the binding and asserts. The `category` is accepted
/// for API compatibility; recorded events carry the Dart stream as their
/// category.
pub fn report_task_event(id: i64, phase: char, _category: &str, name: String, args_json: String) {
    assert!(
        matches!(phase, 'n' | 'b' | 'e' | 'B' | 'E'),
        "invalid task event phase {phase:?}"
    );
    let Some(mut event) = STREAM_DART.start_event() else {
        return;
    };
    let start = time::monotonic_micros();
    let start_cpu = time::thread_cpu_micros();
    match phase {
        'n' => event.async_instant(name, id, start),
        'b' => event.async_begin(name, id, start),
        'e' => event.async_end(name, id, start),
        'B' => event.begin(name, id, start, start_cpu),
        'E' => event.end(name, id, start, start_cpu),
        _ => unreachable!(),
    }
    event.complete_with_pre_serialized_args(args_json);
}

/// Report one leg of a flow, correlated by `flow_id`.
pub fn report_flow_event(
    _category: &str,
    name: String,
    kind: FlowEventType,
    flow_id: i64,
    args_json: String,
) {
    let Some(mut event) = STREAM_DART.start_event() else {
        return;
    };
    let start = time::monotonic_micros();
    match kind {
        FlowEventType::Begin => event.flow_begin(name, flow_id, start),
        FlowEventType::Step => event.flow_step(name, flow_id, start),
        FlowEventType::End => event.flow_end(name, flow_id, start),
    }
    event.complete_with_pre_serialized_args(args_json);
}

/// Report an instantaneous event.
pub fn report_instant_event(_category: &str, name: String, args_json: String) {
    let Some(mut event) = STREAM_DART.start_event() else {
        return;
    };
    event.instant(name, time::monotonic_micros());
    event.complete_with_pre_serialized_args(args_json);
}
