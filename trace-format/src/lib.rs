//! # Chrome Trace Format
//!
//! Rust types for the subset of the Chrome Trace Event Format emitted by the
//! timeline recorder, plus a streaming [`JsonWriter`] for producing it.
//!
//! The Chrome Trace Event Format is the JSON representation consumed by the
//! Chrome Trace Viewer (chrome://tracing) and by Perfetto's legacy importer.
//! Traces come in two shapes:
//!
//! - **JSON Array Format**: a bare array of trace events. Viewers tolerate a
//!   missing closing bracket, which makes this form suitable for streaming to
//!   a file that may not be closed cleanly.
//! - **JSON Object Format**: an object carrying the event array together with
//!   metadata such as the covered time range.
//!
//! Each event's `ph` field selects its phase: duration begin/end (`B`/`E`),
//! complete (`X`), instant (`i`), counter (`C`), nestable async (`b`/`n`/`e`),
//! flow (`s`/`t`/`f`), and metadata (`M`). All timestamps are microseconds.

use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

mod writer;

pub use writer::JsonWriter;

/// The object-format trace produced by the recorder's service endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineTrace {
    /// Always the string `"Timeline"`.
    #[serde(rename = "type")]
    pub kind: String,

    /// The recorded events. Not necessarily sorted across threads.
    #[serde(rename = "traceEvents")]
    pub trace_events: Vec<TraceEvent>,

    /// Earliest timestamp covered by the events, in microseconds.
    #[serde(rename = "timeOriginMicros")]
    pub time_origin_micros: i64,

    /// Length of the covered time range, in microseconds.
    #[serde(rename = "timeExtentMicros")]
    pub time_extent_micros: i64,
}

/// A single trace event, discriminated by its phase.
///
/// Each variant carries a phase enum restricted to the glyphs valid for that
/// event shape, so untagged deserialization picks the right variant from the
/// `ph` field alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TraceEvent {
    Metadata(MetadataEvent),
    Complete(CompleteEvent),
    Counter(CounterEvent),
    Async(AsyncEvent),
    Flow(FlowEvent),
    Instant(InstantEvent),
    Duration(DurationEvent),
}

impl TraceEvent {
    /// The event name, used as its label in the viewer.
    pub fn name(&self) -> &str {
        match self {
            TraceEvent::Metadata(e) => &e.name,
            TraceEvent::Complete(e) => &e.name,
            TraceEvent::Counter(e) => &e.name,
            TraceEvent::Async(e) => &e.name,
            TraceEvent::Flow(e) => &e.name,
            TraceEvent::Instant(e) => &e.name,
            TraceEvent::Duration(e) => &e.name,
        }
    }
}

/// Phase glyphs for duration events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DurationPhase {
    /// Begin of a duration slice. Must be paired with a later `E`.
    #[serde(rename = "B")]
    Begin,
    /// End of a duration slice.
    #[serde(rename = "E")]
    End,
}

/// Phase glyph for complete events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CompletePhase {
    /// A begin/end pair folded into one event with an explicit duration.
    #[serde(rename = "X")]
    Complete,
}

/// Phase glyph for instant events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstantPhase {
    #[serde(rename = "i")]
    Instant,
}

/// Phase glyph for counter events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CounterPhase {
    #[serde(rename = "C")]
    Counter,
}

/// Phase glyphs for nestable async events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AsyncPhase {
    #[serde(rename = "b")]
    Begin,
    #[serde(rename = "n")]
    Instant,
    #[serde(rename = "e")]
    End,
}

/// Phase glyphs for flow events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FlowPhase {
    #[serde(rename = "s")]
    Begin,
    #[serde(rename = "t")]
    Step,
    #[serde(rename = "f")]
    End,
}

/// Phase glyph for metadata events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetadataPhase {
    #[serde(rename = "M")]
    Metadata,
}

/// Scope of an instant event, which controls its drawn height.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstantScope {
    /// Spans the entire timeline.
    #[serde(rename = "g")]
    Global,
    /// Spans every thread of the emitting process.
    #[serde(rename = "p")]
    Process,
    /// Confined to the emitting thread's lane.
    #[serde(rename = "t")]
    Thread,
}

/// Duration event marking the begin or end of a slice on one thread.
///
/// `B`/`E` pairs must nest properly within a thread; viewers match them by
/// order, not by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DurationEvent {
    pub name: String,
    /// Category used for filtering; `null` when the source had none.
    pub cat: Option<String>,
    pub ph: DurationPhase,
    /// Timestamp in microseconds.
    pub ts: i64,
    /// Thread-clock timestamp in microseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts: Option<i64>,
    pub pid: u32,
    pub tid: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

/// Complete event covering a slice with a known duration.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct CompleteEvent {
    pub name: String,
    pub cat: Option<String>,
    pub ph: CompletePhase,
    /// Start timestamp in microseconds.
    pub ts: i64,
    /// Wall-clock duration in microseconds.
    pub dur: i64,
    /// Thread-clock duration in microseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tdur: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts: Option<i64>,
    pub pid: u32,
    pub tid: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

/// Instant event marking a point in time.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct InstantEvent {
    pub name: String,
    pub cat: Option<String>,
    pub ph: InstantPhase,
    pub ts: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts: Option<i64>,
    pub pid: u32,
    pub tid: i64,
    /// Visual scope of the instant line.
    pub s: InstantScope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

/// Counter event tracking one or more numeric series over time.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct CounterEvent {
    pub name: String,
    pub cat: Option<String>,
    pub ph: CounterPhase,
    pub ts: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts: Option<i64>,
    pub pid: u32,
    pub tid: i64,
    /// Each key is a series name mapped to its value at `ts`.
    pub args: Value,
}

/// Nestable async event. Events sharing a category and id form one tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsyncEvent {
    pub name: String,
    pub cat: Option<String>,
    pub ph: AsyncPhase,
    pub ts: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts: Option<i64>,
    pub pid: u32,
    pub tid: i64,
    /// Correlation id, emitted as lowercase hex.
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

/// Flow event drawing an arrow between slices across threads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowEvent {
    pub name: String,
    pub cat: Option<String>,
    pub ph: FlowPhase,
    pub ts: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts: Option<i64>,
    pub pid: u32,
    pub tid: i64,
    /// Correlation id, emitted as lowercase hex.
    pub id: String,
    /// Binding point; `"e"` on flow ends binds to the enclosing slice.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

/// Metadata event carrying process/thread names and similar annotations.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct MetadataEvent {
    /// The metadata kind, e.g. `"thread_name"`.
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cat: Option<String>,
    pub ph: MetadataPhase,
    /// Metadata events synthesized outside the event stream omit `ts`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
    pub pid: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tid: Option<i64>,
    /// Structure depends on `name`; `thread_name` carries `{"name": …}`.
    pub args: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[test]
    fn complete_event_round_trips() {
        let event = CompleteEvent::builder()
            .name("compile".to_string())
            .cat("Compiler".to_string())
            .ph(CompletePhase::Complete)
            .ts(100)
            .dur(25)
            .pid(7)
            .tid(42)
            .build();

        let json = serde_json::to_string(&event).unwrap();
        let parsed: TraceEvent = serde_json::from_str(&json).unwrap();
        match parsed {
            TraceEvent::Complete(e) => {
                assert_eq!(e.name, "compile");
                assert_eq!(e.dur, 25);
                assert!(e.tdur.is_none());
            }
            other => panic!("expected complete event, got {other:?}"),
        }
    }

    #[rstest]
    #[case(r#"{"name":"a","cat":null,"ph":"B","ts":1,"pid":1,"tid":2,"args":{}}"#)]
    #[case(r#"{"name":"a","cat":null,"ph":"E","ts":2,"pid":1,"tid":2,"args":{}}"#)]
    fn duration_phases_deserialize(#[case] json: &str) {
        let parsed: TraceEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(parsed, TraceEvent::Duration(_)));
    }

    #[test]
    fn instant_is_not_mistaken_for_duration() {
        let json = r#"{"name":"tick","cat":"Dart","ph":"i","s":"p","ts":5,"pid":1,"tid":2,"args":{}}"#;
        let parsed: TraceEvent = serde_json::from_str(json).unwrap();
        match parsed {
            TraceEvent::Instant(e) => assert_eq!(e.s, InstantScope::Process),
            other => panic!("expected instant event, got {other:?}"),
        }
    }

    #[test]
    fn flow_end_carries_binding_point() {
        let json = r#"{"name":"f","cat":"Dart","ph":"f","bp":"e","id":"abc","ts":5,"pid":1,"tid":2,"args":{}}"#;
        let parsed: TraceEvent = serde_json::from_str(json).unwrap();
        match parsed {
            TraceEvent::Flow(e) => {
                assert_eq!(e.ph, FlowPhase::End);
                assert_eq!(e.bp.as_deref(), Some("e"));
                assert_eq!(e.id, "abc");
            }
            other => panic!("expected flow event, got {other:?}"),
        }
    }

    #[test]
    fn metadata_without_timestamp_deserializes() {
        let json = r#"{"name":"thread_name","ph":"M","pid":1,"tid":2,"args":{"name":"worker (2)","mode":"basic"}}"#;
        let parsed: TraceEvent = serde_json::from_str(json).unwrap();
        match parsed {
            TraceEvent::Metadata(e) => assert!(e.ts.is_none()),
            other => panic!("expected metadata event, got {other:?}"),
        }
    }
}
