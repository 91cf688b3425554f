//! Named, independently-enabled event streams.
//!
//! Streams are the gate in front of event creation: instrumentation points
//! ask their stream for an event, and a disabled stream answers `None`
//! before any allocation or argument work happens. The stream table is
//! static and outlives every recorder.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::lock::RecorderLock;
use crate::recorder::TimelineEventGuard;
use crate::Timeline;

/// A named category of timeline events with an atomic enable bit.
#[derive(Debug)]
pub struct TimelineStream {
    name: &'static str,
    // Stream name used by platform-native tracing backends.
    platform_alias: &'static str,
    has_static_labels: bool,
    enabled: AtomicBool,
}

impl TimelineStream {
    pub const fn new(
        name: &'static str,
        platform_alias: &'static str,
        has_static_labels: bool,
    ) -> TimelineStream {
        TimelineStream {
            name,
            platform_alias,
            has_static_labels,
            enabled: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn platform_alias(&self) -> &'static str {
        self.platform_alias
    }

    /// Whether every label emitted on this stream is a compile-time string.
    pub fn has_static_labels(&self) -> bool {
        self.has_static_labels
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Obtain a writable event slot on this stream.
    ///
    /// Returns `None` when the stream is disabled, no recorder is installed,
    /// shutdown is in progress, or the recorder cannot provide a slot. On
    /// success the caller owns the slot until the guard completes (drops);
    /// the shutdown gate stays held for that whole window so the backing
    /// storage cannot be freed mid-write.
    pub fn start_event(&'static self) -> Option<TimelineEventGuard> {
        RecorderLock::enter();
        let usable = self.enabled() && !RecorderLock::is_shutting_down();
        let Some(recorder) = Timeline::recorder().filter(|_| usable) else {
            RecorderLock::exit();
            return None;
        };
        match TimelineEventGuard::start(recorder) {
            Some(mut event) => {
                event.set_stream(self);
                Some(event)
            }
            None => {
                RecorderLock::exit();
                None
            }
        }
    }
}

pub static STREAM_API: TimelineStream = TimelineStream::new("API", "dart:api", true);
pub static STREAM_COMPILER: TimelineStream = TimelineStream::new("Compiler", "dart:compiler", true);
pub static STREAM_COMPILER_VERBOSE: TimelineStream =
    TimelineStream::new("CompilerVerbose", "dart:compiler-verbose", true);
pub static STREAM_DART: TimelineStream = TimelineStream::new("Dart", "dart:dart", false);
pub static STREAM_DEBUGGER: TimelineStream = TimelineStream::new("Debugger", "dart:debugger", true);
pub static STREAM_EMBEDDER: TimelineStream =
    TimelineStream::new("Embedder", "dart:embedder", false);
pub static STREAM_GC: TimelineStream = TimelineStream::new("GC", "dart:gc", true);
pub static STREAM_ISOLATE: TimelineStream = TimelineStream::new("Isolate", "dart:isolate", true);
pub static STREAM_VM: TimelineStream = TimelineStream::new("VM", "dart:vm", true);

/// Every stream in the static table, in declaration order.
pub fn all_streams() -> [&'static TimelineStream; 9] {
    [
        &STREAM_API,
        &STREAM_COMPILER,
        &STREAM_COMPILER_VERBOSE,
        &STREAM_DART,
        &STREAM_DEBUGGER,
        &STREAM_EMBEDDER,
        &STREAM_GC,
        &STREAM_ISOLATE,
        &STREAM_VM,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_stream_table_contains_the_dart_stream() {
        assert!(all_streams().iter().any(|s| s.name() == "Dart"));
        assert_eq!(STREAM_DART.platform_alias(), "dart:dart");
    }

    #[test]
    fn disabled_stream_hands_out_no_event() {
        assert!(!STREAM_API.enabled());
        assert!(STREAM_API.start_event().is_none());
    }

    #[test]
    fn enabled_stream_without_recorder_hands_out_no_event() {
        STREAM_EMBEDDER.set_enabled(true);
        let got = STREAM_EMBEDDER.start_event();
        STREAM_EMBEDDER.set_enabled(false);
        assert!(got.is_none());
    }
}
