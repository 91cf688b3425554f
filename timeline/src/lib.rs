//! In-process timeline event recorder.
//!
//! Instrumentation points in the runtime, in host code and in user code emit
//! short-lived events (instants, duration spans, async flows, counters,
//! metadata) that this crate collects with near-zero synchronization on the
//! hot path and serializes in the Chrome Trace Event format.
//!
//! # Writing events
//!
//! Events are written into [`TimelineEventBlock`]s. Each thread caches one
//! open block in its registry entry so it can append events without
//! contending with other writers. The block may still need to be reclaimed
//! by the reporting side, so a thread holds its own block lock for the
//! lifetime of every event it writes; that lock is only ever contended when
//! blocks are being reclaimed.
//!
//! # Reporting
//!
//! A reporter first reclaims every thread's cached block, which is safe
//! because it takes each thread's block lock and the block therefore cannot
//! be mid-write. It then walks the recorder's pool oldest-first, filtering
//! and serializing events.
//!
//! # Lock ordering
//!
//! Always outermost first: the thread registry's list lock, then a thread's
//! block lock, then the recorder's pool lock. Separately, the
//! [`Timeline`] facade's shutdown gate counts in-flight writes and holds
//! teardown back until they drain.

use std::io::Write as _;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwapOption;
use thiserror::Error;
use tracing::{info, warn};

mod block;
mod event;
mod flags;
mod lock;
mod output;
mod recorder;
mod registry;
mod scope;
mod stream;

pub mod dart;
pub mod time;

pub use block::{TimelineEventBlock, BLOCK_SIZE};
pub use event::{
    EventPhase, TimelineEvent, TimelineEventArgument, TimelineEventArguments, NO_ISOLATE,
    NO_ISOLATE_GROUP, NO_THREAD_CPU_TIME,
};
pub use flags::TimelineFlags;
pub use recorder::{
    TimelineEventFilter, TimelineEventGuard, TimelineRecorder, DEFAULT_RECORDER_CAPACITY,
};
pub use scope::TimelineBeginEndScope;
pub use stream::{
    all_streams, TimelineStream, STREAM_API, STREAM_COMPILER, STREAM_COMPILER_VERBOSE, STREAM_DART,
    STREAM_DEBUGGER, STREAM_EMBEDDER, STREAM_GC, STREAM_ISOLATE, STREAM_VM,
};

use lock::{RecorderLock, RecorderLockScope};
use registry::ThreadRegistry;
use trace_format::JsonWriter;

#[derive(Error, Debug)]
pub enum TimelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed timeline flags: {0}")]
    Flags(#[from] toml::de::Error),
}

/// Summary of a block handed back to the recorder pool, for hosts that
/// subscribe to block-finished notifications.
#[derive(Clone, Copy, Debug)]
pub struct BlockFinished {
    pub block_index: u64,
    pub thread_id: i64,
    pub length: usize,
}

static RECORDER: ArcSwapOption<TimelineRecorder> = ArcSwapOption::const_empty();
static FLAGS: ArcSwapOption<TimelineFlags> = ArcSwapOption::const_empty();
static NEXT_TASK_ID: AtomicI64 = AtomicI64::new(1);
static BLOCK_FINISHED_LISTENER: OnceLock<Box<dyn Fn(&BlockFinished) + Send + Sync>> =
    OnceLock::new();

// Invoked under the recorder's pool lock; listeners must not call back into
// the timeline.
pub(crate) fn notify_block_finished(block: &TimelineEventBlock) {
    if let Some(listener) = BLOCK_FINISHED_LISTENER.get() {
        listener(&BlockFinished {
            block_index: block.block_index(),
            thread_id: block.thread_id(),
            length: block.length(),
        });
    }
}

/// The process-global timeline facade.
///
/// [`Timeline::init`] installs exactly one recorder; [`Timeline::cleanup`]
/// flushes, waits for in-flight writers through the shutdown gate, and
/// destroys it. Neither is reentrant.
pub struct Timeline;

impl Timeline {
    /// Construct and install the recorder selected by `flags`, and apply the
    /// flags' stream enabling.
    pub fn init(flags: TimelineFlags) {
        let recorder = create_recorder(&flags);
        Self::init_with_recorder(flags, recorder);
    }

    /// Install a caller-constructed recorder, overriding the flag-driven
    /// selection. Stream enabling still follows `flags`.
    pub fn init_with_recorder(flags: TimelineFlags, recorder: TimelineRecorder) {
        if RECORDER.load().is_some() {
            warn!("timeline is already initialized, ignoring init");
            return;
        }
        if flags.trace_timeline {
            info!(recorder = recorder.name(), "using timeline recorder");
        }
        for stream in all_streams() {
            stream.set_enabled(flags.stream_enabled_by_default(stream.name()));
        }
        RECORDER.store(Some(Arc::new(recorder)));
        FLAGS.store(Some(Arc::new(flags)));
    }

    /// Tear the timeline down: flush to `timeline_dir` if configured,
    /// disable every stream, wait for in-flight writers, reclaim and clear,
    /// and destroy the recorder.
    pub fn cleanup() {
        let flags = FLAGS.swap(None);
        if let Some(flags) = flags.as_deref() {
            if let Some(directory) = &flags.timeline_dir {
                Self::write_to(directory);
            }
        }
        for stream in all_streams() {
            stream.set_enabled(false);
        }
        RecorderLock::wait_for_shutdown();
        // Past the gate no writer can reach the recorder, so the unguarded
        // reclaim and clear are safe.
        if let Some(recorder) = RECORDER.swap(None) {
            Self::reclaim_unsafe(&recorder);
            recorder.clear();
        }
        RecorderLock::rearm();
    }

    /// The installed recorder, if any.
    pub fn recorder() -> Option<Arc<TimelineRecorder>> {
        RECORDER.load_full()
    }

    /// Reclaim every thread's open block and reset the recorder's storage.
    pub fn clear() {
        let scope = RecorderLockScope::new();
        let Some(recorder) = Self::recorder() else {
            return;
        };
        if scope.is_shutting_down() {
            return;
        }
        Self::reclaim_unsafe(&recorder);
        recorder.clear();
    }

    /// Steal every thread's cached open block and merge it into the
    /// recorder's pool. Idempotent: a second call finds every slot empty.
    pub fn reclaim_cached_blocks_from_threads() {
        let scope = RecorderLockScope::new();
        let Some(recorder) = Self::recorder() else {
            return;
        };
        if scope.is_shutting_down() {
            return;
        }
        Self::reclaim_unsafe(&recorder);
    }

    fn reclaim_unsafe(recorder: &TimelineRecorder) {
        ThreadRegistry::global().for_each(|entry| {
            // Holding the thread's block lock means the block is not
            // mid-write, so stealing it is safe.
            let block = entry.block_slot().lock().take();
            if let Some(block) = block {
                recorder.finish_block(block);
            }
        });
    }

    /// Write the current trace into `directory` as
    /// `dart-timeline-<pid>.json`, in the bare-array form.
    pub fn write_to(directory: &str) {
        Self::reclaim_cached_blocks_from_threads();
        let Some(recorder) = Self::recorder() else {
            return;
        };
        let path = format!("{directory}/dart-timeline-{}.json", std::process::id());
        let mut file = match std::fs::File::create(&path) {
            Ok(file) => file,
            Err(error) => {
                warn!(%error, path, "failed to open timeline output file");
                return;
            }
        };
        let mut writer = JsonWriter::with_capacity(64 * 1024);
        recorder.write_trace_event(&mut writer, &TimelineEventFilter::default());
        let output = writer.steal();
        if let Err(error) = file.write_all(output.as_bytes()) {
            warn!(%error, path, "failed to write timeline output file");
        }
    }

    /// Report the recorder name plus available and recorded streams.
    pub fn print_flags_to_json(writer: &mut JsonWriter) {
        writer.open_object();
        writer.string_property("type", "TimelineFlags");
        {
            let scope = RecorderLockScope::new();
            match Self::recorder() {
                Some(recorder) if !scope.is_shutting_down() => {
                    writer.string_property("recorderName", recorder.name())
                }
                _ => writer.string_property("recorderName", "null"),
            }
        }
        writer.open_array_property("availableStreams");
        for stream in all_streams() {
            writer.string_value(stream.name());
        }
        writer.close_array();
        writer.open_array_property("recordedStreams");
        for stream in all_streams() {
            if stream.enabled() {
                writer.string_value(stream.name());
            }
        }
        writer.close_array();
        writer.close_object();
    }

    /// Subscribe to block-finished notifications. The listener runs under
    /// the recorder's pool lock and must not call back into the timeline.
    /// Only the first registration takes effect.
    pub fn set_block_finished_listener(listener: impl Fn(&BlockFinished) + Send + Sync + 'static) {
        let _ = BLOCK_FINISHED_LISTENER.set(Box::new(listener));
    }

    /// Attribute subsequent events on the calling thread to an isolate.
    /// The sentinels [`NO_ISOLATE`] and [`NO_ISOLATE_GROUP`] clear the
    /// attribution.
    pub fn set_current_isolate(isolate_id: i64, isolate_group_id: u64) {
        registry::set_current_isolate(isolate_id, isolate_group_id);
    }

    /// Override the calling thread's name in serialized thread metadata.
    pub fn set_current_thread_name(name: &str) {
        registry::set_current_thread_name(name);
    }

    /// A fresh id for correlating begin/end and async event pairs.
    pub fn next_task_id() -> i64 {
        NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed)
    }
}

fn create_recorder(flags: &TimelineFlags) -> TimelineRecorder {
    let recorder_flag = flags.timeline_recorder.as_str();
    if flags.systrace_timeline || recorder_flag == "systrace" {
        match TimelineRecorder::systrace() {
            Ok(recorder) => return recorder,
            Err(error) => {
                warn!(%error, "systrace timeline recorder unavailable, using the ring recorder");
                return TimelineRecorder::ring(DEFAULT_RECORDER_CAPACITY);
            }
        }
    }
    if flags.timeline_dir.is_some() || flags.complete_timeline || recorder_flag == "endless" {
        return TimelineRecorder::endless();
    }
    if flags.startup_timeline || recorder_flag == "startup" {
        return TimelineRecorder::startup(DEFAULT_RECORDER_CAPACITY);
    }
    if recorder_flag == "file" {
        return TimelineRecorder::file("dart-timeline.json");
    }
    if let Some(path) = recorder_flag
        .strip_prefix("file:")
        .or_else(|| recorder_flag.strip_prefix("file="))
    {
        return TimelineRecorder::file(path);
    }
    if recorder_flag != "ring" {
        warn!(
            flag = recorder_flag,
            "unknown timeline recorder flag, using the ring recorder"
        );
    }
    TimelineRecorder::ring(DEFAULT_RECORDER_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_recorder_honors_the_flag_priorities() {
        let endless = create_recorder(&TimelineFlags {
            complete_timeline: true,
            timeline_recorder: "startup".to_string(),
            ..Default::default()
        });
        assert_eq!(endless.name(), "endless");

        let startup = create_recorder(&TimelineFlags {
            startup_timeline: true,
            ..Default::default()
        });
        assert_eq!(startup.name(), "startup");

        let by_flag = create_recorder(&TimelineFlags {
            timeline_recorder: "endless".to_string(),
            ..Default::default()
        });
        assert_eq!(by_flag.name(), "endless");
    }

    #[test]
    fn unknown_recorder_flags_fall_back_to_ring() {
        let recorder = create_recorder(&TimelineFlags {
            timeline_recorder: "holographic".to_string(),
            ..Default::default()
        });
        assert_eq!(recorder.name(), "ring");
    }

    #[test]
    fn file_recorder_flag_accepts_a_path_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let recorder = create_recorder(&TimelineFlags {
            timeline_recorder: format!("file={}", path.display()),
            ..Default::default()
        });
        assert_eq!(recorder.name(), "file");
        drop(recorder);
        assert!(path.exists());
    }

    #[test]
    fn next_task_ids_are_monotonic() {
        let a = Timeline::next_task_id();
        let b = Timeline::next_task_id();
        assert!(b > a);
    }
}
