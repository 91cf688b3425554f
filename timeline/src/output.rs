//! Callback-style recorders: per-event heap allocation, immediate delivery.
//!
//! These strategies never touch the block machinery. Every completed event
//! arrives as an owned box and is gone once the strategy returns, so any
//! sink that outlives the call must copy what it needs.

use std::collections::VecDeque;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use tracing::warn;

use trace_format::JsonWriter;

use crate::event::{EventPhase, TimelineEvent};
use crate::TimelineError;

/// Delivers each event to a host callback.
pub(crate) struct CallbackRecorder {
    on_event: Box<dyn Fn(&TimelineEvent) + Send + Sync>,
}

impl CallbackRecorder {
    pub(crate) fn new(on_event: impl Fn(&TimelineEvent) + Send + Sync + 'static) -> CallbackRecorder {
        CallbackRecorder {
            on_event: Box::new(on_event),
        }
    }

    pub(crate) fn on_event(&self, event: &TimelineEvent) {
        (self.on_event)(event);
    }
}

struct QueueState {
    events: VecDeque<Box<TimelineEvent>>,
    shutting_down: bool,
}

struct Sink {
    writer: Option<Box<dyn Write + Send>>,
    first: bool,
}

impl Sink {
    fn write(&mut self, bytes: &[u8]) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        if let Err(error) = writer.write_all(bytes) {
            warn!(%error, "failed to write timeline trace, dropping further output");
            self.writer = None;
        }
    }
}

struct DrainQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    sink: Mutex<Sink>,
}

impl DrainQueue {
    fn write_event(&self, event: &TimelineEvent) {
        let mut writer = JsonWriter::new();
        event.write_json(&mut writer);
        let json = writer.steal();
        let mut sink = self.sink.lock();
        if sink.first {
            sink.first = false;
        } else {
            sink.write(b",\n");
        }
        sink.write(json.as_bytes());
    }

    fn close(&self) {
        let mut sink = self.sink.lock();
        sink.write(b"]\n");
        if let Some(mut writer) = sink.writer.take() {
            let _ = writer.flush();
        }
    }
}

/// Streams events to a file as a Chrome Trace Event JSON array.
///
/// Completed events are pushed onto a monitor-guarded FIFO and written by a
/// dedicated consumer thread. Viewers tolerate an array form with the
/// closing `]` missing, so a crash mid-trace still leaves a readable file.
pub(crate) struct FileRecorder {
    queue: Arc<DrainQueue>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl FileRecorder {
    pub(crate) fn create(path: &Path) -> FileRecorder {
        match std::fs::File::create(path) {
            Ok(file) => Self::with_writer(Box::new(file)),
            Err(error) => {
                warn!(%error, path = %path.display(), "failed to open timeline trace file");
                Self::silent()
            }
        }
    }

    pub(crate) fn with_writer(writer: Box<dyn Write + Send>) -> FileRecorder {
        let recorder = FileRecorder::with_sink(Some(writer));
        recorder.queue.sink.lock().write(b"[\n");
        let queue = recorder.queue.clone();
        let spawned = std::thread::Builder::new()
            .name("timeline-file-recorder".to_string())
            .spawn(move || drain(queue));
        match spawned {
            Ok(handle) => *recorder.worker.lock() = Some(handle),
            Err(error) => {
                warn!(%error, "failed to start timeline drain thread");
                recorder.queue.sink.lock().writer = None;
            }
        }
        recorder
    }

    fn silent() -> FileRecorder {
        FileRecorder::with_sink(None)
    }

    fn with_sink(writer: Option<Box<dyn Write + Send>>) -> FileRecorder {
        FileRecorder {
            queue: Arc::new(DrainQueue {
                state: Mutex::new(QueueState {
                    events: VecDeque::new(),
                    shutting_down: false,
                }),
                available: Condvar::new(),
                sink: Mutex::new(Sink {
                    writer,
                    first: true,
                }),
            }),
            worker: Mutex::new(None),
        }
    }

    pub(crate) fn enqueue(&self, event: Box<TimelineEvent>) {
        if self.queue.sink.lock().writer.is_none() {
            return;
        }
        let mut state = self.queue.state.lock();
        debug_assert!(!state.shutting_down);
        state.events.push_back(event);
        drop(state);
        self.queue.available.notify_one();
    }
}

fn drain(queue: Arc<DrainQueue>) {
    loop {
        let event = {
            let mut state = queue.state.lock();
            loop {
                if state.shutting_down {
                    return;
                }
                if let Some(event) = state.events.pop_front() {
                    break event;
                }
                queue.available.wait(&mut state);
            }
        };
        // Serialization happens outside the queue lock.
        queue.write_event(&event);
    }
}

impl Drop for FileRecorder {
    fn drop(&mut self) {
        {
            let mut state = self.queue.state.lock();
            state.shutting_down = true;
        }
        self.queue.available.notify_one();
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
        // Whatever the consumer left behind still gets written.
        let remaining: Vec<Box<TimelineEvent>> = {
            let mut state = self.queue.state.lock();
            state.events.drain(..).collect()
        };
        for event in &remaining {
            self.queue.write_event(event);
        }
        self.queue.close();
    }
}

/// Shim over the kernel trace marker, in the `B|pid|name` convention the
/// platform trace tools consume.
pub(crate) struct SystraceRecorder {
    marker: Mutex<std::fs::File>,
}

impl SystraceRecorder {
    pub(crate) fn open() -> Result<SystraceRecorder, TimelineError> {
        let marker = std::fs::OpenOptions::new()
            .write(true)
            .open("/sys/kernel/tracing/trace_marker")
            .or_else(|_| {
                std::fs::OpenOptions::new()
                    .write(true)
                    .open("/sys/kernel/debug/tracing/trace_marker")
            })?;
        Ok(SystraceRecorder {
            marker: Mutex::new(marker),
        })
    }

    pub(crate) fn emit(&self, event: &TimelineEvent) {
        let pid = std::process::id();
        let record = match event.phase() {
            EventPhase::Begin => format!("B|{pid}|{}", event.label()),
            EventPhase::End => "E".to_string(),
            EventPhase::Instant => format!("I|{pid}|{}", event.label()),
            EventPhase::Counter => {
                let value = event.arguments().get(0).map_or("0", |arg| arg.value.as_str());
                format!("C|{pid}|{}|{}", event.label(), value)
            }
            _ => return,
        };
        // Tracing must never destabilize the program it observes; marker
        // write errors are dropped.
        let _ = self.marker.lock().write_all(record.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn boxed_instant(label: &'static str, ts: i64) -> Box<TimelineEvent> {
        let mut event = Box::<TimelineEvent>::default();
        event.instant(label, ts);
        event
    }

    #[test]
    fn callback_recorder_sees_every_event() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_by_callback = seen.clone();
        let recorder = CallbackRecorder::new(move |event| {
            assert_eq!(event.label(), "cb");
            seen_by_callback.fetch_add(1, Ordering::Relaxed);
        });

        recorder.on_event(&boxed_instant("cb", 1));
        recorder.on_event(&boxed_instant("cb", 2));
        assert_eq!(seen.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn file_recorder_frames_events_as_a_json_array() {
        let buffer = SharedBuffer::default();
        {
            let recorder = FileRecorder::with_writer(Box::new(buffer.clone()));
            recorder.enqueue(boxed_instant("one", 1));
            recorder.enqueue(boxed_instant("two", 2));
        }

        let contents = buffer.contents();
        assert!(contents.starts_with("[\n"));
        assert!(contents.contains(",\n"));
        assert!(contents.ends_with("]\n"));

        let events: Vec<serde_json::Value> = serde_json::from_str(&contents).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["name"], "one");
        assert_eq!(events[1]["name"], "two");
    }

    #[test]
    fn file_recorder_with_no_events_writes_an_empty_array() {
        let buffer = SharedBuffer::default();
        drop(FileRecorder::with_writer(Box::new(buffer.clone())));
        let events: Vec<serde_json::Value> =
            serde_json::from_str(&buffer.contents()).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn unopenable_file_degrades_to_a_silent_sink() {
        let recorder = FileRecorder::create(Path::new("/nonexistent-dir/trace.json"));
        // Events are dropped without blocking or panicking.
        recorder.enqueue(boxed_instant("dropped", 1));
    }
}
