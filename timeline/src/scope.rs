//! RAII instrumentation scopes.
//!
//! A [`TimelineBeginEndScope`] emits a Begin event when constructed and the
//! matching End event when dropped, correlating the pair with a task id.
//! Arguments gathered during the scope's lifetime ride out on the End event.
//! On a disabled stream the scope is inert: no id is consumed and argument
//! calls do nothing.

use std::borrow::Cow;
use std::fmt;

use crate::event::TimelineEventArguments;
use crate::stream::TimelineStream;
use crate::time;
use crate::Timeline;

pub struct TimelineBeginEndScope {
    stream: &'static TimelineStream,
    label: Cow<'static, str>,
    arguments: TimelineEventArguments,
    id: i64,
    enabled: bool,
}

impl TimelineBeginEndScope {
    pub fn new(
        stream: &'static TimelineStream,
        label: impl Into<Cow<'static, str>>,
    ) -> TimelineBeginEndScope {
        let enabled = stream.enabled();
        let mut scope = TimelineBeginEndScope {
            stream,
            label: label.into(),
            arguments: TimelineEventArguments::default(),
            id: if enabled { Timeline::next_task_id() } else { 0 },
            enabled,
        };
        scope.emit_begin();
        scope
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn set_num_arguments(&mut self, length: usize) {
        if self.enabled {
            self.arguments.set_num_arguments(length);
        }
    }

    pub fn set_argument(&mut self, i: usize, name: &'static str, value: String) {
        if self.enabled {
            self.arguments.set_argument(i, name, value);
        }
    }

    pub fn copy_argument(&mut self, i: usize, name: &'static str, value: &str) {
        if self.enabled {
            self.arguments.copy_argument(i, name, value);
        }
    }

    pub fn format_argument(&mut self, i: usize, name: &'static str, value: fmt::Arguments<'_>) {
        if self.enabled {
            self.arguments.format_argument(i, name, value);
        }
    }

    fn emit_begin(&mut self) {
        if !self.enabled {
            return;
        }
        match self.stream.start_event() {
            Some(mut event) => {
                event.begin(
                    self.label.clone(),
                    self.id,
                    time::monotonic_micros(),
                    time::thread_cpu_micros(),
                );
                event.complete();
            }
            // The stream was turned off under us.
            None => self.enabled = false,
        }
    }

    fn emit_end(&mut self) {
        if !self.enabled {
            return;
        }
        match self.stream.start_event() {
            Some(mut event) => {
                event.end(
                    self.label.clone(),
                    self.id,
                    time::monotonic_micros(),
                    time::thread_cpu_micros(),
                );
                event.steal_arguments(&mut self.arguments);
                event.complete();
            }
            None => self.enabled = false,
        }
    }
}

impl Drop for TimelineBeginEndScope {
    fn drop(&mut self) {
        self.emit_end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::STREAM_DEBUGGER;

    #[test]
    fn scope_on_a_disabled_stream_is_inert() {
        // Unit tests never install a recorder; the Debugger stream stays
        // disabled here.
        let mut scope = TimelineBeginEndScope::new(&STREAM_DEBUGGER, "idle");
        assert!(!scope.enabled());
        assert_eq!(scope.id(), 0);
        scope.set_num_arguments(2);
        scope.copy_argument(0, "ignored", "value");
    }
}
