//! Timeline configuration flags.
//!
//! Hosts hand a [`TimelineFlags`] value to `Timeline::init`; the struct can
//! also be deserialized from a TOML fragment so embedders can keep it in
//! their existing config files. Flag semantics follow the recorder they
//! select: `timeline_dir` and `complete_timeline` force the endless
//! recorder and implicitly record every stream.

use std::path::Path;

use serde::Deserialize;

use crate::TimelineError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimelineFlags {
    /// Record the complete timeline: endless recorder, all streams enabled.
    pub complete_timeline: bool,

    /// Record the startup timeline: startup recorder, all streams enabled.
    pub startup_timeline: bool,

    /// Route events to the platform's tracing service if there is one.
    pub systrace_timeline: bool,

    /// Log the recorder backend's own activity.
    pub trace_timeline: bool,

    /// Directory to write `dart-timeline-<pid>.json` into at cleanup.
    /// Forces the endless recorder and enables every stream.
    pub timeline_dir: Option<String>,

    /// Comma-separated stream names to record. Tokens match stream names by
    /// substring; the token `all` enables every stream.
    pub timeline_streams: Option<String>,

    /// Recorder selection: `ring`, `endless`, `startup`, `systrace`, `file`,
    /// `file:<path>` or `file=<path>`. Unknown values fall back to `ring`.
    pub timeline_recorder: String,
}

impl Default for TimelineFlags {
    fn default() -> Self {
        TimelineFlags {
            complete_timeline: false,
            startup_timeline: false,
            systrace_timeline: false,
            trace_timeline: false,
            timeline_dir: None,
            timeline_streams: None,
            timeline_recorder: "ring".to_string(),
        }
    }
}

impl TimelineFlags {
    pub fn load(path: impl AsRef<Path>) -> Result<TimelineFlags, TimelineError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Whether `stream_name` should be recorded under these flags.
    pub(crate) fn stream_enabled_by_default(&self, stream_name: &str) -> bool {
        if self.timeline_dir.is_some() || self.complete_timeline || self.startup_timeline {
            return true;
        }
        let Some(streams) = &self.timeline_streams else {
            return false;
        };
        streams
            .split(',')
            .any(|token| token.contains("all") || token.contains(stream_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_select_the_ring_recorder() {
        let flags = TimelineFlags::default();
        assert_eq!(flags.timeline_recorder, "ring");
        assert!(!flags.complete_timeline);
        assert!(flags.timeline_streams.is_none());
    }

    #[test]
    fn loads_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timeline.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "timeline_recorder = \"endless\"\ntimeline_streams = \"Dart,GC\"\ntrace_timeline = true"
        )
        .unwrap();

        let flags = TimelineFlags::load(&path).unwrap();
        assert_eq!(flags.timeline_recorder, "endless");
        assert_eq!(flags.timeline_streams.as_deref(), Some("Dart,GC"));
        assert!(flags.trace_timeline);
    }

    #[test]
    fn malformed_toml_surfaces_a_flags_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "timeline_recorder = [").unwrap();
        assert!(matches!(
            TimelineFlags::load(&path),
            Err(TimelineError::Flags(_))
        ));
    }

    #[test]
    fn stream_selection_matches_tokens_by_substring() {
        let flags = TimelineFlags {
            timeline_streams: Some("CompilerVerbose,GC".to_string()),
            ..Default::default()
        };
        assert!(flags.stream_enabled_by_default("GC"));
        assert!(flags.stream_enabled_by_default("CompilerVerbose"));
        // The token contains the shorter stream name too.
        assert!(flags.stream_enabled_by_default("Compiler"));
        assert!(!flags.stream_enabled_by_default("Dart"));
    }

    #[test]
    fn the_all_token_enables_every_stream() {
        let flags = TimelineFlags {
            timeline_streams: Some("all".to_string()),
            ..Default::default()
        };
        assert!(flags.stream_enabled_by_default("Dart"));
        assert!(flags.stream_enabled_by_default("VM"));
    }

    #[test]
    fn timeline_dir_enables_every_stream() {
        let flags = TimelineFlags {
            timeline_dir: Some("/tmp".to_string()),
            ..Default::default()
        };
        assert!(flags.stream_enabled_by_default("Debugger"));
    }

    #[test]
    fn no_flags_enable_no_streams() {
        let flags = TimelineFlags::default();
        assert!(!flags.stream_enabled_by_default("Dart"));
    }
}
