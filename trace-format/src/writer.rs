//! Streaming JSON writer used by the recorder's serializer.
//!
//! The writer appends directly to an in-memory buffer and never validates
//! nesting; callers are expected to pair their open/close calls. Two
//! operations exist specifically for trace emission: [`JsonWriter::raw_property`]
//! splices an already-serialized JSON value verbatim, and
//! [`JsonWriter::unclose_object`] re-opens the most recently closed object so
//! additional properties can be appended to a spliced payload.

use std::fmt::Write as _;

/// An append-only JSON writer over a growable string buffer.
pub struct JsonWriter {
    buffer: String,
}

impl JsonWriter {
    pub fn new() -> Self {
        JsonWriter {
            buffer: String::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        JsonWriter {
            buffer: String::with_capacity(capacity),
        }
    }

    /// Begin an object in value position.
    pub fn open_object(&mut self) {
        self.maybe_comma();
        self.buffer.push('{');
    }

    /// Begin an object as a named property of the enclosing object.
    pub fn open_object_property(&mut self, name: &str) {
        self.push_key(name);
        self.buffer.push('{');
    }

    pub fn close_object(&mut self) {
        self.buffer.push('}');
    }

    /// Remove the closing brace written by the most recent [`close_object`]
    /// (or the trailing brace of a spliced object) so further properties can
    /// be appended before closing it again.
    ///
    /// [`close_object`]: JsonWriter::close_object
    pub fn unclose_object(&mut self) {
        debug_assert_eq!(self.buffer.as_bytes().last(), Some(&b'}'));
        self.buffer.pop();
    }

    /// Begin an array in value position.
    pub fn open_array(&mut self) {
        self.maybe_comma();
        self.buffer.push('[');
    }

    /// Begin an array as a named property of the enclosing object.
    pub fn open_array_property(&mut self, name: &str) {
        self.push_key(name);
        self.buffer.push('[');
    }

    pub fn close_array(&mut self) {
        self.buffer.push(']');
    }

    /// Write a string-valued property, escaping the value.
    pub fn string_property(&mut self, name: &str, value: &str) {
        self.push_key(name);
        self.push_escaped(value);
    }

    /// Write a bare string value, for array elements.
    pub fn string_value(&mut self, value: &str) {
        self.maybe_comma();
        self.push_escaped(value);
    }

    /// Write a property whose value is JSON `null`.
    pub fn null_property(&mut self, name: &str) {
        self.push_key(name);
        self.buffer.push_str("null");
    }

    /// Write an integer-valued property.
    pub fn int_property(&mut self, name: &str, value: i64) {
        self.push_key(name);
        let _ = write!(self.buffer, "{value}");
    }

    /// Write a string-valued property from format arguments.
    pub fn format_property(&mut self, name: &str, value: std::fmt::Arguments<'_>) {
        self.push_key(name);
        self.push_escaped(&value.to_string());
    }

    /// Splice an already-serialized JSON value under `name`, verbatim.
    pub fn raw_property(&mut self, name: &str, serialized: &str) {
        self.push_key(name);
        self.buffer.push_str(serialized);
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    /// Consume the writer, handing the caller the accumulated buffer.
    pub fn steal(self) -> String {
        self.buffer
    }

    fn push_key(&mut self, name: &str) {
        self.maybe_comma();
        self.push_escaped(name);
        self.buffer.push(':');
    }

    // A comma is due unless we are at the start of the buffer, directly after
    // an opening bracket, or in value position after a key.
    fn maybe_comma(&mut self) {
        match self.buffer.as_bytes().last() {
            None | Some(b'{') | Some(b'[') | Some(b':') | Some(b',') => {}
            Some(_) => self.buffer.push(','),
        }
    }

    fn push_escaped(&mut self, value: &str) {
        match serde_json::to_string(value) {
            Ok(escaped) => self.buffer.push_str(&escaped),
            Err(_) => self.buffer.push_str("\"\""),
        }
    }
}

impl Default for JsonWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_objects_and_arrays() {
        let mut writer = JsonWriter::new();
        writer.open_object();
        writer.string_property("name", "hello");
        writer.int_property("ts", 1000);
        writer.open_array_property("items");
        writer.open_object();
        writer.int_property("x", 1);
        writer.close_object();
        writer.open_object();
        writer.int_property("x", 2);
        writer.close_object();
        writer.close_array();
        writer.close_object();

        assert_eq!(
            writer.as_str(),
            r#"{"name":"hello","ts":1000,"items":[{"x":1},{"x":2}]}"#
        );
    }

    #[test]
    fn escapes_string_values() {
        let mut writer = JsonWriter::new();
        writer.open_object();
        writer.string_property("name", "line\nbreak \"quoted\"");
        writer.close_object();

        let parsed: serde_json::Value = serde_json::from_str(writer.as_str()).unwrap();
        assert_eq!(parsed["name"], "line\nbreak \"quoted\"");
    }

    #[test]
    fn null_property_emits_null() {
        let mut writer = JsonWriter::new();
        writer.open_object();
        writer.null_property("cat");
        writer.close_object();
        assert_eq!(writer.as_str(), r#"{"cat":null}"#);
    }

    #[test]
    fn raw_property_splices_verbatim() {
        let mut writer = JsonWriter::new();
        writer.open_object();
        writer.raw_property("args", r#"{"depth":3}"#);
        writer.close_object();
        assert_eq!(writer.as_str(), r#"{"args":{"depth":3}}"#);
    }

    #[test]
    fn unclose_object_appends_into_spliced_payload() {
        let mut writer = JsonWriter::new();
        writer.open_object();
        writer.raw_property("args", r#"{"depth":3}"#);
        writer.unclose_object();
        writer.string_property("isolateId", "isolates/7");
        writer.close_object();
        writer.close_object();
        assert_eq!(
            writer.as_str(),
            r#"{"args":{"depth":3,"isolateId":"isolates/7"}}"#
        );
    }

    #[test]
    fn unclose_empty_object_does_not_leave_a_comma() {
        let mut writer = JsonWriter::new();
        writer.open_object();
        writer.raw_property("args", "{}");
        writer.unclose_object();
        writer.string_property("isolateId", "isolates/7");
        writer.close_object();
        writer.close_object();
        assert_eq!(writer.as_str(), r#"{"args":{"isolateId":"isolates/7"}}"#);
    }

    #[test]
    fn string_values_in_arrays_are_comma_separated() {
        let mut writer = JsonWriter::new();
        writer.open_array();
        writer.string_value("a");
        writer.string_value("b");
        writer.close_array();
        assert_eq!(writer.as_str(), r#"["a","b"]"#);
    }

    #[test]
    fn steal_returns_the_buffer() {
        let mut writer = JsonWriter::with_capacity(64);
        writer.open_array();
        writer.close_array();
        assert_eq!(writer.steal(), "[]");
    }
}
