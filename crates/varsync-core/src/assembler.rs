//! Incremental assembly of streamed JSON output.
//!
//! The fetch protocol has no length prefix or terminator: the handler prints
//! one JSON document, and the channel delivers it as arbitrarily fragmented
//! text chunks. The assembler concatenates chunks and re-attempts a full
//! parse after each one; the first complete parse wins. A byte bound stops
//! the repeated re-parsing from degenerating on oversized or runaway output.

use serde_json::Value;
use tracing::warn;

pub struct JsonAssembler {
    buffer: String,
    limit: usize,
    overflowed: bool,
}

impl JsonAssembler {
    pub fn new(limit: usize) -> Self {
        Self {
            buffer: String::new(),
            limit,
            overflowed: false,
        }
    }

    /// Append one chunk and return the parsed document if the accumulated
    /// text now forms complete JSON. Once the byte bound is exceeded all
    /// further input for this execution is discarded.
    pub fn push(&mut self, chunk: &str) -> Option<Value> {
        if self.overflowed {
            return None;
        }
        if self.buffer.len() + chunk.len() > self.limit {
            warn!(
                limit = self.limit,
                "discarding interpreter output larger than the configured bound"
            );
            self.overflowed = true;
            self.buffer.clear();
            return None;
        }
        self.buffer.push_str(chunk);
        serde_json::from_str(&self.buffer).ok()
    }

    pub fn is_overflowed(&self) -> bool {
        self.overflowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_a_single_complete_chunk() {
        let mut assembler = JsonAssembler::new(1024);
        let document = assembler.push(r#"{"a": {"defined": true, "value": 1}}"#);
        assert_eq!(document, Some(json!({"a": {"defined": true, "value": 1}})));
    }

    #[test]
    fn assembles_fragmented_output() {
        let mut assembler = JsonAssembler::new(1024);
        assert_eq!(assembler.push(r#"{"a": {"defi"#), None);
        assert_eq!(assembler.push(r#"ned": true, "va"#), None);
        let document = assembler.push(r#"lue": 42}}"#);
        assert_eq!(document, Some(json!({"a": {"defined": true, "value": 42}})));
    }

    #[test]
    fn tolerates_trailing_newline_from_print() {
        let mut assembler = JsonAssembler::new(1024);
        let document = assembler.push("{\"a\": 1}\n");
        assert_eq!(document, Some(json!({"a": 1})));
    }

    #[test]
    fn never_parses_garbage() {
        let mut assembler = JsonAssembler::new(1024);
        assert_eq!(assembler.push("Traceback (most recent call last):"), None);
        assert_eq!(assembler.push("  NameError: name 'x' is not defined"), None);
        assert!(!assembler.is_overflowed());
    }

    #[test]
    fn discards_everything_past_the_bound() {
        let mut assembler = JsonAssembler::new(8);
        assert_eq!(assembler.push(r#"{"a": "x"#), None);
        assert_eq!(assembler.push(r#"x"}"#), None);
        assert!(assembler.is_overflowed());
        // Even a chunk that would complete the document is ignored now.
        assert_eq!(assembler.push(r#"{"a": 1}"#), None);
    }
}
