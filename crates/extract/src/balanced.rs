//! Balanced-delimiter grammar: self-describing JSON objects in a text stream.
//!
//! Every byte is scanned exactly once, however the stream is fragmented.
//! Opening braces push their offset, closing braces pop one and the span
//! between them is tried as a JSON object. Double-quoted strings and their
//! backslash escapes are tracked only while an object is open, so braces
//! inside string values never count and prose quotes never confuse the scan.
//!
//! Once nothing is open the buffer is dropped; while something is open it is
//! trimmed to the outermost unmatched brace. Memory is bounded by the largest
//! object still in flight.

use serde_json::Value;
use tracing::trace;

/// A JSON object recognized in the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedObject {
    /// Byte offset, within the fragment that completed it, just past the
    /// object's closing brace.
    pub end: usize,
    pub value: Value,
}

#[derive(Debug, Clone, Default)]
pub struct BalancedExtractor {
    buffer: String,
    scan_pos: usize,
    in_quoted_string: bool,
    pending_escape: bool,
    open_brace_offsets: Vec<usize>,
}

impl BalancedExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of braces still open.
    pub fn open_depth(&self) -> usize {
        self.open_brace_offsets.len()
    }

    /// Text retained for objects still in flight.
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    /// Scan one fragment; returns every object it completes, innermost
    /// first when they close together.
    pub fn feed(&mut self, fragment: &str) -> Vec<DecodedObject> {
        let base = self.buffer.len();
        self.buffer.push_str(fragment);

        let mut found = Vec::new();
        let bytes = self.buffer.as_bytes();
        for i in self.scan_pos..bytes.len() {
            let b = bytes[i];
            if self.open_brace_offsets.is_empty() {
                if b == b'{' {
                    self.open_brace_offsets.push(i);
                }
            } else if self.pending_escape {
                self.pending_escape = false;
            } else if self.in_quoted_string {
                match b {
                    b'\\' => self.pending_escape = true,
                    b'"' => self.in_quoted_string = false,
                    _ => {}
                }
            } else {
                match b {
                    b'"' => self.in_quoted_string = true,
                    b'{' => self.open_brace_offsets.push(i),
                    b'}' => {
                        if let Some(start) = self.open_brace_offsets.pop()
                            && let Some(value) = decode_object(&self.buffer[start..=i])
                        {
                            found.push(DecodedObject {
                                end: i + 1 - base,
                                value,
                            });
                        }
                    }
                    _ => {}
                }
            }
        }

        self.trim();
        found
    }

    /// End of stream: discard whatever never closed.
    pub fn finish(&mut self) {
        if !self.open_brace_offsets.is_empty() {
            trace!(
                open = self.open_brace_offsets.len(),
                held = self.buffer.len(),
                "Discarding unclosed object text"
            );
        }
        *self = Self::default();
    }

    fn trim(&mut self) {
        match self.open_brace_offsets.first().copied() {
            Some(start) => {
                if start > 0 {
                    self.buffer.drain(..start);
                    for offset in &mut self.open_brace_offsets {
                        *offset -= start;
                    }
                }
                self.scan_pos = self.buffer.len();
            }
            None => {
                self.buffer.clear();
                self.scan_pos = 0;
                self.in_quoted_string = false;
                self.pending_escape = false;
            }
        }
    }
}

/// A balanced span that decodes to a JSON object, or nothing.
fn decode_object(candidate: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(value @ Value::Object(_)) => Some(value),
        Ok(_) => None,
        Err(e) => {
            trace!(error = %e, len = candidate.len(), "Balanced span is not JSON, skipping");
            None
        }
    }
}
