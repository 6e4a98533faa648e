//! Paired-tag grammar: one reserved wrapper tag, untyped children.
//!
//! ```text
//! prose <boltArtifact id="todo-app" title="Todo App">children…</boltArtifact> prose
//! ```
//!
//! Only the wrapper's opening and closing tags are structural. Everything
//! else, including a second opening tag while the wrapper is open, is plain
//! text. Plain text is forwarded as soon as it cannot be the start of a
//! delimiter; a possible delimiter prefix at the end of the buffer is held
//! back until the next fragment decides it.

use std::sync::LazyLock;

use forgeloop_core::action::WrapperHeader;
use forgeloop_core::event::StructuralEvent;
use regex_lite::Regex;
use tracing::{debug, trace};

/// Wrapper tag name used when none is configured.
pub const DEFAULT_WRAPPER_TAG: &str = "boltArtifact";

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(id|title)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("attribute pattern is valid")
});

/// Where the extractor currently is relative to the wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Outside,
    InsideWrapper,
}

/// Incremental recognizer for the reserved wrapper tag.
#[derive(Debug, Clone)]
pub struct PairedTagExtractor {
    open_literal: String,
    close_literal: String,
    mode: Mode,
    buffer: String,
    open_depth: u8,
}

impl PairedTagExtractor {
    pub fn new() -> Self {
        Self::with_tag(DEFAULT_WRAPPER_TAG)
    }

    /// Recognize `<tag …>` / `</tag>` instead of the default wrapper.
    pub fn with_tag(tag: &str) -> Self {
        Self {
            open_literal: format!("<{tag}"),
            close_literal: format!("</{tag}>"),
            mode: Mode::Outside,
            buffer: String::new(),
            open_depth: 0,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// 0 outside the wrapper, 1 inside. Never more.
    pub fn open_depth(&self) -> u8 {
        self.open_depth
    }

    /// Text received but not yet emitted.
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    /// Consume one fragment and return every event it fully determines.
    pub fn feed(&mut self, fragment: &str) -> Vec<StructuralEvent> {
        self.buffer.push_str(fragment);
        let mut events = Vec::new();
        loop {
            let progressed = match self.mode {
                Mode::Outside => self.step_outside(&mut events),
                Mode::InsideWrapper => self.step_inside(&mut events),
            };
            if !progressed {
                break;
            }
        }
        events
    }

    /// End of stream: release everything still held back as plain text.
    ///
    /// The mode is kept, so a wrapper left open stays open for the next
    /// stream of the same run.
    pub fn finish(&mut self) -> Vec<StructuralEvent> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        trace!(held = self.buffer.len(), "Flushing held-back text");
        vec![StructuralEvent::plain(std::mem::take(&mut self.buffer))]
    }

    /// Returns true when the loop should run again.
    fn step_outside(&mut self, events: &mut Vec<StructuralEvent>) -> bool {
        let Some(pos) = self.buffer.find(&self.open_literal) else {
            let keep = held_prefix_len(&self.buffer, &self.open_literal);
            self.emit_plain(self.buffer.len() - keep, events);
            return false;
        };

        self.emit_plain(pos, events);

        let name_end = self.open_literal.len();
        match self.buffer[name_end..].chars().next() {
            // Can't tell `<boltArtifact` from `<boltArtifactX` yet
            None => return false,
            Some(c) if !(c.is_whitespace() || c == '>' || c == '/') => {
                self.emit_plain(name_end, events);
                return true;
            }
            Some(_) => {}
        }

        let Some(end) = tag_end(&self.buffer, name_end) else {
            // Partial opening tag: keep it until its `>` arrives
            return false;
        };

        let raw: String = self.buffer.drain(..=end).collect();
        let header = parse_header(&raw);
        debug!(id = %header.id, title = %header.title, "Wrapper opened");
        events.push(StructuralEvent::WrapperOpened { header, raw });
        self.mode = Mode::InsideWrapper;
        self.open_depth = 1;
        true
    }

    fn step_inside(&mut self, events: &mut Vec<StructuralEvent>) -> bool {
        let Some(pos) = self.buffer.find(&self.close_literal) else {
            let keep = held_prefix_len(&self.buffer, &self.close_literal);
            self.emit_plain(self.buffer.len() - keep, events);
            return false;
        };

        self.emit_plain(pos, events);
        let raw: String = self.buffer.drain(..self.close_literal.len()).collect();
        debug!("Wrapper closed");
        events.push(StructuralEvent::WrapperClosed { raw });
        self.mode = Mode::Outside;
        self.open_depth = 0;
        true
    }

    /// Emit the first `len` bytes of the buffer as plain text.
    fn emit_plain(&mut self, len: usize, events: &mut Vec<StructuralEvent>) {
        if len == 0 {
            return;
        }
        let text: String = self.buffer.drain(..len).collect();
        events.push(StructuralEvent::plain(text));
    }
}

impl Default for PairedTagExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Length of the longest proper prefix of `literal` that `buffer` ends with.
fn held_prefix_len(buffer: &str, literal: &str) -> usize {
    (1..literal.len())
        .rev()
        .filter(|&k| literal.is_char_boundary(k))
        .find(|&k| buffer.ends_with(&literal[..k]))
        .unwrap_or(0)
}

/// Byte index of the `>` closing an opening tag, skipping quoted values.
fn tag_end(buffer: &str, from: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (i, &b) in buffer.as_bytes().iter().enumerate().skip(from) {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return Some(i),
            None => {}
        }
    }
    None
}

/// Pull `id` and `title` out of an opening tag. Attribute names match
/// case-insensitively; absent attributes are empty.
pub fn parse_header(tag: &str) -> WrapperHeader {
    let mut header = WrapperHeader::default();
    let (mut saw_id, mut saw_title) = (false, false);
    for caps in ATTRIBUTE.captures_iter(tag) {
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        let name = caps.get(1).map(|m| m.as_str().to_ascii_lowercase());
        match name.as_deref() {
            Some("id") if !saw_id => {
                header.id = value;
                saw_id = true;
            }
            Some("title") if !saw_title => {
                header.title = value;
                saw_title = true;
            }
            _ => {}
        }
    }
    header
}
