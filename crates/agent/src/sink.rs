//! Stock sinks: JSON lines for machines, a console view for people.

use std::io::{self, Write};

use forgeloop_core::action::ActionKind;
use forgeloop_core::event::{RunNotice, Sink, SinkEvent, StructuralEvent};
use tracing::warn;

/// Writes every event as one JSON object per line.
pub struct JsonLinesSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_event(&mut self, event: &SinkEvent) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}

impl<W: Write + Send> Sink for JsonLinesSink<W> {
    fn emit(&mut self, event: SinkEvent) {
        if let Err(e) = self.write_event(&event) {
            warn!(error = %e, "Failed to write event");
        }
    }
}

/// Longest tool output echoed to the console.
const TOOL_PREVIEW_CHARS: usize = 200;

/// Responder text on `out`, everything structural as short notes on `notes`.
pub struct ConsoleSink<O: Write + Send, N: Write + Send> {
    out: O,
    notes: N,
}

impl ConsoleSink<io::Stdout, io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(io::stdout(), io::stderr())
    }
}

impl<O: Write + Send, N: Write + Send> ConsoleSink<O, N> {
    pub fn new(out: O, notes: N) -> Self {
        Self { out, notes }
    }

    pub fn into_parts(self) -> (O, N) {
        (self.out, self.notes)
    }

    fn write_event(&mut self, event: &SinkEvent) -> io::Result<()> {
        match event {
            SinkEvent::Structural(StructuralEvent::PlainText { text }) => {
                self.out.write_all(text.as_bytes())?;
                self.out.flush()
            }
            SinkEvent::Structural(StructuralEvent::WrapperOpened { header, .. }) => {
                writeln!(self.notes, "\n[artifact {}: {}]", header.id, header.title)
            }
            SinkEvent::Structural(StructuralEvent::WrapperClosed { .. }) => {
                writeln!(self.notes, "[artifact end]")
            }
            SinkEvent::Structural(StructuralEvent::ActionEmitted { action }) => {
                match &action.kind {
                    ActionKind::Shell { command } => writeln!(self.notes, "  + shell: {command}"),
                    ActionKind::File { path, content } => {
                        writeln!(self.notes, "  + file: {path} ({} bytes)", content.len())
                    }
                    ActionKind::Message { text } => writeln!(self.notes, "  + message: {text}"),
                }
            }
            SinkEvent::Notice(RunNotice::ToolResult {
                round,
                name,
                output,
                success,
            }) => {
                let status = if *success { "ok" } else { "failed" };
                writeln!(self.notes, "\n[round {round}] {name} {status}")?;
                let preview: String = output.chars().take(TOOL_PREVIEW_CHARS).collect();
                if !preview.is_empty() {
                    let ellipsis = if preview.len() < output.len() { "..." } else { "" };
                    writeln!(self.notes, "{preview}{ellipsis}")?;
                }
                Ok(())
            }
            SinkEvent::Notice(RunNotice::Stopped { stop_reason, rounds }) => {
                writeln!(self.notes, "\n[stopped: {stop_reason} after {rounds} round(s)]")
            }
        }
    }
}

impl<O: Write + Send, N: Write + Send> Sink for ConsoleSink<O, N> {
    fn emit(&mut self, event: SinkEvent) {
        if let Err(e) = self.write_event(&event) {
            warn!(error = %e, "Failed to write to console");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgeloop_core::action::{Action, WrapperHeader};
    use forgeloop_core::run::StopReason;

    fn events() -> Vec<SinkEvent> {
        vec![
            StructuralEvent::plain("Setting up. ").into(),
            StructuralEvent::WrapperOpened {
                header: WrapperHeader::new("todo", "Todo App"),
                raw: "<boltArtifact id=\"todo\" title=\"Todo App\">".into(),
            }
            .into(),
            StructuralEvent::ActionEmitted {
                action: Action::new(
                    0,
                    ActionKind::Shell {
                        command: "npm init -y".into(),
                    },
                ),
            }
            .into(),
            StructuralEvent::WrapperClosed {
                raw: "</boltArtifact>".into(),
            }
            .into(),
            RunNotice::Stopped {
                stop_reason: StopReason::ToolLoopEnded,
                rounds: 0,
            }
            .into(),
        ]
    }

    #[test]
    fn json_lines_one_object_per_event() {
        let mut sink = JsonLinesSink::new(Vec::new());
        for event in events() {
            sink.emit(event);
        }
        let written = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 5);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["kind"], "plain_text");
        let action: serde_json::Value = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(action["action"]["type"], "shell");
        let stopped: serde_json::Value = serde_json::from_str(lines[4]).unwrap();
        assert_eq!(stopped["kind"], "stopped");
    }

    #[test]
    fn console_splits_text_from_notes() {
        let mut sink = ConsoleSink::new(Vec::new(), Vec::new());
        for event in events() {
            sink.emit(event);
        }
        let (out, notes) = sink.into_parts();
        assert_eq!(String::from_utf8(out).unwrap(), "Setting up. ");

        let notes = String::from_utf8(notes).unwrap();
        assert!(notes.contains("[artifact todo: Todo App]"));
        assert!(notes.contains("+ shell: npm init -y"));
        assert!(notes.contains("[artifact end]"));
        assert!(notes.contains("after 0 round(s)"));
    }

    #[test]
    fn console_truncates_long_tool_output() {
        let mut sink = ConsoleSink::new(Vec::new(), Vec::new());
        sink.emit(
            RunNotice::ToolResult {
                round: 2,
                name: "shell".into(),
                output: "x".repeat(1000),
                success: false,
            }
            .into(),
        );
        let (_, notes) = sink.into_parts();
        let notes = String::from_utf8(notes).unwrap();
        assert!(notes.contains("[round 2] shell failed"));
        assert!(notes.contains(&format!("{}...", "x".repeat(TOOL_PREVIEW_CHARS))));
        assert!(!notes.contains(&"x".repeat(TOOL_PREVIEW_CHARS + 1)));
    }
}
