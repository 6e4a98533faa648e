//! Events: what the core streams to its Sink, and domain events for observers.
//!
//! [`StructuralEvent`] is the extractor's output vocabulary. The Sink sees
//! those plus a few [`RunNotice`]s from the orchestrator, in strict arrival
//! order. [`DomainEvent`]s go to a broadcast [`EventBus`] for anyone who
//! wants to watch runs without being in the data path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use crate::action::{Action, WrapperHeader};
use crate::run::StopReason;

/// A fully determined piece of extractor output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructuralEvent {
    /// Text that is not a delimiter.
    PlainText { text: String },

    /// The reserved wrapper opened. `raw` is the literal opening tag.
    WrapperOpened { header: WrapperHeader, raw: String },

    /// The reserved wrapper closed. `raw` is the literal closing tag.
    WrapperClosed { raw: String },

    /// A typed action was decoded. Derived: carries no literal text.
    ActionEmitted { action: Action },
}

impl StructuralEvent {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::PlainText { text: text.into() }
    }

    /// The literal input text this event accounts for.
    ///
    /// Concatenating `literal()` over every event of a stream reproduces the
    /// stream exactly.
    pub fn literal(&self) -> &str {
        match self {
            Self::PlainText { text } => text,
            Self::WrapperOpened { raw, .. } | Self::WrapperClosed { raw } => raw,
            Self::ActionEmitted { .. } => "",
        }
    }
}

/// Merge adjacent `PlainText` events and drop empty ones.
///
/// Plain text is forwarded as soon as it is known, so how it is chunked
/// depends on how the input was fragmented. Everything else does not.
pub fn coalesce(events: impl IntoIterator<Item = StructuralEvent>) -> Vec<StructuralEvent> {
    let mut out: Vec<StructuralEvent> = Vec::new();
    for event in events {
        match event {
            StructuralEvent::PlainText { text } if text.is_empty() => {}
            StructuralEvent::PlainText { text } => match out.last_mut() {
                Some(StructuralEvent::PlainText { text: prev }) => prev.push_str(&text),
                _ => out.push(StructuralEvent::PlainText { text }),
            },
            other => out.push(other),
        }
    }
    out
}

/// Orchestrator notices interleaved with structural events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunNotice {
    /// A tool ran; `output` is exactly what the responder will see.
    ToolResult {
        round: usize,
        name: String,
        output: String,
        success: bool,
    },

    /// The run reached `End`.
    Stopped {
        stop_reason: StopReason,
        rounds: usize,
    },
}

/// Everything a Sink can receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SinkEvent {
    Structural(StructuralEvent),
    Notice(RunNotice),
}

impl From<StructuralEvent> for SinkEvent {
    fn from(event: StructuralEvent) -> Self {
        Self::Structural(event)
    }
}

impl From<RunNotice> for SinkEvent {
    fn from(notice: RunNotice) -> Self {
        Self::Notice(notice)
    }
}

/// Consumer of the ordered event stream of a run.
pub trait Sink: Send {
    fn emit(&mut self, event: SinkEvent);
}

impl Sink for Vec<SinkEvent> {
    fn emit(&mut self, event: SinkEvent) {
        self.push(event);
    }
}

/// Forwarding into a channel; events are dropped once the receiver is gone.
impl Sink for mpsc::UnboundedSender<SinkEvent> {
    fn emit(&mut self, event: SinkEvent) {
        let _ = self.send(event);
    }
}

/// Domain events published while runs progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    RoundStarted {
        run_id: String,
        round: usize,
        timestamp: DateTime<Utc>,
    },

    ResponseReceived {
        run_id: String,
        round: usize,
        tool_calls: usize,
        tokens_used: Option<u32>,
        timestamp: DateTime<Utc>,
    },

    ToolExecuted {
        run_id: String,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    ProgressChecked {
        run_id: String,
        round: usize,
        done: bool,
        timestamp: DateTime<Utc>,
    },

    RunStopped {
        run_id: String,
        stop_reason: StopReason,
        rounds: usize,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionKind;

    #[test]
    fn coalesce_merges_adjacent_text() {
        let events = vec![
            StructuralEvent::plain("a"),
            StructuralEvent::plain(""),
            StructuralEvent::plain("b"),
            StructuralEvent::WrapperClosed {
                raw: "</x>".into(),
            },
            StructuralEvent::plain("c"),
        ];
        assert_eq!(
            coalesce(events),
            vec![
                StructuralEvent::plain("ab"),
                StructuralEvent::WrapperClosed {
                    raw: "</x>".into()
                },
                StructuralEvent::plain("c"),
            ]
        );
    }

    #[test]
    fn literal_skips_derived_events() {
        let action = StructuralEvent::ActionEmitted {
            action: Action::new(0, ActionKind::Shell { command: "ls".into() }),
        };
        assert_eq!(action.literal(), "");
        let opened = StructuralEvent::WrapperOpened {
            header: WrapperHeader::new("x", "Y"),
            raw: "<boltArtifact id=\"x\" title=\"Y\">".into(),
        };
        assert!(opened.literal().starts_with("<boltArtifact"));
    }

    #[test]
    fn sink_event_serializes_with_kind() {
        let event: SinkEvent = StructuralEvent::plain("hi").into();
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"kind":"plain_text","text":"hi"}"#);

        let notice: SinkEvent = RunNotice::Stopped {
            stop_reason: StopReason::ToolLoopEnded,
            rounds: 1,
        }
        .into();
        let json = serde_json::to_string(&notice).unwrap();
        assert!(json.contains(r#""kind":"stopped""#));
        assert!(json.contains(r#""stop_reason":"tool_loop_ended""#));
    }

    #[test]
    fn sink_event_deserializes_both_shapes() {
        let event: SinkEvent =
            serde_json::from_str(r#"{"kind":"wrapper_closed","raw":"</boltArtifact>"}"#).unwrap();
        assert!(matches!(
            event,
            SinkEvent::Structural(StructuralEvent::WrapperClosed { .. })
        ));
        let event: SinkEvent = serde_json::from_str(
            r#"{"kind":"tool_result","round":0,"name":"shell","output":"ok","success":true}"#,
        )
        .unwrap();
        assert!(matches!(
            event,
            SinkEvent::Notice(RunNotice::ToolResult { .. })
        ));
    }

    #[test]
    fn channel_sink_forwards_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sink = tx;
        sink.emit(StructuralEvent::plain("1").into());
        sink.emit(StructuralEvent::plain("2").into());
        assert_eq!(rx.try_recv().unwrap(), StructuralEvent::plain("1").into());
        assert_eq!(rx.try_recv().unwrap(), StructuralEvent::plain("2").into());
    }

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::ToolExecuted {
            run_id: "r1".into(),
            tool_name: "shell".into(),
            success: true,
            duration_ms: 42,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::ToolExecuted {
                tool_name, success, ..
            } => {
                assert_eq!(tool_name, "shell");
                assert!(success);
            }
            _ => panic!("Expected ToolExecuted event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::RunStopped {
            run_id: "r1".into(),
            stop_reason: StopReason::Error,
            rounds: 0,
            timestamp: Utc::now(),
        });
    }
}
