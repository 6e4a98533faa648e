//! Decoded objects → typed actions.
//!
//! Objects carry their kind in a `type` field. Shell, file and message
//! objects become [`Action`]s; an artifact object only contributes the run
//! header. Anything else, or a known kind with required fields missing, is
//! dropped. Identical actions are reported once per run.

use std::collections::HashSet;

use forgeloop_core::action::{Action, ActionKind, WrapperHeader};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace};

/// Characters of message text that identify a message for de-duplication.
const MESSAGE_KEY_CHARS: usize = 30;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RawObject {
    Artifact {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        title: Option<String>,
    },
    Shell {
        command: String,
        #[serde(default, alias = "stepNumber")]
        step_number: Option<Value>,
    },
    File {
        #[serde(alias = "filePath", alias = "path")]
        file_path: String,
        #[serde(default)]
        content: Value,
        #[serde(default, alias = "stepNumber")]
        step_number: Option<Value>,
    },
    Message {
        #[serde(alias = "text")]
        content: String,
        #[serde(default, alias = "stepNumber")]
        step_number: Option<Value>,
    },
    #[serde(other)]
    Unknown,
}

/// Identity of an action within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ActionKey {
    kind: &'static str,
    step: Option<String>,
    discriminator: String,
}

impl ActionKey {
    fn of(kind: &ActionKind, step: Option<&Value>) -> Self {
        let discriminator = match kind {
            ActionKind::Shell { command } => command.clone(),
            ActionKind::File { path, .. } => path.clone(),
            ActionKind::Message { text } => text.chars().take(MESSAGE_KEY_CHARS).collect(),
        };
        Self {
            kind: kind.type_name(),
            step: step.map(Value::to_string),
            discriminator,
        }
    }
}

/// Turns decoded objects into actions, once each.
#[derive(Debug, Default)]
pub struct ActionNormalizer {
    header: Option<WrapperHeader>,
    seen: HashSet<ActionKey>,
}

impl ActionNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The run's artifact header, if one has been seen.
    pub fn header(&self) -> Option<&WrapperHeader> {
        self.header.as_ref()
    }

    /// Record `header` unless the run already has one. Returns whether it
    /// was adopted.
    pub fn adopt_header(&mut self, header: WrapperHeader) -> bool {
        if self.header.is_some() {
            trace!(id = %header.id, "Ignoring later artifact header");
            return false;
        }
        debug!(id = %header.id, title = %header.title, "Artifact header recorded");
        self.header = Some(header);
        true
    }

    /// Number of distinct actions emitted so far.
    pub fn emitted(&self) -> usize {
        self.seen.len()
    }

    /// Normalize one decoded object. `None` when it yields no new action.
    pub fn normalize(&mut self, object: &Value, origin_round: usize) -> Option<Action> {
        let raw = match serde_json::from_value::<RawObject>(object.clone()) {
            Ok(raw) => raw,
            Err(e) => {
                trace!(error = %e, "Object is not a complete action, dropping");
                return None;
            }
        };

        let (kind, step) = match raw {
            RawObject::Artifact { id, title } => {
                self.adopt_header(WrapperHeader::new(
                    id.unwrap_or_default(),
                    title.unwrap_or_default(),
                ));
                return None;
            }
            RawObject::Shell {
                command,
                step_number,
            } => (ActionKind::Shell { command }, step_number),
            RawObject::File {
                file_path,
                content,
                step_number,
            } => (
                ActionKind::File {
                    path: file_path,
                    content: content_text(content),
                },
                step_number,
            ),
            RawObject::Message {
                content,
                step_number,
            } => (ActionKind::Message { text: content }, step_number),
            RawObject::Unknown => {
                trace!("Object has an unrecognized type, dropping");
                return None;
            }
        };

        let key = ActionKey::of(&kind, step.as_ref());
        if !self.seen.insert(key) {
            trace!(kind = kind.type_name(), "Duplicate action suppressed");
            return None;
        }

        debug!(kind = kind.type_name(), round = origin_round, "Action emitted");
        Some(Action::new(origin_round, kind))
    }
}

/// File content is usually a string; structured content (a JSON manifest
/// written as an object) is pretty-printed.
fn content_text(content: Value) -> String {
    match content {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => serde_json::to_string_pretty(&other).unwrap_or_else(|_| other.to_string()),
    }
}
