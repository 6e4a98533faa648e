//! The full extraction pipeline for one run.
//!
//! Under the paired-tag grammar, text inside the wrapper is also scanned for
//! typed objects; under the balanced grammar, the whole stream is. Either
//! way an `ActionEmitted` follows the plain text that ends with the object's
//! closing brace, so event order tracks the stream rather than fragment
//! boundaries.

use forgeloop_core::action::{Action, Grammar, WrapperHeader};
use forgeloop_core::event::StructuralEvent;

use crate::balanced::BalancedExtractor;
use crate::normalizer::ActionNormalizer;
use crate::paired_tag::{DEFAULT_WRAPPER_TAG, PairedTagExtractor};

/// Extractor state spanning every response of a run.
#[derive(Debug)]
pub struct StreamExtractor {
    grammar: Grammar,
    tags: PairedTagExtractor,
    objects: BalancedExtractor,
    normalizer: ActionNormalizer,
    inside_wrapper: bool,
    round: usize,
    actions: Vec<Action>,
}

impl StreamExtractor {
    pub fn new(grammar: Grammar) -> Self {
        Self::with_wrapper_tag(grammar, DEFAULT_WRAPPER_TAG)
    }

    pub fn with_wrapper_tag(grammar: Grammar, tag: &str) -> Self {
        Self {
            grammar,
            tags: PairedTagExtractor::with_tag(tag),
            objects: BalancedExtractor::new(),
            normalizer: ActionNormalizer::new(),
            inside_wrapper: false,
            round: 0,
            actions: Vec::new(),
        }
    }

    pub fn grammar(&self) -> Grammar {
        self.grammar
    }

    /// Round that subsequently emitted actions are attributed to.
    pub fn set_round(&mut self, round: usize) {
        self.round = round;
    }

    /// The run's artifact header: the first wrapper opened or artifact
    /// object decoded.
    pub fn header(&self) -> Option<&WrapperHeader> {
        self.normalizer.header()
    }

    /// Every action emitted so far, in emission order.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn into_actions(self) -> Vec<Action> {
        self.actions
    }

    pub fn feed(&mut self, fragment: &str) -> Vec<StructuralEvent> {
        match self.grammar {
            Grammar::PairedTag => {
                let tag_events = self.tags.feed(fragment);
                self.route(tag_events)
            }
            Grammar::Balanced => {
                let mut events = Vec::new();
                self.scan_text(fragment, &mut events);
                events
            }
        }
    }

    /// End of one response stream. Held-back text is released and objects
    /// that never closed are discarded; wrapper state and de-duplication
    /// carry over to the next response.
    pub fn end_of_stream(&mut self) -> Vec<StructuralEvent> {
        let events = match self.grammar {
            Grammar::PairedTag => {
                let tail = self.tags.finish();
                self.route(tail)
            }
            Grammar::Balanced => Vec::new(),
        };
        self.objects.finish();
        events
    }

    fn route(&mut self, tag_events: Vec<StructuralEvent>) -> Vec<StructuralEvent> {
        let mut events = Vec::with_capacity(tag_events.len());
        for event in tag_events {
            match event {
                StructuralEvent::PlainText { text } if self.inside_wrapper => {
                    self.scan_text(&text, &mut events);
                }
                StructuralEvent::WrapperOpened { ref header, .. } => {
                    self.normalizer.adopt_header(header.clone());
                    self.inside_wrapper = true;
                    events.push(event);
                }
                StructuralEvent::WrapperClosed { .. } => {
                    self.objects.finish();
                    self.inside_wrapper = false;
                    events.push(event);
                }
                other => events.push(other),
            }
        }
        events
    }

    /// Emit `text` as plain text, interleaving an action after each object
    /// that closes within it.
    fn scan_text(&mut self, text: &str, events: &mut Vec<StructuralEvent>) {
        let mut emitted_to = 0;
        for object in self.objects.feed(text) {
            let Some(action) = self.normalizer.normalize(&object.value, self.round) else {
                continue;
            };
            if object.end > emitted_to {
                events.push(StructuralEvent::plain(&text[emitted_to..object.end]));
                emitted_to = object.end;
            }
            self.actions.push(action.clone());
            events.push(StructuralEvent::ActionEmitted { action });
        }
        if emitted_to < text.len() {
            events.push(StructuralEvent::plain(&text[emitted_to..]));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgeloop_core::action::ActionKind;
    use forgeloop_core::event::coalesce;

    fn run_all(ex: &mut StreamExtractor, fragments: &[&str]) -> Vec<StructuralEvent> {
        let mut events: Vec<StructuralEvent> =
            fragments.iter().flat_map(|f| ex.feed(f)).collect();
        events.extend(ex.end_of_stream());
        coalesce(events)
    }

    #[test]
    fn balanced_object_split_mid_string() {
        let mut ex = StreamExtractor::new(Grammar::Balanced);
        let events = run_all(&mut ex, &[r#"{"type":"sh"#, r#"ell","command":"ls"}"#]);
        assert_eq!(
            events,
            vec![
                StructuralEvent::plain(r#"{"type":"shell","command":"ls"}"#),
                StructuralEvent::ActionEmitted {
                    action: Action::new(0, ActionKind::Shell { command: "ls".into() }),
                },
            ]
        );
        assert_eq!(ex.actions().len(), 1);
    }

    #[test]
    fn actions_inside_wrapper_are_decoded() {
        let mut ex = StreamExtractor::new(Grammar::PairedTag);
        ex.set_round(3);
        let events = run_all(
            &mut ex,
            &[
                r#"Setting up. <boltArtifact id="todo" title="Todo">"#,
                r#"{"type":"file","file_path":"index.html","content":"<p>{}</p>"}"#,
                r#"{"type":"shell","command":"npm start"}</boltArtifact> done"#,
            ],
        );
        let kinds: Vec<&str> = events
            .iter()
            .map(|e| match e {
                StructuralEvent::PlainText { .. } => "text",
                StructuralEvent::WrapperOpened { .. } => "open",
                StructuralEvent::WrapperClosed { .. } => "close",
                StructuralEvent::ActionEmitted { .. } => "action",
            })
            .collect();
        assert_eq!(
            kinds,
            vec!["text", "open", "text", "action", "text", "action", "close", "text"]
        );
        assert_eq!(ex.header(), Some(&WrapperHeader::new("todo", "Todo")));
        assert!(ex.actions().iter().all(|a| a.origin_round == 3));
    }

    #[test]
    fn objects_outside_wrapper_are_plain_text() {
        let mut ex = StreamExtractor::new(Grammar::PairedTag);
        let events = run_all(&mut ex, &[r#"{"type":"shell","command":"ls"}"#]);
        assert_eq!(
            events,
            vec![StructuralEvent::plain(r#"{"type":"shell","command":"ls"}"#)]
        );
        assert!(ex.actions().is_empty());
    }

    #[test]
    fn duplicates_across_responses_emit_once() {
        let mut ex = StreamExtractor::new(Grammar::Balanced);
        let obj = r#"{"type":"shell","command":"ls"}"#;
        run_all(&mut ex, &[obj]);
        ex.set_round(1);
        let events = run_all(&mut ex, &[obj]);
        assert_eq!(events, vec![StructuralEvent::plain(obj)]);
        assert_eq!(ex.actions().len(), 1);
    }

    #[test]
    fn first_wrapper_header_governs() {
        let mut ex = StreamExtractor::new(Grammar::PairedTag);
        run_all(
            &mut ex,
            &[r#"<boltArtifact id="a" title="A"></boltArtifact><boltArtifact id="b" title="B"></boltArtifact>"#],
        );
        assert_eq!(ex.header(), Some(&WrapperHeader::new("a", "A")));
    }

    #[test]
    fn unclosed_object_is_discarded_at_end_of_stream() {
        let mut ex = StreamExtractor::new(Grammar::Balanced);
        run_all(&mut ex, &[r#"{"type":"shell","command":"#]);
        let events = run_all(&mut ex, &[r#""ls"}"#]);
        assert_eq!(events, vec![StructuralEvent::plain(r#""ls"}"#)]);
        assert!(ex.actions().is_empty());
    }
}
